//! Product table rows and scan history entries.
//!
//! The JSON shape matches the `products_data` cache written by the
//! dashboard, including the capitalized `Product` key:
//!
//! ```json
//! {
//!   "id": 1,
//!   "uid": "F3C29FF7",
//!   "Product": {"image": "/images/product/SL.jpg", "name": "Saint Lauren", "category": "Perfume"},
//!   "manufacturing": "2020",
//!   "expirationDate": "2025",
//!   "validation": "19-04-2025 12:00",
//!   "quantity": 10,
//!   "price": "500 DA"
//! }
//! ```

use serde::{Deserialize, Serialize};

/// Name shown for a scanned UID that matches no product.
pub const UNKNOWN_PRODUCT_NAME: &str = "Unknown Product";

/// Display details of a product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    #[serde(default)]
    pub image: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
}

/// One row of the product table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: u64,
    /// RFID tag UID bound to this product, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(rename = "Product")]
    pub details: ProductDetails,
    #[serde(default)]
    pub manufacturing: String,
    #[serde(default)]
    pub expiration_date: String,
    /// Time of the last scan of this product.
    #[serde(default)]
    pub validation: String,
    pub quantity: u32,
    #[serde(default)]
    pub price: String,
}

impl Product {
    /// True if this product's tag is `uid` (compared case-insensitively).
    pub fn has_uid(&self, uid: &str) -> bool {
        self.uid
            .as_deref()
            .is_some_and(|own| own.eq_ignore_ascii_case(uid))
    }
}

/// A product being added to the table; the ledger assigns the id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewProduct {
    pub uid: Option<String>,
    pub details: ProductDetails,
    pub manufacturing: String,
    pub expiration_date: String,
    pub quantity: u32,
    pub price: String,
}

impl NewProduct {
    pub(crate) fn into_product(self, id: u64) -> Product {
        Product {
            id,
            uid: self.uid.map(|uid| normalize_uid(&uid)),
            details: self.details,
            manufacturing: self.manufacturing,
            expiration_date: self.expiration_date,
            validation: String::new(),
            quantity: self.quantity,
            price: self.price,
        }
    }
}

/// One entry of the recent-scan history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub uid: String,
    pub product_name: String,
    /// Quantity after the scan; `None` for unknown tags.
    pub quantity: Option<u32>,
    pub validation: String,
}

/// Raised when a scan leaves a product at or below the low-stock threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LowStockNotice {
    pub product_name: String,
    pub quantity: u32,
}

impl std::fmt::Display for LowStockNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Low stock: {} ({} left)", self.product_name, self.quantity)
    }
}

/// Upper-cases a tag UID so scans match regardless of reader casing.
pub fn normalize_uid(uid: &str) -> String {
    uid.trim().to_ascii_uppercase()
}

/// The table used when no cache exists yet.
pub fn seed_products() -> Vec<Product> {
    [
        (1, "F3C29FF7", "SL.jpg", "Saint Lauren", "Perfume"),
        (2, "B32E3591", "NARS.jpg", "NARS", "Foundation"),
        (3, "33E41EAF", "Nivea.jpg", "Nivea", "Stick"),
        (4, "33563AAF", "Renee.jpg", "Renee", "Lip Stick"),
        (5, "63980E90", "sizeUP.jpg", "Size Up", "Mascara"),
    ]
    .into_iter()
    .map(|(id, uid, image, name, category)| Product {
        id,
        uid: Some(uid.to_string()),
        details: ProductDetails {
            image: format!("/images/product/{image}"),
            name: name.to_string(),
            category: category.to_string(),
        },
        manufacturing: "2020".to_string(),
        expiration_date: "2025".to_string(),
        validation: "19-04-2025 12:00".to_string(),
        quantity: 10,
        price: "500 DA".to_string(),
    })
    .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
