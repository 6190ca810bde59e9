//! Stock ledger: applies scan reports to the product table.
//!
//! Each scan of a known tag takes one item out of stock, stamps the product
//! with the scan time, and lands in a short recent-scan history.  When a scan
//! leaves a product at or below the low-stock threshold the ledger asks for a
//! beep so the person at the scanner notices.
//!
//! The table is written to a [`ProductCache`] after every change.  The cache
//! is a trait so tests can substitute a mock.

use std::collections::VecDeque;

use chrono::{DateTime, Local};
use stockroom_core::ScannerCommand;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{
    normalize_uid, seed_products, LowStockNotice, NewProduct, Product, ScanRecord,
    UNKNOWN_PRODUCT_NAME,
};

/// Storage key of the product table.
pub const PRODUCTS_CACHE_KEY: &str = "products_data";

/// Quantity at or below which a scan triggers a beep.
pub const DEFAULT_LOW_STOCK_THRESHOLD: u32 = 3;

/// Number of scans kept in the recent-scan history.
pub const RECENT_SCAN_LIMIT: usize = 5;

/// `validation` timestamp layout, e.g. `04/19/2025, 14:05:09`.
pub const VALIDATION_FORMAT: &str = "%m/%d/%Y, %H:%M:%S";

// ── Cache seam ────────────────────────────────────────────────────────────────

/// Error type for product cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("I/O error on product cache {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("product cache {path} is not valid JSON: {source}")]
    Corrupt {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize product table: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persistence for the product table.
#[cfg_attr(test, mockall::automock)]
pub trait ProductCache: Send {
    /// Returns the cached table, or `None` if nothing has been stored yet.
    fn load(&self) -> Result<Option<Vec<Product>>, CacheError>;

    /// Replaces the cached table.
    fn store(&self, products: &[Product]) -> Result<(), CacheError>;
}

// ── Ledger ────────────────────────────────────────────────────────────────────

/// Result of applying one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub record: ScanRecord,
    pub low_stock: Option<LowStockNotice>,
    /// Command to send to the scanner, if any.
    pub command: Option<ScannerCommand>,
}

/// The product table plus recent-scan history.
pub struct StockLedger<C: ProductCache> {
    products: Vec<Product>,
    recent: VecDeque<ScanRecord>,
    low_stock_threshold: u32,
    cache: C,
}

impl<C: ProductCache> StockLedger<C> {
    /// Loads the table from `cache`, falling back to the seed table when the
    /// cache is empty.
    ///
    /// # Errors
    ///
    /// Returns the cache's error if it exists but cannot be read.
    pub fn open(cache: C, low_stock_threshold: u32) -> Result<Self, CacheError> {
        let products = match cache.load()? {
            Some(products) => {
                debug!(count = products.len(), "loaded product table from cache");
                products
            }
            None => {
                info!("no cached product table; using seed products");
                seed_products()
            }
        };
        Ok(Self::with_products(cache, products, low_stock_threshold))
    }

    /// A ledger over `products`, without reading the cache.
    pub fn with_products(cache: C, products: Vec<Product>, low_stock_threshold: u32) -> Self {
        Self {
            products,
            recent: VecDeque::with_capacity(RECENT_SCAN_LIMIT),
            low_stock_threshold,
            cache,
        }
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Recent scans, most recent first.
    pub fn recent_scans(&self) -> impl Iterator<Item = &ScanRecord> {
        self.recent.iter()
    }

    /// Current quantity of the product tagged `uid`.
    pub fn quantity_of(&self, uid: &str) -> Option<u32> {
        self.products
            .iter()
            .find(|p| p.has_uid(uid))
            .map(|p| p.quantity)
    }

    /// Applies one scan of `uid` taken at `at`.
    ///
    /// Unknown tags are recorded in the history and change nothing else.  A
    /// failure to persist the table is logged; the in-memory table and the
    /// returned outcome are unaffected by it.
    pub fn apply_scan(&mut self, uid: &str, at: &DateTime<Local>) -> ScanOutcome {
        let uid = normalize_uid(uid);
        let validation = at.format(VALIDATION_FORMAT).to_string();

        let Some(product) = self.products.iter_mut().find(|p| p.has_uid(&uid)) else {
            debug!(%uid, "scanned tag matches no product");
            let record = ScanRecord {
                uid,
                product_name: UNKNOWN_PRODUCT_NAME.to_string(),
                quantity: None,
                validation,
            };
            self.remember(record.clone());
            return ScanOutcome {
                record,
                low_stock: None,
                command: None,
            };
        };

        product.quantity = product.quantity.saturating_sub(1);
        product.validation = validation.clone();
        let quantity = product.quantity;
        let product_name = product.details.name.clone();

        let (low_stock, command) = if quantity <= self.low_stock_threshold {
            let notice = LowStockNotice {
                product_name: product_name.clone(),
                quantity,
            };
            warn!("{notice}");
            (Some(notice), Some(ScannerCommand::default_beep()))
        } else {
            (None, None)
        };

        let record = ScanRecord {
            uid,
            product_name,
            quantity: Some(quantity),
            validation,
        };
        self.remember(record.clone());

        if let Err(e) = self.persist() {
            warn!("failed to persist product table after scan: {e}");
        }

        ScanOutcome {
            record,
            low_stock,
            command,
        }
    }

    /// Adds a product and returns its id: the epoch-millisecond time `at`,
    /// bumped past any id already in the table.
    ///
    /// # Errors
    ///
    /// Returns the cache's error if the updated table cannot be stored.
    pub fn add_product(&mut self, product: NewProduct, at: &DateTime<Local>) -> Result<u64, CacheError> {
        let mut id = u64::try_from(at.timestamp_millis()).unwrap_or(0);
        while self.products.iter().any(|p| p.id == id) {
            id += 1;
        }
        self.products.push(product.into_product(id));
        info!(id, "product added");
        self.persist()?;
        Ok(id)
    }

    /// Removes every product whose id is in `ids`; returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns the cache's error if the updated table cannot be stored.
    pub fn remove_products(&mut self, ids: &[u64]) -> Result<usize, CacheError> {
        let before = self.products.len();
        self.products.retain(|p| !ids.contains(&p.id));
        let removed = before - self.products.len();
        if removed > 0 {
            info!(removed, "products removed");
            self.persist()?;
        }
        Ok(removed)
    }

    fn remember(&mut self, record: ScanRecord) {
        self.recent.push_front(record);
        self.recent.truncate(RECENT_SCAN_LIMIT);
    }

    fn persist(&self) -> Result<(), CacheError> {
        self.cache.store(&self.products)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
