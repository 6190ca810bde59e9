//! Domain layer for stockroom-client.
//!
//! Pure data and schedules: product rows, scan history entries, and the
//! reconnect backoff.  No I/O, no async.

pub mod backoff;
pub mod product;

pub use backoff::ReconnectBackoff;
pub use product::{
    normalize_uid, seed_products, LowStockNotice, NewProduct, Product, ProductDetails,
    ScanRecord, UNKNOWN_PRODUCT_NAME,
};
