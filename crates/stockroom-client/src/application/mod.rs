//! Application layer use cases for the dashboard client.
//!
//! - **`stock_ledger`** – Applies scan reports to the product table, keeps
//!   the recent-scan history, and decides when the scanner should beep.  The
//!   table is persisted through a `ProductCache` implementation injected at
//!   construction time.

pub mod stock_ledger;

pub use stock_ledger::{
    CacheError, ProductCache, ScanOutcome, StockLedger, DEFAULT_LOW_STOCK_THRESHOLD,
};
