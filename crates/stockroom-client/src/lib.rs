//! stockroom-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! The client is the inventory dashboard's side of the relay:
//!
//! 1. Connects to the relay and declares itself with `{"type":"react_client"}`,
//!    reconnecting with exponential back-off whenever the connection drops.
//! 2. Receives `{"uid": ...}` scan reports and applies each one to the
//!    product table (one item out of stock per scan).
//! 3. Sends `{"type":"beep","duration":1500}` back through the relay when a
//!    product runs low, so the scanner operator hears it.
//! 4. Persists the product table to a local `products_data` cache.

/// Domain layer: products, scan records, reconnect schedule.
pub mod domain;

/// Application layer: the stock ledger.
pub mod application;

/// Infrastructure layer: relay connection and product cache file.
pub mod infrastructure;
