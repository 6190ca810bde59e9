//! Infrastructure layer for the dashboard client.
//!
//! - **`relay_conn`** – Reconnecting WebSocket connection to the relay.
//! - **`cache`** – JSON file implementation of `ProductCache`.

pub mod cache;
pub mod relay_conn;

pub use cache::JsonFileCache;
pub use relay_conn::{ClientError, RelayConnection, RelayConnectionConfig, RelayEvent};
