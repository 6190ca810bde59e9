//! File-backed product cache.
//!
//! Stores the table as pretty-printed JSON in `<dir>/products_data.json`,
//! written through a temporary file and renamed into place so a crash never
//! leaves a half-written table.

use std::path::{Path, PathBuf};

use crate::application::stock_ledger::{CacheError, ProductCache, PRODUCTS_CACHE_KEY};
use crate::domain::Product;

/// [`ProductCache`] backed by a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    path: PathBuf,
}

impl JsonFileCache {
    /// A cache file named `products_data.json` inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(format!("{PRODUCTS_CACHE_KEY}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ProductCache for JsonFileCache {
    fn load(&self) -> Result<Option<Vec<Product>>, CacheError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| CacheError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    fn store(&self, products: &[Product]) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        let json = serde_json::to_string_pretty(products)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
