//! bizreg — cached, similarity-ranked search over the Australian business
//! names register published on data.gov.au.

pub mod app;
pub mod cache;
pub mod charts;
pub mod client;
pub mod config;
pub mod error;
pub mod filters;
pub mod output;
pub mod record;
pub mod similarity;
pub mod ttl;

use std::path::PathBuf;

pub use error::{Error, Result};

/// Resolve the cache directory from env var or default location.
pub fn resolve_cache_dir() -> PathBuf {
    if let Ok(path) = std::env::var(config::CACHE_DIR_ENV) {
        return PathBuf::from(path);
    }

    let cache_dir = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
    cache_dir.join("bizreg")
}
