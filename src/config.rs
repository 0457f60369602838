//! Runtime configuration threaded through the client, cache and renderers.

use std::path::PathBuf;
use std::time::Duration as StdDuration;

use crate::ttl::DEFAULT_CACHE_TTL;

/// Public CKAN instance hosting the business names dataset.
pub const DEFAULT_HOST: &str = "https://data.gov.au";

/// Structured (filtered) search action.
pub const SEARCH_PATH: &str = "/data/api/action/datastore_search";

/// Raw SQL search action.
pub const SQL_PATH: &str = "/data/api/action/datastore_search_sql";

/// ASIC business names datastore resource.
pub const RESOURCE_ID: &str = "55ad4b1c-5eeb-44ea-8b29-d410da431be3";

/// Fixed page size for every request.
pub const REQUEST_LIMIT: usize = 50;

/// Upper bound on a single upstream request.
pub const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// Environment variable overriding the API host (useful for mirrors).
pub const HOST_ENV: &str = "BIZREG_API_HOST";

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "BIZREG_CACHE_DIR";

/// Upstream endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub host: String,
    pub search_path: String,
    pub sql_path: String,
    pub resource_id: String,
    pub limit: usize,
    pub timeout: StdDuration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            search_path: SEARCH_PATH.to_string(),
            sql_path: SQL_PATH.to_string(),
            resource_id: RESOURCE_ID.to_string(),
            limit: REQUEST_LIMIT,
            timeout: REQUEST_TIMEOUT,
        }
    }
}

impl ApiConfig {
    /// Defaults, with the host taken from `BIZREG_API_HOST` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(host) = std::env::var(HOST_ENV) {
            let host = host.trim().trim_end_matches('/');
            if !host.is_empty() {
                config.host = host.to_string();
            }
        }
        config
    }

    pub fn search_url(&self) -> String {
        format!("{}{}", self.host, self.search_path)
    }

    pub fn sql_url(&self) -> String {
        format!("{}{}", self.host, self.sql_path)
    }
}

/// Everything one invocation needs, resolved up front.
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub cache_dir: PathBuf,
    pub cache_ttl: chrono::Duration,
    /// When false, the cache is neither read nor written.
    pub use_cache: bool,
}

impl Config {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            api: ApiConfig::default(),
            cache_dir,
            cache_ttl: DEFAULT_CACHE_TTL,
            use_cache: true,
        }
    }
}
