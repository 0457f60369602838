//! Datastore client with response caching.
//!
//! This module provides a generic [`Upstream`] trait for issuing datastore
//! requests, along with concrete implementations:
//!
//! - [`HttpUpstream`]: production transport for the data.gov.au CKAN API
//! - `MockUpstream`: test double that replays canned envelopes
//!
//! [`QueryClient`] sits on top: it consults the [`CacheStore`] first, falls
//! back to a single upstream request on a miss, normalizes the envelope into
//! [`Record`]s and caches the result.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::config::ApiConfig;
use crate::error::Result;
use crate::filters::FilterSet;
use crate::record::{NAME_FIELD, Record};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur talking to the datastore.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// HTTP or network error occurred (including the request timeout).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The datastore answered with a non-success status code.
    #[error("datastore returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Failed to parse the response body.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The envelope reported `success: false`.
    #[error("datastore query failed: {0}")]
    Unsuccessful(String),

    /// The envelope had no `result.records` array.
    #[error("invalid response format: records not found")]
    MissingRecords,
}

// ============================================================================
// Searches and Requests
// ============================================================================

/// One query, in either of the two mutually exclusive search modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Search {
    /// Full-text `q` search narrowed by exact-match filters.
    Exact { term: String, filters: FilterSet },
    /// Name search through the SQL endpoint; results are ranked afterwards.
    Raw { term: String },
}

impl Search {
    pub fn term(&self) -> &str {
        match self {
            Self::Exact { term, .. } | Self::Raw { term } => term,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw { .. })
    }

    /// The (query, filters) pair this search is cached under.
    ///
    /// Raw searches are keyed by the SQL they send, so they never share an
    /// entry with an exact search for the same term.
    pub fn cache_identity(&self, api: &ApiConfig) -> (String, FilterSet) {
        match self {
            Self::Exact { term, filters } => (term.clone(), filters.clone()),
            Self::Raw { term } => (name_like_sql(api, term), FilterSet::new()),
        }
    }

    pub fn to_request(&self, api: &ApiConfig) -> DatastoreRequest {
        match self {
            Self::Exact { term, filters } => DatastoreRequest::Search(SearchBody {
                resource_id: api.resource_id.clone(),
                limit: api.limit,
                offset: 0,
                q: term.clone(),
                filters: filters.clone(),
            }),
            Self::Raw { term } => DatastoreRequest::Sql(SqlBody {
                resource_id: api.resource_id.clone(),
                sql: name_like_sql(api, term),
            }),
        }
    }
}

/// Request body for either datastore action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DatastoreRequest {
    Search(SearchBody),
    Sql(SqlBody),
}

/// Body of a `datastore_search` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchBody {
    pub resource_id: String,
    pub limit: usize,
    pub offset: usize,
    pub q: String,
    pub filters: FilterSet,
}

/// Body of a `datastore_search_sql` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlBody {
    pub resource_id: String,
    pub sql: String,
}

/// SQL selecting names that contain `term`, case-insensitively.
pub fn name_like_sql(api: &ApiConfig, term: &str) -> String {
    let escaped = term.replace('\'', "''");
    format!(
        "SELECT * FROM \"{}\" WHERE \"{NAME_FIELD}\" ILIKE '%{escaped}%' LIMIT {}",
        api.resource_id, api.limit
    )
}

// ============================================================================
// Upstream Trait
// ============================================================================

/// Transport that executes a datastore request and returns the raw envelope.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Issue exactly one request. Implementations must not retry.
    async fn execute(&self, request: &DatastoreRequest) -> Result<Value, UpstreamError>;
}

// ============================================================================
// HTTP Implementation
// ============================================================================

/// Client for the CKAN datastore API over HTTPS.
pub struct HttpUpstream {
    api: ApiConfig,
    client: reqwest::Client,
}

impl HttpUpstream {
    /// Build a client whose requests time out after `api.timeout`.
    pub fn new(api: ApiConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(api.timeout)
            .build()
            .map_err(|e| UpstreamError::Http(e.to_string()))?;
        Ok(Self { api, client })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn execute(&self, request: &DatastoreRequest) -> Result<Value, UpstreamError> {
        let url = match request {
            DatastoreRequest::Search(_) => self.api.search_url(),
            DatastoreRequest::Sql(_) => self.api.sql_url(),
        };
        debug!(%url, "sending datastore request");

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| UpstreamError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| UpstreamError::Parse(e.to_string()))
    }
}

// ============================================================================
// Envelope Normalization
// ============================================================================

/// Extract records from a `{ success, result: { records } }` envelope.
///
/// Rows that fail to normalize are logged and skipped; the rest are kept.
pub fn normalize_envelope(mut envelope: Value) -> Result<Vec<Record>, UpstreamError> {
    if envelope.get("success").and_then(Value::as_bool) == Some(false) {
        let detail = envelope
            .get("error")
            .map(Value::to_string)
            .unwrap_or_else(|| "no error detail".to_string());
        return Err(UpstreamError::Unsuccessful(detail));
    }

    let rows = match envelope.pointer_mut("/result/records").map(Value::take) {
        Some(Value::Array(rows)) => rows,
        _ => return Err(UpstreamError::MissingRecords),
    };

    let total = rows.len();
    let mut records = Vec::with_capacity(total);
    for (index, row) in rows.into_iter().enumerate() {
        match Record::from_value(row) {
            Ok(record) => records.push(record),
            Err(e) => warn!(index, error = %e, "dropping malformed record"),
        }
    }

    if records.len() < total {
        warn!(kept = records.len(), total, "some records could not be decoded");
    }
    Ok(records)
}

// ============================================================================
// Query Client
// ============================================================================

/// Cache-aware front end to an [`Upstream`].
pub struct QueryClient {
    upstream: Arc<dyn Upstream>,
    cache: Option<CacheStore>,
    api: ApiConfig,
}

impl QueryClient {
    /// `cache: None` disables both cache reads and writes.
    pub fn new(upstream: Arc<dyn Upstream>, cache: Option<CacheStore>, api: ApiConfig) -> Self {
        Self {
            upstream,
            cache,
            api,
        }
    }

    /// Fetch records for a search, serving from cache when possible.
    ///
    /// A cache hit returns without touching the network. On a miss, one
    /// upstream request is made; its records are cached before returning.
    /// Upstream failures are returned immediately and never retried.
    pub async fn fetch(&self, search: &Search) -> Result<Vec<Record>> {
        let (query, filters) = search.cache_identity(&self.api);

        if let Some(cache) = &self.cache {
            if let Some(records) = cache.get(&query, &filters)? {
                info!(term = search.term(), records = records.len(), "cache hit");
                return Ok(records);
            }
            debug!(term = search.term(), "cache miss");
        }

        let request = search.to_request(&self.api);
        let envelope = self.upstream.execute(&request).await?;
        let records = normalize_envelope(envelope)?;
        info!(term = search.term(), records = records.len(), "fetched records");

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(&query, &filters, &records) {
                warn!(error = %e, "failed to cache results");
            }
        }

        Ok(records)
    }
}

// ============================================================================
// Mock Implementation (Test Only)
// ============================================================================

/// Mock upstream for testing. Replays pre-programmed envelopes in FIFO order
/// and records every request it receives.
#[cfg(test)]
pub(crate) struct MockUpstream {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<Value, UpstreamError>>>,
    requests: std::sync::Mutex<Vec<DatastoreRequest>>,
}

#[cfg(test)]
impl MockUpstream {
    pub(crate) fn new(responses: Vec<Result<Value, UpstreamError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Envelope with the given rows, as the datastore would return them.
    pub(crate) fn envelope(rows: Vec<Value>) -> Value {
        serde_json::json!({
            "help": "https://data.gov.au/data/api/3/action/help_show?name=datastore_search",
            "success": true,
            "result": { "records": rows },
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<DatastoreRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Upstream for MockUpstream {
    async fn execute(&self, request: &DatastoreRequest) -> Result<Value, UpstreamError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("MockUpstream: no more responses available")
    }
}

// ============================================================================
// Tests
// ============================================================================
