//! Error types for the bizreg crate.

use thiserror::Error;

use crate::cache::CacheError;
use crate::client::UpstreamError;
use crate::filters::ValidationError;
use crate::output::OutputError;

/// Any failure that ends an invocation with a non-zero exit code.
///
/// Record-level decode failures never reach this type; they are logged and
/// the offending record is dropped.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid command-line input; nothing was fetched or cached.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Cache directory could not be created or maintained.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// The datastore request failed or returned an unusable envelope.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// Rendered output could not be written.
    #[error(transparent)]
    Output(#[from] OutputError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
