//! Source adapter trait and error definitions

use async_trait::async_trait;
use thiserror::Error;

use crate::schema::{FetchBatch, GridCell};

/// Source adapter errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SourceError {
    #[error("Request error: {0}")]
    Request(String),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Source rejected request: {0}")]
    Rejected(String),

    #[error("Resolution not supported by {source_name}: {resolution}")]
    UnsupportedResolution {
        source_name: String,
        resolution: String,
    },

    #[error("Instrument {instrument} not routable to source kind {kind}")]
    NotRoutable { instrument: String, kind: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Request(err.to_string())
    }
}

pub type SourceResult<T> = Result<T, SourceError>;

/// Fetch contract for one grid cell.
///
/// `since_unix_time` is an exclusive lower bound: the returned batch must
/// contain only bars with `unix_time > since_unix_time`, in ascending time
/// order. Upstreams with inclusive lower bounds are queried at `since + 1`.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Adapter name, for logs and failure reports.
    fn name(&self) -> &str;

    /// Fetch bars newer than `since_unix_time` for the given cell.
    async fn fetch(&self, cell: &GridCell, since_unix_time: i64) -> SourceResult<FetchBatch>;
}
