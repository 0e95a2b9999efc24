//! Error taxonomy for caller-visible failures (§7).
//!
//! Transport and protocol errors stay inside the venue session and are
//! logged, not returned (§7 "Propagation"). These variants cover the
//! handful of conditions a caller of the public API needs to branch on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("unknown symbol for venue {venue}: {native}")]
    UnknownSymbol { venue: String, native: String },

    #[error("venue {venue} is paused by the backoff controller: {reason}, resumes in {remaining_secs}s")]
    VenuePaused {
        venue: String,
        reason: String,
        remaining_secs: u64,
    },

    #[error("private channel authentication failed for venue {venue}: {reason}")]
    AuthFailed { venue: String, reason: String },

    #[error("venue {venue} rejected tx batch request {request_id:?}: {message} (code {code})")]
    TxBatchRejected {
        venue: String,
        request_id: Option<String>,
        code: i64,
        message: String,
    },

    #[error("tx batch request to venue {venue} timed out after {timeout_secs}s")]
    TxBatchTimeout { venue: String, timeout_secs: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("contract metadata fetch failed for venue {venue}: {source}")]
    MetadataFetchFailed {
        venue: String,
        #[source]
        source: reqwest::Error,
    },
}
