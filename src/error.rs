use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced to driver clients through `get_result` futures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The driver stopped before the request was serviced. Pending
    /// result futures fail with this instead of hanging.
    #[error("analysis driver was shut down")]
    ShutDown,

    /// The host analysis engine or linker reported a failure for a file.
    #[error("analysis of {path} failed: {reason}")]
    Analysis { path: PathBuf, reason: String },
}

/// Result of client-facing driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Failures in the summary layer.
///
/// `MissingUnlinked`/`MissingLinked` indicate a programmer error: the
/// in-memory store handed to the linker should have been fully populated
/// by the library-graph traversal. They are never retried.
#[derive(Error, Debug)]
pub enum SummaryError {
    #[error("no unlinked summary for {uri} in the in-memory store during link")]
    MissingUnlinked { uri: String },

    #[error("no linked summary for {uri} in the in-memory store during link")]
    MissingLinked { uri: String },

    /// A stored bundle failed to decode. Callers treat this as a cache
    /// miss and recompute the blob.
    #[error("malformed bundle under byte-store key {key}")]
    MalformedBundle {
        key: String,
        #[source]
        source: bincode::Error,
    },
}

/// Result of summary-layer operations.
pub type SummaryResult<T> = Result<T, SummaryError>;
