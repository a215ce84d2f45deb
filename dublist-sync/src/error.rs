//! Error types for dublist-sync
//!
//! Provider calls never surface here; they are classified by the call
//! harness. These errors cover setup and persistence.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// Scan bounds that describe an empty range
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// dublist-common error (I/O, JSON, config)
    #[error("Common error: {0}")]
    Common(#[from] dublist_common::Error),
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
