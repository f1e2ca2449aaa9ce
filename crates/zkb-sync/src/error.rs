//! Sync error types.

use thiserror::Error;
use zkb_crypto::CryptoError;

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    /// Rejected locally, before any request was sent
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not authenticated")]
    Unauthenticated,

    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no proof server configured")]
    Offline,

    /// The highest existing number for the prefix has no successor
    #[error("no document number left after {prefix}")]
    NumberingExhausted { prefix: String },

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("record store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Transport failures and 5xx answers may succeed on a later attempt.
    /// Nothing retries automatically.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Http(e) => !e.is_decode() && !e.is_builder(),
            SyncError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// The session key is missing or was cleared mid-operation.
    pub fn is_locked(&self) -> bool {
        matches!(self, SyncError::Crypto(CryptoError::Locked))
    }
}
