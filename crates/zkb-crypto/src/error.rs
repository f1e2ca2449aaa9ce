use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key derivation failed: {0}")]
    Kdf(String),

    #[error("invalid salt: {0}")]
    InvalidSalt(String),

    #[error("encryption failed")]
    Encryption,

    /// Tag mismatch, wrong key, bad IV or undecodable envelope. Deliberately
    /// carries no detail.
    #[error("decryption failed: wrong key or corrupted data")]
    Decryption,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no encryption key: session is locked")]
    Locked,

    #[error("unsupported archive version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("invalid archive or wrong password")]
    InvalidArchive,

    #[error("salt store: {0}")]
    SaltStore(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
