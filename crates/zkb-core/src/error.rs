use thiserror::Error;

pub type ZkbResult<T> = Result<T, ZkbError>;

#[derive(Debug, Error)]
pub enum ZkbError {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
