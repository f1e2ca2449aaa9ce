//! zkb-core: pieces shared by the proof server, the sync client and the CLI
//!
//! - `config`: TOML configuration schema
//! - `digest`: the 64-hex SHA-256 digest newtype used on the wire
//! - `limits`: validation bounds shared by client and server
//! - `types`: JSON request/response bodies of the `/api` surface

pub mod config;
pub mod digest;
pub mod error;
pub mod limits;
pub mod types;

pub use digest::Digest;
pub use error::{ZkbError, ZkbResult};
