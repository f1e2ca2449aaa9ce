//! zkb-proofs: the remote proof store
//!
//! The server only ever sees digests. Each record is keyed by the
//! authenticated owner and the subject id, so one owner can never read,
//! overwrite or even detect another owner's records.
//!
//! - `store`: owner-scoped record maps, optionally mirrored to a JSON file
//! - `validate`: request body checks run before any store access
//! - `auth`: bearer token to owner resolution
//! - `api`: axum router for the `/api` surface
//! - `metrics`: prometheus counters

pub mod api;
pub mod auth;
pub mod error;
pub mod metrics;
pub mod store;
pub mod validate;

pub use api::{router, AppState};
pub use auth::{Authenticator, OwnerId, TokenAuthenticator};
pub use error::{ApiError, StoreError, StoreResult};
pub use metrics::ProofMetrics;
pub use store::ProofStore;
