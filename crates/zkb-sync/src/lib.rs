//! zkb-sync: keeps the local encrypted vault and the remote proof store
//! consistent
//!
//! - `client`: typed HTTP client for the `/api` proof surface
//! - `records`: persistence seam for encrypted local records
//! - `vault`: encrypt-then-store documents and files, then sync their proofs;
//!   export and import of the whole vault as an archive

pub mod client;
pub mod error;
pub mod records;
pub mod vault;

pub use client::{FileMeta, ProofClient};
pub use error::{SyncError, SyncResult};
pub use records::{JsonFileRecordStore, MemoryRecordStore, RecordStore};
pub use vault::{CleanupReport, ImportReport, ProofStatus, SaveOutcome, Vault, VaultFile};
