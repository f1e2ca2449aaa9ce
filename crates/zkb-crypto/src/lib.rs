//! zkb-crypto: client-side encryption and integrity hashing for zerok-billing
//!
//! Nothing in this crate talks to the network. The server only ever sees the
//! digests produced by [`hash`]; keys and plaintext stay on the client.
//!
//! ```text
//! password + salt ──Argon2id──▶ SessionKey (memory only, SessionKeyring)
//!   ├── documents / files: AES-256-GCM, fresh 96-bit IV per call → Envelope { iv, payload }
//!   └── export archive: own password + own salt → Archive { version, salt, iv, payload, kdf }
//!
//! document ──canonicalize──▶ stable JSON ──SHA-256──▶ Digest (64 hex)
//! ```

pub mod archive;
pub mod cipher;
pub mod error;
pub mod file;
pub mod hash;
pub mod kdf;
pub mod session;

pub use archive::{create_archive, open_archive, Archive, ArchiveBundle, ARCHIVE_VERSION};
pub use cipher::{decrypt_bytes, decrypt_json, encrypt_bytes, encrypt_json, Envelope};
pub use error::{CryptoError, CryptoResult};
pub use file::{decrypt_file, encrypt_file, DecryptedFile, EncryptedFile};
pub use hash::{canonicalize, digest, hash_document, hash_file, hash_reader, DocumentKind};
pub use kdf::{derive_key, KdfParams, KeySalt, SessionKey};
pub use session::{FileSaltStore, MemorySaltStore, SaltStore, SessionKeyring};

/// Size of an AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM initialization vector (96-bit)
pub const IV_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of a key derivation salt
pub const SALT_SIZE: usize = 16;
