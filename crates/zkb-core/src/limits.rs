//! Validation bounds for the proof API. Client and server both read these.

/// Maximum length of an invoice / quote identifier
pub const INVOICE_ID_MAX: usize = 100;

/// Maximum length of a vault document identifier
pub const DOCUMENT_ID_MAX: usize = 100;

pub const FILENAME_MAX: usize = 255;

pub const MIMETYPE_MAX: usize = 100;

/// Length of a SHA-256 digest in lowercase hex
pub const HASH_HEX_LENGTH: usize = 64;

pub const SIGNATURE_MAX: usize = 512;

/// Maximum number of checks in one batch verification request
pub const VERIFY_BATCH_MAX: usize = 200;

/// Maximum accepted JSON request body (512 KiB)
pub const JSON_BODY_LIMIT: usize = 512 * 1024;
