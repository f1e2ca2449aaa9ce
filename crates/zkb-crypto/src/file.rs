//! Vault file encryption, same key and cipher as documents

use serde::{Deserialize, Serialize};

use crate::cipher::{decrypt_bytes, encrypt_bytes, Envelope};
use crate::error::CryptoResult;
use crate::kdf::SessionKey;

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// An encrypted vault file as stored locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedFile {
    pub payload: String,
    pub iv: String,
    pub mime_type: String,
    /// Plaintext size in bytes
    pub original_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedFile {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

pub fn encrypt_file(
    bytes: &[u8],
    mime_type: Option<&str>,
    key: &SessionKey,
) -> CryptoResult<EncryptedFile> {
    let envelope = encrypt_bytes(bytes, key)?;
    Ok(EncryptedFile {
        payload: envelope.payload,
        iv: envelope.iv,
        mime_type: normalize_mime(mime_type),
        original_size: bytes.len() as u64,
    })
}

pub fn decrypt_file(file: &EncryptedFile, key: &SessionKey) -> CryptoResult<DecryptedFile> {
    let envelope = Envelope {
        iv: file.iv.clone(),
        payload: file.payload.clone(),
    };
    let bytes = decrypt_bytes(&envelope, key)?;
    if bytes.len() as u64 != file.original_size {
        tracing::warn!(
            expected = file.original_size,
            actual = bytes.len(),
            "decrypted vault file size differs from recorded size"
        );
    }
    Ok(DecryptedFile {
        bytes,
        mime_type: normalize_mime(Some(&file.mime_type)),
    })
}

fn normalize_mime(mime_type: Option<&str>) -> String {
    match mime_type.map(str::trim) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => DEFAULT_MIME_TYPE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CryptoError;
    use crate::hash::hash_file;
    use crate::KEY_SIZE;

    fn key() -> SessionKey {
        SessionKey::from_bytes([5u8; KEY_SIZE])
    }

    #[test]
    fn test_file_roundtrip_keeps_mime() {
        let pdf = b"%PDF-1.7 fake body".to_vec();
        let enc = encrypt_file(&pdf, Some("application/pdf"), &key()).unwrap();
        assert_eq!(enc.original_size, pdf.len() as u64);
        assert_eq!(enc.mime_type, "application/pdf");

        let dec = decrypt_file(&enc, &key()).unwrap();
        assert_eq!(dec.bytes, pdf);
        assert_eq!(dec.mime_type, "application/pdf");
        assert_eq!(hash_file(&dec.bytes), hash_file(&pdf));
    }

    #[test]
    fn test_missing_mime_defaults() {
        let enc = encrypt_file(b"raw", None, &key()).unwrap();
        assert_eq!(enc.mime_type, DEFAULT_MIME_TYPE);
        let enc = encrypt_file(b"raw", Some("  "), &key()).unwrap();
        assert_eq!(enc.mime_type, DEFAULT_MIME_TYPE);
    }

    #[test]
    fn test_wrong_key_fails() {
        let enc = encrypt_file(b"scan", Some("image/png"), &key()).unwrap();
        let other = SessionKey::from_bytes([6u8; KEY_SIZE]);
        assert!(matches!(
            decrypt_file(&enc, &other),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn test_serialized_shape() {
        let enc = encrypt_file(b"abc", Some("text/plain"), &key()).unwrap();
        let json = serde_json::to_value(&enc).unwrap();
        assert_eq!(json["mimeType"], "text/plain");
        assert_eq!(json["originalSize"], 3);
        assert!(json["iv"].is_string());
    }
}
