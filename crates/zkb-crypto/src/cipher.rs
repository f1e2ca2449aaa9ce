//! AES-256-GCM envelopes for JSON documents and raw bytes
//!
//! Envelope format (JSON):
//! ```text
//! { "iv": base64(12 random bytes), "payload": base64(ciphertext || 16-byte tag) }
//! ```
//!
//! The IV is always drawn from the OS RNG inside [`encrypt_bytes`]; callers
//! cannot supply one. Updating a document means encrypting it again into a
//! new envelope.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::kdf::SessionKey;
use crate::IV_SIZE;

/// Bytes per base64 encode step. A multiple of 3, so per-slice encodings
/// concatenate without inner padding.
pub const B64_CHUNK: usize = 3 * 2731;

/// Base64 characters per decode step (a multiple of 4).
const B64_DECODE_CHUNK: usize = 4 * 2048;

/// One encrypted payload. Never reused or mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// base64 initialization vector
    pub iv: String,
    /// base64 ciphertext with the GCM tag appended
    pub payload: String,
}

/// Encrypt raw bytes under `key` with a fresh random IV.
pub fn encrypt_bytes(plaintext: &[u8], key: &SessionKey) -> CryptoResult<Envelope> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CryptoError::Encryption)?;

    Ok(Envelope {
        iv: encode_b64(&iv),
        payload: encode_b64(&ciphertext),
    })
}

/// Decrypt an envelope. Any tampering, wrong key or malformed field gives
/// [`CryptoError::Decryption`].
pub fn decrypt_bytes(envelope: &Envelope, key: &SessionKey) -> CryptoResult<Vec<u8>> {
    let iv = decode_b64(&envelope.iv).map_err(|_| CryptoError::Decryption)?;
    if iv.len() != IV_SIZE {
        return Err(CryptoError::Decryption);
    }
    let ciphertext = decode_b64(&envelope.payload).map_err(|_| CryptoError::Decryption)?;

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
        .map_err(|_| CryptoError::Decryption)
}

/// Serialize `value` to JSON and encrypt it.
pub fn encrypt_json<T: Serialize + ?Sized>(value: &T, key: &SessionKey) -> CryptoResult<Envelope> {
    let mut plaintext = serde_json::to_vec(value)?;
    let result = encrypt_bytes(&plaintext, key);
    plaintext.zeroize();
    result
}

/// Decrypt an envelope and parse the plaintext as JSON.
pub fn decrypt_json<T: DeserializeOwned>(envelope: &Envelope, key: &SessionKey) -> CryptoResult<T> {
    let mut plaintext = decrypt_bytes(envelope, key)?;
    let parsed = serde_json::from_slice(&plaintext);
    plaintext.zeroize();
    Ok(parsed?)
}

/// Standard base64, fed in [`B64_CHUNK`] slices.
pub(crate) fn encode_b64(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len().div_ceil(3) * 4);
    for chunk in data.chunks(B64_CHUNK) {
        STANDARD.encode_string(chunk, &mut out);
    }
    out
}

pub(crate) fn decode_b64(s: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let bytes = s.trim().as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / 4 * 3);
    for chunk in bytes.chunks(B64_DECODE_CHUNK) {
        STANDARD.decode_vec(chunk, &mut out)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KEY_SIZE, TAG_SIZE};
    use proptest::prelude::*;
    use serde_json::json;

    fn test_key() -> SessionKey {
        SessionKey::from_bytes([42u8; KEY_SIZE])
    }

    #[test]
    fn test_json_roundtrip() {
        let key = test_key();
        let doc = json!({
            "id": "f1",
            "entete": { "numero": "FAC-2026-001", "client": "ACME" },
            "lignes": [{ "designation": "Audit", "qty": 2, "pu": 450.5 }],
            "total": 901
        });

        let env = encrypt_json(&doc, &key).unwrap();
        let back: serde_json::Value = decrypt_json(&env, &key).unwrap();

        assert_eq!(back, doc);
    }

    #[test]
    fn test_same_plaintext_fresh_iv() {
        let key = test_key();
        let a = encrypt_json(&"same", &key).unwrap();
        let b = encrypt_json(&"same", &key).unwrap();

        assert_ne!(a.iv, b.iv, "every encryption must draw a new IV");
        assert_ne!(a.payload, b.payload);
    }

    #[test]
    fn test_wrong_key_fails() {
        let env = encrypt_bytes(b"secret", &test_key()).unwrap();
        let other = SessionKey::from_bytes([1u8; KEY_SIZE]);
        assert!(matches!(
            decrypt_bytes(&env, &other),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn test_tampered_payload_fails() {
        let key = test_key();
        let env = encrypt_bytes(b"secret data", &key).unwrap();

        let mut raw = decode_b64(&env.payload).unwrap();
        raw[0] ^= 0x01;
        let tampered = Envelope {
            iv: env.iv.clone(),
            payload: encode_b64(&raw),
        };

        assert!(matches!(
            decrypt_bytes(&tampered, &key),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn test_tampered_iv_fails() {
        let key = test_key();
        let env = encrypt_bytes(b"secret data", &key).unwrap();

        let mut iv = decode_b64(&env.iv).unwrap();
        iv[IV_SIZE - 1] ^= 0x80;
        let tampered = Envelope {
            iv: encode_b64(&iv),
            payload: env.payload.clone(),
        };

        assert!(decrypt_bytes(&tampered, &key).is_err());
    }

    #[test]
    fn test_short_iv_and_garbage_base64_fail_closed() {
        let key = test_key();
        let env = encrypt_bytes(b"x", &key).unwrap();

        let short_iv = Envelope {
            iv: encode_b64(&[0u8; 8]),
            payload: env.payload.clone(),
        };
        assert!(matches!(
            decrypt_bytes(&short_iv, &key),
            Err(CryptoError::Decryption)
        ));

        let garbage = Envelope {
            iv: env.iv.clone(),
            payload: "not base64 !!".into(),
        };
        assert!(matches!(
            decrypt_bytes(&garbage, &key),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn test_ciphertext_size() {
        let key = test_key();
        let env = encrypt_bytes(&[0u8; 1000], &key).unwrap();
        assert_eq!(decode_b64(&env.payload).unwrap().len(), 1000 + TAG_SIZE);
        assert_eq!(decode_b64(&env.iv).unwrap().len(), IV_SIZE);
    }

    #[test]
    fn test_chunked_base64_matches_one_shot() {
        let data: Vec<u8> = (0..B64_CHUNK * 3 + 17).map(|i| (i * 31) as u8).collect();
        let chunked = encode_b64(&data);
        assert_eq!(chunked, STANDARD.encode(&data));
        assert_eq!(decode_b64(&chunked).unwrap(), data);
    }

    #[test]
    fn test_large_payload_roundtrip() {
        let key = test_key();
        let data: Vec<u8> = (0..24 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        let env = encrypt_bytes(&data, &key).unwrap();
        assert_eq!(decrypt_bytes(&env, &key).unwrap(), data);
    }

    #[test]
    fn test_non_json_plaintext_is_json_error() {
        let key = test_key();
        let env = encrypt_bytes(b"\xff\xfe not json", &key).unwrap();
        let result: CryptoResult<serde_json::Value> = decrypt_json(&env, &key);
        assert!(matches!(result, Err(CryptoError::Json(_))));
    }

    proptest! {
        #[test]
        fn bytes_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..=4096)) {
            let key = test_key();
            let env = encrypt_bytes(&data, &key).unwrap();
            prop_assert_eq!(decrypt_bytes(&env, &key).unwrap(), data);
        }

        #[test]
        fn any_bit_flip_is_rejected(data in proptest::collection::vec(any::<u8>(), 1..=256), bit in 0usize..2048) {
            let key = test_key();
            let env = encrypt_bytes(&data, &key).unwrap();
            let mut raw = decode_b64(&env.payload).unwrap();
            let idx = (bit / 8) % raw.len();
            raw[idx] ^= 1 << (bit % 8);
            let tampered = Envelope { iv: env.iv.clone(), payload: encode_b64(&raw) };
            prop_assert!(decrypt_bytes(&tampered, &key).is_err());
        }
    }
}
