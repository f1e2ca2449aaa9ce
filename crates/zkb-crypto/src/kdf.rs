//! Key derivation: Argon2id password + persisted salt → session key

use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretBox, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};
use crate::{KEY_SIZE, SALT_SIZE};

/// AES-256 key of an unlocked session.
///
/// Memory only; the bytes sit in a [`SecretBox`] and are zeroized on drop.
/// Keys from [`derive_key`] remember the salt they came from, so a caller
/// can tell whether a key matches the salt persisted next to its vault.
pub struct SessionKey {
    bytes: SecretBox<[u8; KEY_SIZE]>,
    salt: Option<KeySalt>,
}

impl SessionKey {
    /// Wrap raw key bytes that were not derived here.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self {
            bytes: SecretBox::new(Box::new(bytes)),
            salt: None,
        }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        self.bytes.expose_secret()
    }

    /// Salt this key was derived with, `None` for raw keys.
    pub fn salt(&self) -> Option<&KeySalt> {
        self.salt.as_ref()
    }

    pub fn derived_from(&self, salt: &KeySalt) -> bool {
        self.salt.as_ref() == Some(salt)
    }
}

impl Clone for SessionKey {
    fn clone(&self) -> Self {
        Self {
            bytes: SecretBox::new(Box::new(*self.as_bytes())),
            salt: self.salt,
        }
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("bytes", &"[REDACTED]")
            .field("salt", &self.salt)
            .finish()
    }
}

/// Random salt combined with the password. Not secret; stored in plaintext
/// next to the encrypted data and never changed once created.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KeySalt([u8; SALT_SIZE]);

impl KeySalt {
    /// Draw a new salt from the OS CSPRNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    pub fn from_base64(s: &str) -> CryptoResult<Self> {
        let raw = STANDARD
            .decode(s.trim())
            .map_err(|e| CryptoError::InvalidSalt(format!("base64 decode: {e}")))?;
        let bytes: [u8; SALT_SIZE] = raw.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidSalt(format!(
                "expected {SALT_SIZE} bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for KeySalt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("KeySalt").field(&self.to_base64()).finish()
    }
}

/// Argon2id parameters for KDF. Serialized into export archives so they
/// open with the parameters they were written with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KdfParams {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

impl From<&zkb_core::config::CryptoConfig> for KdfParams {
    fn from(cfg: &zkb_core::config::CryptoConfig) -> Self {
        Self {
            mem_cost_kib: cfg.argon2_mem_cost_kib,
            time_cost: cfg.argon2_time_cost,
            parallelism: cfg.argon2_parallelism,
        }
    }
}

/// Derive a 256-bit session key from a password and salt using Argon2id.
///
/// Deterministic: the same password, salt and parameters always give the
/// same key.
pub fn derive_key(
    password: &SecretString,
    salt: &KeySalt,
    params: &KdfParams,
) -> CryptoResult<SessionKey> {
    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoError::Kdf(format!("invalid Argon2id params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut bytes = Box::new([0u8; KEY_SIZE]);
    argon2
        .hash_password_into(password.expose_secret().as_bytes(), salt.as_bytes(), &mut bytes[..])
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;

    Ok(SessionKey {
        bytes: SecretBox::new(bytes),
        salt: Some(*salt),
    })
}
