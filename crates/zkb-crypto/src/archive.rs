//! Portable encrypted export archive
//!
//! Archive file (JSON):
//! ```text
//! { "version": 1, "salt": base64(16), "iv": base64(12), "payload": base64(ciphertext),
//!   "kdf": { "memCostKib": 65536, "timeCost": 3, "parallelism": 4 } }
//! ```
//!
//! The archive password is independent of the session password and every
//! archive gets its own salt. The Argon2id parameters travel in `kdf`, so an
//! archive opens on any device whatever its local `[crypto]` settings.
//! Archives without `kdf` were written with [`KdfParams::default`].

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cipher::{decrypt_bytes, encrypt_json, Envelope};
use crate::error::{CryptoError, CryptoResult};
use crate::kdf::{derive_key, KdfParams, KeySalt};

pub const ARCHIVE_VERSION: u32 = 1;

/// Upper bounds on embedded KDF parameters; an archive asking for more is
/// rejected before any key derivation runs.
const MAX_MEM_COST_KIB: u32 = 1024 * 1024;
const MAX_TIME_COST: u32 = 16;
const MAX_PARALLELISM: u32 = 16;

/// Collections that must be present (and arrays) in a decrypted bundle
const REQUIRED_COLLECTIONS: [&str; 4] = ["clients", "devis", "factures", "layoutProfiles"];

/// Everything exported from a local store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArchiveBundle {
    pub clients: Vec<Value>,
    #[serde(rename = "devis")]
    pub quotes: Vec<Value>,
    #[serde(rename = "factures")]
    pub invoices: Vec<Value>,
    #[serde(rename = "layoutProfiles")]
    pub layout_profiles: Vec<Value>,
    /// Issuing company profile
    #[serde(rename = "societe", default, skip_serializing_if = "Option::is_none")]
    pub company: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Archive {
    #[serde(alias = "v")]
    pub version: u32,
    pub salt: String,
    pub iv: String,
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kdf: Option<KdfParams>,
}

impl Archive {
    pub fn to_json(&self) -> CryptoResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse an archive file. Anything that is not an archive object is
    /// [`CryptoError::InvalidArchive`].
    pub fn from_json(content: &str) -> CryptoResult<Self> {
        serde_json::from_str(content).map_err(|_| CryptoError::InvalidArchive)
    }
}

/// Encrypt `bundle` under a key derived from `password` and a fresh salt.
pub fn create_archive(
    bundle: &ArchiveBundle,
    password: &SecretString,
    params: &KdfParams,
) -> CryptoResult<Archive> {
    let salt = KeySalt::generate();
    let key = derive_key(password, &salt, params)?;
    let envelope = encrypt_json(bundle, &key)?;

    tracing::debug!(
        clients = bundle.clients.len(),
        quotes = bundle.quotes.len(),
        invoices = bundle.invoices.len(),
        "archive created"
    );

    Ok(Archive {
        version: ARCHIVE_VERSION,
        salt: salt.to_base64(),
        iv: envelope.iv,
        payload: envelope.payload,
        kdf: Some(params.clone()),
    })
}

/// KDF parameters an archive was written with, bounded.
fn archive_params(archive: &Archive) -> CryptoResult<KdfParams> {
    let Some(params) = archive.kdf.clone() else {
        return Ok(KdfParams::default());
    };
    let in_bounds = (1..=MAX_PARALLELISM).contains(&params.parallelism)
        && (1..=MAX_TIME_COST).contains(&params.time_cost)
        && (8 * params.parallelism..=MAX_MEM_COST_KIB).contains(&params.mem_cost_kib);
    if !in_bounds {
        tracing::warn!(?params, "archive KDF parameters out of bounds");
        return Err(CryptoError::InvalidArchive);
    }
    Ok(params)
}

/// Decrypt and validate an archive.
///
/// The key is derived with the parameters recorded in the archive. Wrong
/// password, corrupted payload and a structurally invalid bundle all
/// surface as the same [`CryptoError::InvalidArchive`].
pub fn open_archive(archive: &Archive, password: &SecretString) -> CryptoResult<ArchiveBundle> {
    if archive.version != ARCHIVE_VERSION {
        return Err(CryptoError::UnsupportedVersion {
            found: archive.version,
            expected: ARCHIVE_VERSION,
        });
    }

    let salt = KeySalt::from_base64(&archive.salt).map_err(|_| CryptoError::InvalidArchive)?;
    let params = archive_params(archive)?;
    let key = derive_key(password, &salt, &params)?;

    let envelope = Envelope {
        iv: archive.iv.clone(),
        payload: archive.payload.clone(),
    };
    let plaintext = decrypt_bytes(&envelope, &key).map_err(|_| CryptoError::InvalidArchive)?;
    let value: Value =
        serde_json::from_slice(&plaintext).map_err(|_| CryptoError::InvalidArchive)?;

    let structurally_valid = REQUIRED_COLLECTIONS
        .iter()
        .all(|name| value.get(name).is_some_and(Value::is_array));
    if !structurally_valid {
        return Err(CryptoError::InvalidArchive);
    }

    serde_json::from_value(value).map_err(|_| CryptoError::InvalidArchive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::encrypt_bytes;
    use serde_json::json;

    fn fast_params() -> KdfParams {
        KdfParams {
            mem_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    fn sample_bundle() -> ArchiveBundle {
        ArchiveBundle {
            clients: vec![json!({ "id": "c1", "nom": "ACME" })],
            quotes: vec![json!({ "id": "d1", "entete": { "numero": "DEV-2026-001" }, "total": 100 })],
            invoices: vec![json!({ "id": "f1", "total": 120, "tvaMontant": 20 })],
            layout_profiles: vec![json!({ "id": "default", "blocks": [] })],
            company: Some(json!({ "nom": "Ma Societe", "siret": "123" })),
        }
    }

    /// Archive whose payload is `value` encrypted under `password`
    fn archive_of(value: &Value, password: &str) -> Archive {
        let salt = KeySalt::generate();
        let key = derive_key(&SecretString::from(password), &salt, &fast_params()).unwrap();
        let env = encrypt_bytes(&serde_json::to_vec(value).unwrap(), &key).unwrap();
        Archive {
            version: ARCHIVE_VERSION,
            salt: salt.to_base64(),
            iv: env.iv,
            payload: env.payload,
            kdf: Some(fast_params()),
        }
    }

    #[test]
    fn test_archive_roundtrip() {
        let bundle = sample_bundle();
        let pw = SecretString::from("export-pass");

        let archive = create_archive(&bundle, &pw, &fast_params()).unwrap();
        let text = archive.to_json().unwrap();
        let reopened = Archive::from_json(&text).unwrap();
        let restored = open_archive(&reopened, &pw).unwrap();

        assert_eq!(restored, bundle);
    }

    #[test]
    fn test_wrong_password_is_invalid_archive() {
        let archive =
            create_archive(&sample_bundle(), &SecretString::from("right"), &fast_params()).unwrap();
        let result = open_archive(&archive, &SecretString::from("wrong"));
        assert!(matches!(result, Err(CryptoError::InvalidArchive)));
    }

    #[test]
    fn test_each_archive_has_its_own_salt() {
        let pw = SecretString::from("pw");
        let a = create_archive(&sample_bundle(), &pw, &fast_params()).unwrap();
        let b = create_archive(&sample_bundle(), &pw, &fast_params()).unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.iv, b.iv);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let pw = SecretString::from("pw");
        let mut archive = create_archive(&sample_bundle(), &pw, &fast_params()).unwrap();
        archive.version = 2;
        assert!(matches!(
            open_archive(&archive, &pw),
            Err(CryptoError::UnsupportedVersion { found: 2, expected: 1 })
        ));
    }

    #[test]
    fn test_legacy_v_key_accepted() {
        let pw = SecretString::from("pw");
        let archive = create_archive(&sample_bundle(), &pw, &fast_params()).unwrap();
        let legacy = json!({
            "v": 1,
            "salt": archive.salt,
            "iv": archive.iv,
            "payload": archive.payload,
            "kdf": { "memCostKib": 1024, "timeCost": 1, "parallelism": 1 },
        })
        .to_string();

        let parsed = Archive::from_json(&legacy).unwrap();
        assert_eq!(parsed.version, 1);
        assert_eq!(open_archive(&parsed, &pw).unwrap(), sample_bundle());
    }

    #[test]
    fn test_missing_collection_is_invalid_archive() {
        let payload = json!({ "clients": [], "devis": [], "factures": [] });
        let archive = archive_of(&payload, "pw");
        assert!(matches!(
            open_archive(&archive, &SecretString::from("pw")),
            Err(CryptoError::InvalidArchive)
        ));
    }

    #[test]
    fn test_non_array_collection_is_invalid_archive() {
        let payload = json!({ "clients": [], "devis": {}, "factures": [], "layoutProfiles": [] });
        let archive = archive_of(&payload, "pw");
        assert!(matches!(
            open_archive(&archive, &SecretString::from("pw")),
            Err(CryptoError::InvalidArchive)
        ));
    }

    #[test]
    fn test_company_is_optional() {
        let payload = json!({ "clients": [], "devis": [], "factures": [], "layoutProfiles": [] });
        let archive = archive_of(&payload, "pw");
        let bundle = open_archive(&archive, &SecretString::from("pw")).unwrap();
        assert!(bundle.company.is_none());
        assert!(bundle.quotes.is_empty());
    }

    #[test]
    fn test_garbage_file_is_invalid_archive() {
        assert!(matches!(
            Archive::from_json("not json"),
            Err(CryptoError::InvalidArchive)
        ));
        assert!(matches!(
            Archive::from_json(r#"{"version":1}"#),
            Err(CryptoError::InvalidArchive)
        ));
    }

    #[test]
    fn test_corrupted_salt_is_invalid_archive() {
        let pw = SecretString::from("pw");
        let mut archive = create_archive(&sample_bundle(), &pw, &fast_params()).unwrap();
        archive.salt = "AAAA".into();
        assert!(matches!(
            open_archive(&archive, &pw),
            Err(CryptoError::InvalidArchive)
        ));
    }

    #[test]
    fn test_archive_carries_its_kdf_params() {
        let pw = SecretString::from("pw");
        let archive = create_archive(&sample_bundle(), &pw, &fast_params()).unwrap();
        let text = archive.to_json().unwrap();
        assert!(text.contains("\"memCostKib\": 1024"));

        // Opening needs nothing beyond the file and the password.
        let reopened = Archive::from_json(&text).unwrap();
        assert_eq!(reopened.kdf, Some(fast_params()));
        assert_eq!(open_archive(&reopened, &pw).unwrap(), sample_bundle());
    }

    #[test]
    fn test_archive_without_kdf_uses_defaults() {
        let mut archive = archive_of(&json!({}), "pw");
        archive.kdf = None;
        assert_eq!(archive_params(&archive).unwrap(), KdfParams::default());
        assert!(!archive.to_json().unwrap().contains("kdf"));
    }

    #[test]
    fn test_oversized_kdf_params_rejected() {
        let pw = SecretString::from("pw");
        let mut archive = create_archive(&sample_bundle(), &pw, &fast_params()).unwrap();
        for params in [
            KdfParams { mem_cost_kib: u32::MAX, ..fast_params() },
            KdfParams { time_cost: 1000, ..fast_params() },
            KdfParams { parallelism: 0, ..fast_params() },
            KdfParams { mem_cost_kib: 4, parallelism: 1, time_cost: 1 },
        ] {
            archive.kdf = Some(params);
            assert!(matches!(
                open_archive(&archive, &pw),
                Err(CryptoError::InvalidArchive)
            ));
        }
    }
}
