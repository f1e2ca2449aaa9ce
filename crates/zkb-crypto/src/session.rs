//! Session key lifetime and salt persistence
//!
//! The keyring holds at most one derived key. `set`/`clear` are explicit;
//! there is no expiry. Every change bumps an epoch so an operation that was
//! running while the key got cleared fails instead of finishing under the
//! stale key.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use secrecy::SecretString;
use tracing::{debug, info};

use crate::error::{CryptoError, CryptoResult};
use crate::kdf::{derive_key, KdfParams, KeySalt, SessionKey};

/// Where the local key derivation salt lives.
pub trait SaltStore {
    /// Load the persisted salt, if one was ever created.
    fn load(&self) -> CryptoResult<Option<KeySalt>>;
    /// Persist a newly generated salt. Fails if a salt already exists.
    fn save(&self, salt: &KeySalt) -> CryptoResult<()>;
}

/// Salt stored as a single base64 line in a file.
#[derive(Debug, Clone)]
pub struct FileSaltStore {
    path: PathBuf,
}

impl FileSaltStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SaltStore for FileSaltStore {
    fn load(&self) -> CryptoResult<Option<KeySalt>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        KeySalt::from_base64(&content).map(Some)
    }

    fn save(&self, salt: &KeySalt) -> CryptoResult<()> {
        use std::io::Write;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // create_new: the salt is immutable once written
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    CryptoError::SaltStore(format!(
                        "salt already exists at {}",
                        self.path.display()
                    ))
                } else {
                    CryptoError::Io(e)
                }
            })?;
        writeln!(file, "{}", salt.to_base64())?;
        file.sync_all()?;
        Ok(())
    }
}

/// In-memory salt store (tests, ephemeral vaults).
#[derive(Debug, Default)]
pub struct MemorySaltStore {
    salt: Mutex<Option<KeySalt>>,
}

impl SaltStore for MemorySaltStore {
    fn load(&self) -> CryptoResult<Option<KeySalt>> {
        Ok(*self.salt.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn save(&self, salt: &KeySalt) -> CryptoResult<()> {
        let mut slot = self.salt.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(CryptoError::SaltStore("salt already exists".into()));
        }
        *slot = Some(*salt);
        Ok(())
    }
}

#[derive(Default)]
struct Slot {
    epoch: u64,
    key: Option<Arc<SessionKey>>,
}

/// Holds the session key for the lifetime of an unlocked session.
#[derive(Default)]
pub struct SessionKeyring {
    slot: RwLock<Slot>,
}

impl SessionKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load (or create and persist) the salt, derive the key, install it.
    pub fn unlock(
        &self,
        password: &SecretString,
        salts: &dyn SaltStore,
        params: &KdfParams,
    ) -> CryptoResult<()> {
        let salt = match salts.load()? {
            Some(salt) => salt,
            None => {
                let salt = KeySalt::generate();
                salts.save(&salt)?;
                info!("generated new key derivation salt");
                salt
            }
        };
        let key = derive_key(password, &salt, params)?;
        self.set(key);
        Ok(())
    }

    pub fn set(&self, key: SessionKey) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.epoch += 1;
        slot.key = Some(Arc::new(key));
        debug!(epoch = slot.epoch, "session key installed");
    }

    /// Drop the key (logout / lock).
    pub fn clear(&self) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.epoch += 1;
        slot.key = None;
        debug!(epoch = slot.epoch, "session key cleared");
    }

    pub fn is_unlocked(&self) -> bool {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .key
            .is_some()
    }

    /// Run `op` with the current key.
    ///
    /// Fails with [`CryptoError::Locked`] if there is no key, or if the key
    /// was replaced or cleared before `op` returned.
    pub fn with_key<T>(&self, op: impl FnOnce(&SessionKey) -> CryptoResult<T>) -> CryptoResult<T> {
        let (epoch, key) = {
            let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
            let key = slot.key.clone().ok_or(CryptoError::Locked)?;
            (slot.epoch, key)
        };

        let out = op(&key)?;

        if self.epoch() != epoch {
            return Err(CryptoError::Locked);
        }
        Ok(out)
    }

    fn epoch(&self) -> u64 {
        self.slot.read().unwrap_or_else(PoisonError::into_inner).epoch
    }
}

impl std::fmt::Debug for SessionKeyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKeyring")
            .field("unlocked", &self.is_unlocked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{decrypt_json, encrypt_json};
    use crate::KEY_SIZE;

    fn fast_params() -> KdfParams {
        KdfParams {
            mem_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_locked_by_default() {
        let ring = SessionKeyring::new();
        assert!(!ring.is_unlocked());
        let result = ring.with_key(|_| Ok(()));
        assert!(matches!(result, Err(CryptoError::Locked)));
    }

    #[test]
    fn test_set_then_clear() {
        let ring = SessionKeyring::new();
        ring.set(SessionKey::from_bytes([3u8; KEY_SIZE]));
        assert!(ring.is_unlocked());
        ring.with_key(|k| {
            assert_eq!(k.as_bytes(), &[3u8; KEY_SIZE]);
            Ok(())
        })
        .unwrap();

        ring.clear();
        assert!(!ring.is_unlocked());
        assert!(matches!(ring.with_key(|_| Ok(())), Err(CryptoError::Locked)));
    }

    #[test]
    fn test_clear_during_operation_fails() {
        let ring = SessionKeyring::new();
        ring.set(SessionKey::from_bytes([9u8; KEY_SIZE]));

        let result = ring.with_key(|key| {
            let env = encrypt_json(&"in flight", key)?;
            ring.clear();
            Ok(env)
        });

        assert!(matches!(result, Err(CryptoError::Locked)));
    }

    #[test]
    fn test_unlock_persists_salt_once() {
        let store = MemorySaltStore::default();
        let password = SecretString::from("hunter22");

        let ring = SessionKeyring::new();
        ring.unlock(&password, &store, &fast_params()).unwrap();
        let salt = store.load().unwrap().expect("salt persisted");
        let env = ring.with_key(|k| encrypt_json(&42u32, k)).unwrap();

        // A second session with the same password and salt decrypts
        let ring2 = SessionKeyring::new();
        ring2.unlock(&password, &store, &fast_params()).unwrap();
        assert_eq!(store.load().unwrap(), Some(salt));
        let value: u32 = ring2.with_key(|k| decrypt_json(&env, k)).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_wrong_password_cannot_decrypt() {
        let store = MemorySaltStore::default();
        let ring = SessionKeyring::new();
        ring.unlock(&SecretString::from("right"), &store, &fast_params())
            .unwrap();
        let env = ring.with_key(|k| encrypt_json(&"secret", k)).unwrap();

        ring.unlock(&SecretString::from("wrong"), &store, &fast_params())
            .unwrap();
        let result: CryptoResult<String> = ring.with_key(|k| decrypt_json(&env, k));
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn test_file_salt_store_roundtrip_and_immutable() {
        let tmp = tempfile::TempDir::new().unwrap();
        let store = FileSaltStore::new(tmp.path().join("nested/salt"));

        assert!(store.load().unwrap().is_none());
        let salt = KeySalt::generate();
        store.save(&salt).unwrap();
        assert_eq!(store.load().unwrap(), Some(salt));

        let err = store.save(&KeySalt::generate()).unwrap_err();
        assert!(matches!(err, CryptoError::SaltStore(_)));
        assert_eq!(store.load().unwrap(), Some(salt), "salt must not change");
    }
}
