//! # Local Key Store
//!
//! Client-side persistence for key material that must survive a restart.
//!
//! ## What We Store
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      LOCAL KEY STORE                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  marketchat.uek.<username>     → UEK envelope bytes                    │
//! │                                  (private key, wrapped under a         │
//! │                                   password-derived key)                │
//! │                                                                         │
//! │  marketchat.pubkey.<user_id>   → counterparty public key (JWK JSON)    │
//! │                                                                         │
//! │  Nothing is stored in plaintext that is not already public.            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Backends
//!
//! - In-memory (default): a `RwLock<HashMap>`, gone when the process exits.
//! - File-backed: the same map, mirrored to a JSON file of base64 values
//!   after every write. The file is replaced atomically via rename.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use parking_lot::RwLock;
use zeroize::Zeroizing;

use crate::crypto::Jwk;
use crate::error::{Error, Result};

/// Key names for the local store
pub mod keys {
    /// Prefix for wrapped user encryption keys
    pub const WRAPPED_UEK_PREFIX: &str = "marketchat.uek.";

    /// Prefix for cached participant public keys
    pub const PUBLIC_KEY_PREFIX: &str = "marketchat.pubkey.";

    /// Entry name for `username`'s wrapped key
    pub fn wrapped_uek(username: &str) -> String {
        format!("{}{}", WRAPPED_UEK_PREFIX, username)
    }

    /// Entry name for `user_id`'s public key
    pub fn public_key(user_id: &str) -> String {
        format!("{}{}", PUBLIC_KEY_PREFIX, user_id)
    }
}

/// Persistent storage for wrapped keys and public keys
#[derive(Debug)]
pub struct LocalKeyStore {
    memory: RwLock<HashMap<String, Vec<u8>>>,
    path: Option<PathBuf>,
}

impl LocalKeyStore {
    /// Create an in-memory store
    pub fn new() -> Self {
        Self {
            memory: RwLock::new(HashMap::new()),
            path: None,
        }
    }

    /// Open a file-backed store, loading `path` if it exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let memory = if path.exists() {
            let text = fs::read_to_string(&path)?;
            let encoded: BTreeMap<String, String> = serde_json::from_str(&text)
                .map_err(|e| Error::StorageReadError(format!("Corrupt key store file: {}", e)))?;

            let mut map = HashMap::with_capacity(encoded.len());
            for (key, value) in encoded {
                let bytes = BASE64.decode(value.as_bytes()).map_err(|e| {
                    Error::StorageReadError(format!("Corrupt entry '{}': {}", key, e))
                })?;
                map.insert(key, bytes);
            }
            map
        } else {
            HashMap::new()
        };

        tracing::debug!(path = %path.display(), entries = memory.len(), "Opened key store");

        Ok(Self {
            memory: RwLock::new(memory),
            path: Some(path),
        })
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Store raw bytes under `key`
    pub fn store(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut storage = self.memory.write();
        storage.insert(key.to_string(), value.to_vec());
        self.persist(&storage)
    }

    /// Retrieve raw bytes stored under `key`
    pub fn retrieve(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let storage = self.memory.read();
        Ok(storage.get(key).cloned().map(Zeroizing::new))
    }

    /// Delete `key`, returning whether it existed
    pub fn delete(&self, key: &str) -> Result<bool> {
        let mut storage = self.memory.write();
        let existed = storage.remove(key).is_some();
        if existed {
            self.persist(&storage)?;
        }
        Ok(existed)
    }

    /// Check if `key` exists
    pub fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.memory.read().contains_key(key))
    }

    /// Write the current contents to the backing file
    ///
    /// Writes already persist; this is for callers that edited the file
    /// out from under the store and want it rewritten.
    pub fn flush(&self) -> Result<()> {
        let storage = self.memory.read();
        self.persist(&storage)
    }

    // ========================================================================
    // TYPED ACCESSORS
    // ========================================================================

    /// Save `username`'s wrapped UEK envelope
    pub fn store_wrapped_uek(&self, username: &str, envelope: &[u8]) -> Result<()> {
        self.store(&keys::wrapped_uek(username), envelope)
    }

    /// Load `username`'s wrapped UEK envelope
    pub fn load_wrapped_uek(&self, username: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .retrieve(&keys::wrapped_uek(username))?
            .map(|bytes| bytes.to_vec()))
    }

    /// Cache a participant's public key
    pub fn store_public_key(&self, user_id: &str, jwk: &Jwk) -> Result<()> {
        self.store(&keys::public_key(user_id), jwk.to_json()?.as_bytes())
    }

    /// Load a cached participant public key
    pub fn load_public_key(&self, user_id: &str) -> Result<Option<Jwk>> {
        match self.retrieve(&keys::public_key(user_id))? {
            Some(bytes) => {
                let text = std::str::from_utf8(&bytes).map_err(|_| {
                    Error::StorageReadError(format!("Public key for '{}' is not UTF-8", user_id))
                })?;
                Ok(Some(Jwk::from_json(text)?))
            }
            None => Ok(None),
        }
    }

    fn persist(&self, storage: &HashMap<String, Vec<u8>>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let encoded: BTreeMap<&str, String> = storage
            .iter()
            .map(|(k, v)| (k.as_str(), BASE64.encode(v)))
            .collect();
        let json = serde_json::to_vec_pretty(&encoded)?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)
            .and_then(|_| fs::rename(&tmp, path))
            .map_err(|e| Error::StorageWriteError(format!("{}: {}", path.display(), e)))?;

        tracing::debug!(entries = storage.len(), "Persisted key store");
        Ok(())
    }
}

impl Default for LocalKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_jwk() -> Jwk {
        Jwk::from_json(r#"{"kty":"EC","crv":"P-521","x":"AAAA","y":"BBBB"}"#).unwrap()
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = LocalKeyStore::new();
        store.store("a", b"value").unwrap();

        assert!(store.exists("a").unwrap());
        assert_eq!(store.retrieve("a").unwrap().unwrap().as_slice(), b"value");
        assert!(store.retrieve("missing").unwrap().is_none());
    }

    #[test]
    fn test_delete() {
        let store = LocalKeyStore::new();
        store.store("a", b"value").unwrap();

        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert!(!store.exists("a").unwrap());
    }

    #[test]
    fn test_typed_accessors() {
        let store = LocalKeyStore::new();
        store.store_wrapped_uek("alice", &[1, 2, 3]).unwrap();
        store.store_public_key("bob", &sample_jwk()).unwrap();

        assert_eq!(store.load_wrapped_uek("alice").unwrap(), Some(vec![1, 2, 3]));
        assert!(store.load_wrapped_uek("carol").unwrap().is_none());
        assert_eq!(store.load_public_key("bob").unwrap(), Some(sample_jwk()));
        assert!(store.exists(&keys::wrapped_uek("alice")).unwrap());
    }

    #[test]
    fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");

        {
            let store = LocalKeyStore::open(&path).unwrap();
            store.store_wrapped_uek("alice", &[9u8; 40]).unwrap();
            store.store_public_key("bob", &sample_jwk()).unwrap();
        }

        let reopened = LocalKeyStore::open(&path).unwrap();
        assert_eq!(reopened.path(), Some(path.as_path()));
        assert_eq!(reopened.load_wrapped_uek("alice").unwrap(), Some(vec![9u8; 40]));
        assert_eq!(reopened.load_public_key("bob").unwrap(), Some(sample_jwk()));
    }

    #[test]
    fn test_file_store_delete_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");

        let store = LocalKeyStore::open(&path).unwrap();
        store.store("gone", b"x").unwrap();
        store.delete("gone").unwrap();
        drop(store);

        let reopened = LocalKeyStore::open(&path).unwrap();
        assert!(!reopened.exists("gone").unwrap());
    }

    #[test]
    fn test_file_values_are_base64() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");

        let store = LocalKeyStore::open(&path).unwrap();
        store.store("k", &[0xFF, 0x00]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let map: BTreeMap<String, String> = serde_json::from_str(&text).unwrap();
        assert_eq!(map["k"], "/wA=");
    }

    #[test]
    fn test_corrupt_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        std::fs::write(&path, "not json").unwrap();

        let result = LocalKeyStore::open(&path);
        assert!(matches!(result, Err(Error::StorageReadError(_))));
        assert!(result.unwrap_err().is_recoverable());
    }

    #[test]
    fn test_flush_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");

        let store = LocalKeyStore::open(&path).unwrap();
        store.store("k", b"v").unwrap();
        std::fs::remove_file(&path).unwrap();

        store.flush().unwrap();
        assert!(path.exists());
    }
}
