//! # Identity Module
//!
//! A user's long-term P-521 key pair and its lifecycle across devices.
//!
//! ## Identity Lifecycle
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      IDENTITY LIFECYCLE                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Signup                                                                │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  Identity::generate          → random P-521 key pair         │       │
//! │  │  public_key_jwk()            → published to identity service │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  New device login                                                      │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  Identity::from_credentials  → PBKDF2(password, username)    │       │
//! │  │                                → same key pair everywhere    │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! │  Between sessions                                                      │
//! │  ┌─────────────────────────────────────────────────────────────┐       │
//! │  │  lock    → wrap key = PBKDF2(password, username)             │       │
//! │  │          → UEK envelope → LocalKeyStore                      │       │
//! │  │  unlock  → LocalKeyStore → UEK envelope → private key        │       │
//! │  └─────────────────────────────────────────────────────────────┘       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Note
//!
//! A key pair from [`Identity::from_credentials`] is only as strong as the
//! password. Anyone holding `(username, password)` can rebuild it and read
//! every past conversation. Account recovery relies on exactly this.

use crate::crypto::{
    EcdhPrivateKey, EcdhPublicKey, Jwk, Kdf, KeyAgreement, KeyPair, KeyUsages, SymmetricCipher,
    SymmetricKey,
};
use crate::envelope::{decrypt_user_encryption_key, encrypt_user_encryption_key};
use crate::error::{Error, Result};
use crate::storage::LocalKeyStore;

/// A user's identity key pair
#[derive(Debug, Clone)]
pub struct Identity {
    key_pair: KeyPair,
}

impl Identity {
    /// Create a fresh random identity (signup)
    pub fn generate(agreement: &KeyAgreement) -> Result<Self> {
        let key_pair = agreement.generate_random_key_pair()?;
        tracing::info!("Generated new identity");
        Ok(Self { key_pair })
    }

    /// Rebuild the identity from credentials (login on a new device)
    ///
    /// Uses `secret = password` and `salt = username`.
    pub fn from_credentials(kdf: &Kdf, username: &str, password: &str) -> Result<Self> {
        let key_pair = kdf.generate_deterministic_key_pair(password, username)?;
        tracing::info!(username, "Derived identity from credentials");
        Ok(Self { key_pair })
    }

    /// Wrap an existing private key
    pub fn from_private_key(private_key: EcdhPrivateKey) -> Self {
        let public_key = private_key.public_key();
        Self {
            key_pair: KeyPair {
                private_key,
                public_key,
            },
        }
    }

    /// The key pair
    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// The private key, usages `{deriveKey}`
    pub fn private_key(&self) -> &EcdhPrivateKey {
        &self.key_pair.private_key
    }

    /// The public key
    pub fn public_key(&self) -> &EcdhPublicKey {
        &self.key_pair.public_key
    }

    /// The public key as published to the identity service
    pub fn public_key_jwk(&self) -> Result<Jwk> {
        self.key_pair.public_key.to_jwk()
    }

    /// Wrap the private key under a password-derived key and save it
    pub fn lock(
        &self,
        kdf: &Kdf,
        cipher: &SymmetricCipher,
        store: &LocalKeyStore,
        username: &str,
        password: &str,
    ) -> Result<()> {
        let wrap_key = wrap_key(kdf, username, password)?;
        let envelope = encrypt_user_encryption_key(cipher, self.private_key(), &wrap_key)?;
        store.store_wrapped_uek(username, &envelope)?;
        tracing::info!(username, "Locked identity");
        Ok(())
    }

    /// Load and unwrap the private key saved by [`lock`](Self::lock)
    ///
    /// ## Errors
    ///
    /// - `StorageNotFound` if nothing was saved for `username`
    /// - `AuthenticationFailure` if the password is wrong
    /// - `Format` if the stored envelope is malformed
    pub fn unlock(
        kdf: &Kdf,
        cipher: &SymmetricCipher,
        store: &LocalKeyStore,
        username: &str,
        password: &str,
    ) -> Result<Self> {
        let envelope = store
            .load_wrapped_uek(username)?
            .ok_or_else(|| Error::StorageNotFound(format!("No wrapped key for '{}'", username)))?;

        let wrap_key = wrap_key(kdf, username, password)?;
        let private_key = decrypt_user_encryption_key(cipher, &envelope, &wrap_key)
            .map_err(|e| {
                tracing::warn!(username, error = %e, "Failed to unlock identity");
                e
            })?;

        tracing::info!(username, "Unlocked identity");
        Ok(Self::from_private_key(private_key))
    }
}

fn wrap_key(kdf: &Kdf, username: &str, password: &str) -> Result<SymmetricKey> {
    kdf.generate_deterministic_symmetric_key(password, username, KeyUsages::encrypt_decrypt())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{KdfParams, KeyFormat, OsCryptoProvider};

    fn fast_kdf() -> Kdf {
        Kdf::new(KdfParams { iterations: 1_000 }).unwrap()
    }

    fn cipher() -> SymmetricCipher {
        SymmetricCipher::new(OsCryptoProvider::shared())
    }

    fn pkcs8(identity: &Identity) -> Vec<u8> {
        identity
            .private_key()
            .export(KeyFormat::Pkcs8)
            .unwrap()
            .into_bytes()
            .unwrap()
    }

    #[test]
    fn test_generate_identities_differ() {
        let agreement = KeyAgreement::new(OsCryptoProvider::shared());
        let a = Identity::generate(&agreement).unwrap();
        let b = Identity::generate(&agreement).unwrap();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_from_credentials_is_stable() {
        let kdf = fast_kdf();
        let a = Identity::from_credentials(&kdf, "alice", "hunter2").unwrap();
        let b = Identity::from_credentials(&kdf, "alice", "hunter2").unwrap();
        assert_eq!(a.public_key_jwk().unwrap(), b.public_key_jwk().unwrap());
    }

    #[test]
    fn test_lock_unlock_round_trip() {
        let kdf = fast_kdf();
        let cipher = cipher();
        let store = LocalKeyStore::new();
        let agreement = KeyAgreement::new(OsCryptoProvider::shared());

        let identity = Identity::generate(&agreement).unwrap();
        identity.lock(&kdf, &cipher, &store, "alice", "hunter2").unwrap();

        let unlocked = Identity::unlock(&kdf, &cipher, &store, "alice", "hunter2").unwrap();
        assert_eq!(pkcs8(&unlocked), pkcs8(&identity));
        assert_eq!(unlocked.public_key(), identity.public_key());
    }

    #[test]
    fn test_unlock_wrong_password() {
        let kdf = fast_kdf();
        let cipher = cipher();
        let store = LocalKeyStore::new();
        let identity = Identity::from_credentials(&kdf, "alice", "hunter2").unwrap();
        identity.lock(&kdf, &cipher, &store, "alice", "hunter2").unwrap();

        let result = Identity::unlock(&kdf, &cipher, &store, "alice", "wrong");
        let err = result.unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailure));
        assert!(err.requires_reauthentication());
    }

    #[test]
    fn test_unlock_missing_entry() {
        let result = Identity::unlock(&fast_kdf(), &cipher(), &LocalKeyStore::new(), "nobody", "pw");
        assert!(matches!(result, Err(Error::StorageNotFound(_))));
    }

    #[test]
    fn test_unlock_corrupt_entry() {
        let store = LocalKeyStore::new();
        store.store_wrapped_uek("alice", &[1, 0, 0]).unwrap();
        let result = Identity::unlock(&fast_kdf(), &cipher(), &store, "alice", "pw");
        assert!(matches!(result, Err(Error::Format(reason)) if reason == "too short"));
    }
}
