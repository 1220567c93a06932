//! # MarketChat Core
//!
//! The end-to-end encryption core of a marketplace chat: key agreement
//! between buyers and sellers, the chat message codec, and the wrapped
//! user key kept in local storage.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       MARKETCHAT CORE MODULES                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌──────────────┐   │
//! │  │  Identity   │  │  Envelope   │  │   Storage   │  │   Messaging  │   │
//! │  │             │  │             │  │             │  │              │   │
//! │  │ - Signup    │  │ - UEK wrap  │  │ - Wrapped   │  │ - Encrypt    │   │
//! │  │ - Login     │  │ - UEK       │  │   UEK       │  │ - Decrypt    │   │
//! │  │ - Lock      │  │   unwrap    │  │ - Public    │  │ - Chats      │   │
//! │  │ - Unlock    │  │             │  │   keys      │  │ - History    │   │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘  └──────┬───────┘   │
//! │         │                │                │                │           │
//! │         └────────────────┴───────┬────────┴────────────────┘           │
//! │                                  │                                      │
//! │  ┌───────────────────────────────▼─────────────────────────────────┐   │
//! │  │                           Crypto                                │   │
//! │  │                                                                 │   │
//! │  │  hash · kdf (PBKDF2) · agreement (ECDH P-521) · symmetric       │   │
//! │  │  (AES-GCM) · usage capabilities · key formats · provider        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`config`] - Core configuration
//! - [`crypto`] - Cryptographic primitives (hash, KDF, ECDH, AES-GCM)
//! - [`envelope`] - Wrapped user encryption key format
//! - [`messaging`] - Chat message codec and bulk decryption
//! - [`storage`] - Local key store
//! - [`identity`] - Identity key pair lifecycle
//!
//! ## Usage Example
//!
//! ```ignore
//! use marketchat_core::{CoreConfig, MarketChatCore};
//! use marketchat_core::messaging::ChatContent;
//!
//! let core = MarketChatCore::new(CoreConfig::default())?;
//! let alice = core.signup()?;
//! let bob = core.signup()?;
//!
//! let key = core.shared_key(&alice, &bob.public_key_jwk()?)?;
//! let message = core
//!     .codec()
//!     .encrypt_chat_message(&ChatContent::Text("Is this still for sale?".into()), &key)?;
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod identity;
pub mod messaging;
pub mod storage;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::CoreConfig;
pub use crypto::{KeyPair, SymmetricKey};
pub use error::{Error, Result};
pub use identity::Identity;

// ============================================================================
// CORE INSTANCE
// ============================================================================

use std::sync::Arc;

use crypto::{
    CryptoProvider, EcdhPublicKey, Jwk, Kdf, KeyAgreement, OsCryptoProvider, SymmetricCipher,
};
use messaging::{Chat, ChatCodec, DecryptedChat};
use storage::LocalKeyStore;

/// Every component of the core, built from one validated [`CoreConfig`]
///
/// ## Lifecycle
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │                      MARKETCHAT CORE LIFECYCLE                          │
/// ├─────────────────────────────────────────────────────────────────────────┤
/// │                                                                         │
/// │  1. Construct                                                           │
/// │     MarketChatCore::new(config) ──► validate config                    │
/// │                                 ──► open key store                     │
/// │                                 ──► wire provider into components      │
/// │            │                                                           │
/// │            ▼                                                           │
/// │  2. Establish identity                                                 │
/// │     signup()  or  login(username, password)  or  unlock(..)            │
/// │            │                                                           │
/// │            ▼                                                           │
/// │  3. Chat                                                               │
/// │     shared_key(..) ──► codec().encrypt_chat_message(..)                │
/// │     decrypt_chats(..) / codec().decrypt_message_page(..)               │
/// │            │                                                           │
/// │            ▼                                                           │
/// │  4. Leave                                                              │
/// │     lock(identity, username, password) ──► key store                   │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug)]
pub struct MarketChatCore {
    config: CoreConfig,
    provider: Arc<dyn CryptoProvider>,
    kdf: Kdf,
    codec: ChatCodec,
    key_store: LocalKeyStore,
}

impl MarketChatCore {
    /// Build the core using the OS random number generator
    pub fn new(config: CoreConfig) -> Result<Self> {
        Self::with_provider(config, OsCryptoProvider::shared())
    }

    /// Build the core with an explicit randomness provider
    pub fn with_provider(config: CoreConfig, provider: Arc<dyn CryptoProvider>) -> Result<Self> {
        config.validate()?;
        tracing::info!("Initializing MarketChat Core v{}", env!("CARGO_PKG_VERSION"));

        let key_store = match &config.key_store_path {
            Some(path) => LocalKeyStore::open(path)?,
            None => LocalKeyStore::new(),
        };

        Ok(Self {
            kdf: Kdf::new(config.kdf_params())?,
            codec: ChatCodec::new(provider.clone()),
            key_store,
            provider,
            config,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Randomness provider shared by every component
    pub fn provider(&self) -> &Arc<dyn CryptoProvider> {
        &self.provider
    }

    /// Password-based key derivation
    pub fn kdf(&self) -> &Kdf {
        &self.kdf
    }

    /// AES-GCM cipher
    pub fn cipher(&self) -> &SymmetricCipher {
        self.codec.cipher()
    }

    /// ECDH key agreement
    pub fn agreement(&self) -> &KeyAgreement {
        self.codec.agreement()
    }

    /// Chat message codec
    pub fn codec(&self) -> &ChatCodec {
        &self.codec
    }

    /// Local key store
    pub fn key_store(&self) -> &LocalKeyStore {
        &self.key_store
    }

    /// Create a new random identity
    pub fn signup(&self) -> Result<Identity> {
        Identity::generate(self.agreement())
    }

    /// Rebuild an identity from credentials
    pub fn login(&self, username: &str, password: &str) -> Result<Identity> {
        Identity::from_credentials(&self.kdf, username, password)
    }

    /// Save `identity` wrapped under `password`
    pub fn lock(&self, identity: &Identity, username: &str, password: &str) -> Result<()> {
        identity.lock(&self.kdf, self.cipher(), &self.key_store, username, password)
    }

    /// Restore an identity saved by [`lock`](Self::lock)
    pub fn unlock(&self, username: &str, password: &str) -> Result<Identity> {
        Identity::unlock(&self.kdf, self.cipher(), &self.key_store, username, password)
    }

    /// Derive the key `identity` shares with the owner of `their_public_key`
    pub fn shared_key(&self, identity: &Identity, their_public_key: &Jwk) -> Result<SymmetricKey> {
        let their_public = EcdhPublicKey::from_jwk(their_public_key)?;
        self.agreement().derive_key(&their_public, identity.private_key())
    }

    /// Decrypt chat previews with the configured concurrency bound
    pub async fn decrypt_chats(
        &self,
        chats: Vec<Chat>,
        self_id: &str,
        identity: &Identity,
    ) -> Result<Vec<DecryptedChat>> {
        self.codec
            .decrypt_chats(
                chats,
                self_id,
                identity.private_key(),
                self.config.max_concurrent_decryptions,
            )
            .await
    }
}

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of MarketChat Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// TESTS
// ============================================================================
