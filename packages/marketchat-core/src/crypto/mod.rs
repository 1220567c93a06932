//! # Cryptography Module
//!
//! All cryptographic primitives used by the chat core.
//!
//! ## Security Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    KEY HIERARCHY                                │   │
//! │  ├─────────────────────────────────────────────────────────────────┤   │
//! │  │                                                                 │   │
//! │  │  (username, password)          or       fresh randomness       │   │
//! │  │          │                                     │                │   │
//! │  │          ▼                                     ▼                │   │
//! │  │  PBKDF2-SHA512 (100k) ──► HKDF ──► P-521 identity key pair    │   │
//! │  │          │                                     │                │   │
//! │  │          ▼                                     ▼                │   │
//! │  │  AES-256 wrap key ──► UEK envelope     ECDH with counterparty  │   │
//! │  │  (protects private key at rest)              │                 │   │
//! │  │                                              ▼                 │   │
//! │  │                                   AES-256 shared chat key      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 ENCRYPTION SCHEME                               │   │
//! │  ├─────────────────────────────────────────────────────────────────┤   │
//! │  │                                                                 │   │
//! │  │  Message Encryption (AES-256-GCM)                              │   │
//! │  │  • 256-bit key from ECDH                                       │   │
//! │  │  • 128-bit IV (random per message)                             │   │
//! │  │  • 128-bit authentication tag                                  │   │
//! │  │                                                                 │   │
//! │  │  Key Wrapping (AES-256-GCM)                                    │   │
//! │  │  • 256-bit key from PBKDF2                                     │   │
//! │  │  • 96-bit IV (random per wrap)                                 │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose |
//! |-----------|---------|
//! | ECDH P-521 | Key agreement |
//! | AES-GCM-256 | Messages and key wrapping |
//! | PBKDF2-HMAC-SHA512 | Password stretching |
//! | HKDF-SHA512 | Scalar expansion for derived key pairs |
//!
//! ## Security Considerations
//!
//! 1. **Key Zeroization**: symmetric key material and P-521 scalars are zeroized on drop
//! 2. **Capabilities**: every key checks its own usage set before use
//! 3. **Secure Random**: all IVs and nonces come from the injected [`CryptoProvider`]
//! 4. **No Key Reuse**: a fresh IV for every message encryption

mod agreement;
mod format;
mod hash;
mod kdf;
mod provider;
mod symmetric;
mod usage;

pub use agreement::{
    AsymmetricKey, EcdhPrivateKey, EcdhPublicKey, KeyAgreement, KeyPair, CURVE_NAME, SCALAR_SIZE,
    SHARED_KEY_SIZE,
};
pub use format::{ExportKey, ExportedKey, Jwk, KeyFormat};
pub use hash::{hash, hash_named, HashAlgorithm};
pub use kdf::{domain, Kdf, KdfParams, DEFAULT_PBKDF2_ITERATIONS};
pub use provider::{CryptoProvider, OsCryptoProvider, SequenceCryptoProvider};
pub use symmetric::{
    AesKeyLength, EncryptedPayload, SymmetricCipher, SymmetricKey, MESSAGE_IV_SIZE, TAG_SIZE,
    UEK_IV_SIZE,
};
pub use usage::{KeyUsage, KeyUsages};
