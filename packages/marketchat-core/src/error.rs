//! # Error Handling
//!
//! This module provides the error types for MarketChat Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Configuration Errors                                              │
//! │  │   └── InvalidConfig         - Rejected configuration value          │
//! │  │                                                                      │
//! │  ├── Identity Errors                                                   │
//! │  │   └── KeyDerivationFailed   - PBKDF2/HKDF could not produce a key   │
//! │  │                                                                      │
//! │  ├── Crypto Errors                                                     │
//! │  │   ├── Format                - Malformed UEK envelope                │
//! │  │   ├── AuthenticationFailure - AES-GCM tag mismatch                  │
//! │  │   ├── CapabilityViolation   - Key usage set forbids the operation   │
//! │  │   ├── NotExtractable        - Key material cannot be exported       │
//! │  │   ├── InvalidKey            - Invalid key encoding/length           │
//! │  │   ├── InvalidIv             - Unsupported IV length                 │
//! │  │   ├── UnsupportedAlgorithm  - Unknown digest identifier             │
//! │  │   └── UnsupportedKeyFormat  - Format not valid for this key kind    │
//! │  │                                                                      │
//! │  ├── Storage Errors                                                    │
//! │  │   ├── StorageNotFound       - No entry under the requested name     │
//! │  │   ├── StorageReadError      - Failed to read the key store          │
//! │  │   └── StorageWriteError     - Failed to write the key store         │
//! │  │                                                                      │
//! │  └── Message Errors                                                    │
//! │      ├── ParticipantNotFound   - Chat has no counterparty              │
//! │      └── InvalidMessageContent - Decrypted envelope is malformed       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure Semantics
//!
//! A `Format` or `AuthenticationFailure` while unwrapping the user encryption
//! key cannot be fixed locally; the caller should force the user to log in
//! again (see [`Error::requires_reauthentication`]). Any crypto failure on the
//! chat path means the message must not be displayed or sent.

use thiserror::Error;

use crate::crypto::KeyUsage;

/// Result type alias for MarketChat Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for MarketChat Core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors (100-199)
    // ========================================================================

    /// A configuration value was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ========================================================================
    // Identity Errors (200-299)
    // ========================================================================

    /// Key derivation failed
    #[error("Failed to derive keys: {0}")]
    KeyDerivationFailed(String),

    // ========================================================================
    // Crypto Errors (300-399)
    // ========================================================================

    /// Malformed user encryption key envelope
    #[error("Invalid envelope: {0}")]
    Format(String),

    /// AES-GCM tag verification failed (wrong key, wrong IV or tampering)
    #[error("Decryption failed: authentication tag mismatch")]
    AuthenticationFailure,

    /// The key's usage set does not include the attempted operation
    #[error("Key usage violation: key does not permit '{required}'")]
    CapabilityViolation {
        /// The usage the operation needed
        required: KeyUsage,
    },

    /// The key was created non-extractable
    #[error("Key is not extractable")]
    NotExtractable,

    /// Encryption failed
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Invalid key format or length
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// IV length not supported by the cipher
    #[error("Invalid IV: {0}")]
    InvalidIv(String),

    /// Unknown or unsupported algorithm identifier
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Export/import format not valid for this kind of key
    #[error("Unsupported key format: {0}")]
    UnsupportedKeyFormat(String),

    /// Random number generation failed
    #[error("Random number generation failed")]
    RngFailed,

    // ========================================================================
    // Storage Errors (400-499)
    // ========================================================================

    /// Item not found in storage
    #[error("Item not found: {0}")]
    StorageNotFound(String),

    /// Failed to read from storage
    #[error("Failed to read from storage: {0}")]
    StorageReadError(String),

    /// Failed to write to storage
    #[error("Failed to write to storage: {0}")]
    StorageWriteError(String),

    // ========================================================================
    // Message Errors (700-799)
    // ========================================================================

    /// The chat has no participant other than ourselves
    #[error("No counterparty found in chat {0}")]
    ParticipantNotFound(String),

    /// Invalid message content
    #[error("Invalid message content: {0}")]
    InvalidMessageContent(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Configuration
    /// - 200-299: Identity
    /// - 300-399: Crypto
    /// - 400-499: Storage
    /// - 700-799: Messages
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Configuration (100-199)
            Error::InvalidConfig(_) => 100,

            // Identity (200-299)
            Error::KeyDerivationFailed(_) => 203,

            // Crypto (300-399)
            Error::Format(_) => 300,
            Error::AuthenticationFailure => 301,
            Error::CapabilityViolation { .. } => 302,
            Error::NotExtractable => 303,
            Error::InvalidKey(_) => 304,
            Error::EncryptionFailed(_) => 305,
            Error::RngFailed => 306,
            Error::InvalidIv(_) => 307,
            Error::UnsupportedAlgorithm(_) => 308,
            Error::UnsupportedKeyFormat(_) => 309,

            // Storage (400-499)
            Error::StorageNotFound(_) => 400,
            Error::StorageReadError(_) => 401,
            Error::StorageWriteError(_) => 402,

            // Messages (700-799)
            Error::ParticipantNotFound(_) => 700,
            Error::InvalidMessageContent(_) => 701,

            // Internal (900-999)
            Error::Internal(_) => 900,
            Error::SerializationError(_) => 902,
            Error::DeserializationError(_) => 903,
        }
    }

    /// Check if this error forces the user to authenticate again
    ///
    /// A wrapped key that is malformed or fails to authenticate can only be
    /// replaced by logging in and re-wrapping from scratch.
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, Error::Format(_) | Error::AuthenticationFailure)
    }

    /// Check if this error is recoverable
    ///
    /// Only storage I/O is worth retrying; every cryptographic failure is
    /// final for the input that produced it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::StorageReadError(_) | Error::StorageWriteError(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StorageReadError(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
