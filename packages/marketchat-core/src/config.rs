//! Core configuration.
//!
//! Loaded from JSON or environment variables, validated once, then handed
//! to [`MarketChatCore`](crate::MarketChatCore).

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::crypto::{KdfParams, DEFAULT_PBKDF2_ITERATIONS};
use crate::error::{Error, Result};

/// Default bound on chats decrypted in parallel
pub const DEFAULT_MAX_CONCURRENT_DECRYPTIONS: usize = 8;

/// Configuration for the chat core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// PBKDF2 iteration count; anything but 100,000 breaks interop
    pub pbkdf2_iterations: u32,
    /// Upper bound on chats decrypted concurrently
    pub max_concurrent_decryptions: usize,
    /// Backing file for the key store (None for in-memory)
    pub key_store_path: Option<PathBuf>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: DEFAULT_PBKDF2_ITERATIONS,
            max_concurrent_decryptions: DEFAULT_MAX_CONCURRENT_DECRYPTIONS,
            key_store_path: None,
        }
    }
}

impl CoreConfig {
    /// Parse and validate a JSON document; missing fields take defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfig(format!("Invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables, falling back to defaults
    ///
    /// - `MARKETCHAT_PBKDF2_ITERATIONS`
    /// - `MARKETCHAT_MAX_CONCURRENT_DECRYPTIONS`
    /// - `MARKETCHAT_KEY_STORE_PATH`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(value) = env::var("MARKETCHAT_PBKDF2_ITERATIONS") {
            config.pbkdf2_iterations = parse_env("MARKETCHAT_PBKDF2_ITERATIONS", &value)?;
        }
        if let Ok(value) = env::var("MARKETCHAT_MAX_CONCURRENT_DECRYPTIONS") {
            config.max_concurrent_decryptions =
                parse_env("MARKETCHAT_MAX_CONCURRENT_DECRYPTIONS", &value)?;
        }
        if let Ok(value) = env::var("MARKETCHAT_KEY_STORE_PATH") {
            config.key_store_path = Some(PathBuf::from(value));
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the core cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.pbkdf2_iterations == 0 {
            return Err(Error::InvalidConfig(
                "pbkdf2_iterations must be non-zero".into(),
            ));
        }
        if self.max_concurrent_decryptions == 0 {
            return Err(Error::InvalidConfig(
                "max_concurrent_decryptions must be non-zero".into(),
            ));
        }
        if self.pbkdf2_iterations != DEFAULT_PBKDF2_ITERATIONS {
            tracing::warn!(
                iterations = self.pbkdf2_iterations,
                "Non-default PBKDF2 iteration count; derived keys will not match other clients"
            );
        }
        Ok(())
    }

    /// KDF parameters for this configuration
    pub fn kdf_params(&self) -> KdfParams {
        KdfParams {
            iterations: self.pbkdf2_iterations,
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("{} has an invalid value: {:?}", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.pbkdf2_iterations, 100_000);
        assert_eq!(config.max_concurrent_decryptions, 8);
        assert!(config.key_store_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = CoreConfig::from_json_str(r#"{"pbkdf2_iterations": 1000}"#).unwrap();
        assert_eq!(config.pbkdf2_iterations, 1000);
        assert_eq!(config.max_concurrent_decryptions, 8);
    }

    #[test]
    fn test_from_json_with_path() {
        let config =
            CoreConfig::from_json_str(r#"{"key_store_path": "/tmp/keys.json"}"#).unwrap();
        assert_eq!(config.key_store_path, Some(PathBuf::from("/tmp/keys.json")));
    }

    #[test]
    fn test_zero_values_rejected() {
        let err = CoreConfig::from_json_str(r#"{"pbkdf2_iterations": 0}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(err.code(), 100);

        let err = CoreConfig::from_json_str(r#"{"max_concurrent_decryptions": 0}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = CoreConfig::from_json_str(r#"{"iterations": 5}"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_parse_env_value() {
        assert_eq!(parse_env::<u32>("X", " 42 ").unwrap(), 42);
        assert!(matches!(
            parse_env::<usize>("X", "many"),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_kdf_params() {
        let config = CoreConfig {
            pbkdf2_iterations: 1_000,
            ..CoreConfig::default()
        };
        assert_eq!(config.kdf_params().iterations, 1_000);
    }
}
