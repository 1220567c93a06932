//! # Key Formats
//!
//! Export/import encodings shared by symmetric and asymmetric keys.
//!
//! | Format | Symmetric | ECDH private | ECDH public |
//! |--------|-----------|--------------|-------------|
//! | `raw`   | key bytes | -            | SEC1 uncompressed point |
//! | `pkcs8` | -         | DER          | -           |
//! | `spki`  | -         | -            | DER         |
//! | `jwk`   | `kty: oct`| `kty: EC` + `d` | `kty: EC` |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::usage::KeyUsage;
use crate::error::{Error, Result};

/// Key encoding used by export and import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyFormat {
    /// JSON Web Key
    Jwk,
    /// Raw bytes (symmetric key material or SEC1 public point)
    Raw,
    /// PKCS#8 DER private key
    Pkcs8,
    /// SubjectPublicKeyInfo DER public key
    Spki,
}

impl KeyFormat {
    /// Lowercase identifier, e.g. `"pkcs8"`
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyFormat::Jwk => "jwk",
            KeyFormat::Raw => "raw",
            KeyFormat::Pkcs8 => "pkcs8",
            KeyFormat::Spki => "spki",
        }
    }
}

impl fmt::Display for KeyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "jwk" => Ok(KeyFormat::Jwk),
            "raw" => Ok(KeyFormat::Raw),
            "pkcs8" => Ok(KeyFormat::Pkcs8),
            "spki" => Ok(KeyFormat::Spki),
            other => Err(Error::UnsupportedKeyFormat(other.to_string())),
        }
    }
}

/// A JSON Web Key as produced by WebCrypto `exportKey("jwk", ..)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type: `"EC"` or `"oct"`
    pub kty: String,
    /// Curve name for EC keys, `"P-521"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// EC public x coordinate (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    /// EC public y coordinate (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    /// EC private scalar (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    /// Symmetric key bytes (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,
    /// Algorithm hint, e.g. `"A256GCM"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    /// Permitted operations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_ops: Option<Vec<KeyUsage>>,
    /// Extractable flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<bool>,
}

impl Jwk {
    /// Whether this JWK carries private material
    pub fn is_private(&self) -> bool {
        self.d.is_some()
    }

    /// The EC members only, in the shape the curve crate parses
    pub(crate) fn ec_core_json(&self) -> Result<String> {
        #[derive(Serialize)]
        struct EcCore<'a> {
            kty: &'a str,
            crv: &'a Option<String>,
            x: &'a Option<String>,
            y: &'a Option<String>,
            #[serde(skip_serializing_if = "Option::is_none")]
            d: &'a Option<String>,
        }

        if self.kty != "EC" {
            return Err(Error::InvalidKey(format!(
                "Expected EC JWK, got kty={}",
                self.kty
            )));
        }

        Ok(serde_json::to_string(&EcCore {
            kty: &self.kty,
            crv: &self.crv,
            x: &self.x,
            y: &self.y,
            d: &self.d,
        })?)
    }

    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::DeserializationError(e.to_string()))
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Keys that can be exported in one of the [`KeyFormat`] encodings
pub trait ExportKey {
    /// Export in `format`, failing for non-extractable keys or unsupported pairings
    fn export_as(&self, format: KeyFormat) -> Result<ExportedKey>;
}

/// The result of exporting a key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportedKey {
    /// `jwk` export
    Jwk(Jwk),
    /// `raw`, `pkcs8` or `spki` export
    Bytes(Vec<u8>),
}

impl ExportedKey {
    /// Borrow the bytes of a binary export
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ExportedKey::Bytes(b) => Some(b),
            ExportedKey::Jwk(_) => None,
        }
    }

    /// Borrow the JWK of a `jwk` export
    pub fn as_jwk(&self) -> Option<&Jwk> {
        match self {
            ExportedKey::Jwk(jwk) => Some(jwk),
            ExportedKey::Bytes(_) => None,
        }
    }

    /// Take the bytes of a binary export
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            ExportedKey::Bytes(b) => Ok(b),
            ExportedKey::Jwk(_) => Err(Error::UnsupportedKeyFormat(
                "expected a binary export, got jwk".into(),
            )),
        }
    }

    /// Take the JWK of a `jwk` export
    pub fn into_jwk(self) -> Result<Jwk> {
        match self {
            ExportedKey::Jwk(jwk) => Ok(jwk),
            ExportedKey::Bytes(_) => Err(Error::UnsupportedKeyFormat(
                "expected a jwk export, got bytes".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parse() {
        assert_eq!("pkcs8".parse::<KeyFormat>().unwrap(), KeyFormat::Pkcs8);
        assert!(matches!(
            "pem".parse::<KeyFormat>(),
            Err(Error::UnsupportedKeyFormat(_))
        ));
    }

    #[test]
    fn test_jwk_skips_absent_members() {
        let jwk = Jwk {
            kty: "oct".into(),
            crv: None,
            x: None,
            y: None,
            d: None,
            k: Some("AAAA".into()),
            alg: Some("A256GCM".into()),
            key_ops: Some(vec![KeyUsage::Encrypt]),
            ext: Some(true),
        };
        let json = jwk.to_json().unwrap();
        assert!(!json.contains("crv"));
        assert!(json.contains("\"key_ops\":[\"encrypt\"]"));
        assert_eq!(Jwk::from_json(&json).unwrap(), jwk);
    }

    #[test]
    fn test_ec_core_rejects_oct() {
        let jwk = Jwk::from_json(r#"{"kty":"oct","k":"AAAA"}"#).unwrap();
        assert!(matches!(jwk.ec_core_json(), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_exported_key_accessors() {
        let exported = ExportedKey::Bytes(vec![1, 2, 3]);
        assert_eq!(exported.as_bytes(), Some([1u8, 2, 3].as_slice()));
        assert!(exported.as_jwk().is_none());
        assert!(exported.into_jwk().is_err());
    }
}
