//! KAS public key material and resolution
//!
//! Grants in the attribute graph name a Key Access Server and usually carry its
//! public key. When they do not, a [`KasKeyResolver`] supplied by the caller is
//! consulted; fetching keys over the network is the resolver's concern, never
//! this crate's.

use p256::pkcs8::DecodePublicKey as _;
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during KAS public key operations
#[derive(Debug, Error)]
pub enum KasKeyError {
    #[error("No public key known for KAS '{uri}'")]
    UnknownKas { uri: String },

    #[error("Unsupported KAS key algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid {algorithm} public key: {reason}")]
    InvalidPem { algorithm: String, reason: String },

    #[error("KAS key resolution failed for '{uri}': {reason}")]
    ResolutionFailed { uri: String, reason: String },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl KasKeyError {
    pub fn error_code(&self) -> &'static str {
        match self {
            KasKeyError::UnknownKas { .. } => "OPENTDF_E_KAS_KEY_UNKNOWN",
            KasKeyError::UnsupportedAlgorithm(_) => "OPENTDF_E_KAS_KEY_ALGORITHM",
            KasKeyError::InvalidPem { .. } => "OPENTDF_E_KAS_KEY_INVALID",
            KasKeyError::ResolutionFailed { .. } => "OPENTDF_E_KAS_KEY_RESOLUTION",
            KasKeyError::JsonError(_) => "OPENTDF_E_KAS_KEY_JSON",
        }
    }
}

/// Key algorithm tag as published by a KAS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    #[serde(rename = "rsa:2048")]
    Rsa2048,
    #[serde(rename = "rsa:4096")]
    Rsa4096,
    #[serde(rename = "ec:secp256r1")]
    EcP256,
}

impl KeyAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAlgorithm::Rsa2048 => "rsa:2048",
            KeyAlgorithm::Rsa4096 => "rsa:4096",
            KeyAlgorithm::EcP256 => "ec:secp256r1",
        }
    }

    /// EC keys are wrapped with ECDH, RSA keys with direct encryption
    pub fn is_ec(&self) -> bool {
        matches!(self, KeyAlgorithm::EcP256)
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyAlgorithm {
    type Err = KasKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rsa:2048" => Ok(KeyAlgorithm::Rsa2048),
            "rsa:4096" => Ok(KeyAlgorithm::Rsa4096),
            "ec:secp256r1" => Ok(KeyAlgorithm::EcP256),
            other => Err(KasKeyError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// A KAS public key: algorithm, optional key id and SPKI PEM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KasPublicKey {
    pub algorithm: KeyAlgorithm,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    pub pem: String,
}

impl KasPublicKey {
    pub fn new(algorithm: KeyAlgorithm, pem: impl Into<String>) -> Self {
        Self {
            algorithm,
            kid: None,
            pem: pem.into(),
        }
    }

    #[must_use]
    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    /// Parse the PEM and check it matches the declared algorithm
    pub fn validate(&self) -> Result<(), KasKeyError> {
        match self.algorithm {
            KeyAlgorithm::EcP256 => {
                p256::PublicKey::from_public_key_pem(&self.pem).map_err(|e| {
                    KasKeyError::InvalidPem {
                        algorithm: self.algorithm.to_string(),
                        reason: e.to_string(),
                    }
                })?;
            }
            KeyAlgorithm::Rsa2048 | KeyAlgorithm::Rsa4096 => {
                let key = validate_rsa_public_key_pem(&self.pem)?;
                let expected_bits = match self.algorithm {
                    KeyAlgorithm::Rsa4096 => 4096,
                    _ => 2048,
                };
                let bits = key.size() * 8;
                if bits != expected_bits {
                    return Err(KasKeyError::InvalidPem {
                        algorithm: self.algorithm.to_string(),
                        reason: format!("modulus is {} bits", bits),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A Key Access Server referenced by a grant
///
/// `public_key` is `None` when the grant only names the server; the key is then
/// looked up through a [`KasKeyResolver`] before wrapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAccessServer {
    pub uri: String,
    #[serde(rename = "publicKey", skip_serializing_if = "Option::is_none")]
    pub public_key: Option<KasPublicKey>,
}

impl KeyAccessServer {
    pub fn new(uri: impl Into<String>, public_key: KasPublicKey) -> Self {
        Self {
            uri: uri.into(),
            public_key: Some(public_key),
        }
    }

    /// A grant that names the server without key material
    pub fn unresolved(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            public_key: None,
        }
    }
}

/// Response structure of a KAS public key endpoint
#[derive(Debug, Serialize, Deserialize)]
pub struct KasPublicKeyResponse {
    #[serde(rename = "publicKey")]
    pub public_key: String,
    pub kid: String,
}

impl KasPublicKeyResponse {
    /// Parse a KAS public key response body
    pub fn from_json(json: &str) -> Result<Self, KasKeyError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Convert into validated key material for the given algorithm
    pub fn into_public_key(self, algorithm: KeyAlgorithm) -> Result<KasPublicKey, KasKeyError> {
        let key = KasPublicKey::new(algorithm, self.public_key).with_kid(self.kid);
        key.validate()?;
        Ok(key)
    }
}

/// Source of KAS public keys for grants that carry none
///
/// Implementations may hit the network and retry; any error they return aborts the
/// encryption operation.
pub trait KasKeyResolver: Send + Sync {
    fn resolve(&self, kas_uri: &str) -> Result<KasPublicKey, KasKeyError>;
}

/// In-memory resolver keyed by KAS URI
#[derive(Debug, Clone, Default)]
pub struct StaticKasKeyResolver {
    keys: HashMap<String, KasPublicKey>,
}

impl StaticKasKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the key for a KAS, validating it first
    pub fn insert(
        &mut self,
        kas_uri: impl Into<String>,
        key: KasPublicKey,
    ) -> Result<&mut Self, KasKeyError> {
        key.validate()?;
        self.keys.insert(kas_uri.into(), key);
        Ok(self)
    }
}

impl KasKeyResolver for StaticKasKeyResolver {
    fn resolve(&self, kas_uri: &str) -> Result<KasPublicKey, KasKeyError> {
        self.keys
            .get(kas_uri)
            .cloned()
            .ok_or_else(|| KasKeyError::UnknownKas {
                uri: kas_uri.to_string(),
            })
    }
}

/// Parse and validate a PEM-encoded RSA public key
pub fn validate_rsa_public_key_pem(pem: &str) -> Result<rsa::RsaPublicKey, KasKeyError> {
    rsa::RsaPublicKey::from_public_key_pem(pem).map_err(|e| KasKeyError::InvalidPem {
        algorithm: "rsa".to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::pkcs8::{EncodePublicKey, LineEnding};

    const RSA_2048_PEM: &str = r#"-----BEGIN PUBLIC KEY-----
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEA2dMTGDH4QhhB4aYg4d48
SrapeZD128mpRTRCvbQa5ZaDykVvs8jJ5USJSZErNZ/HVvPyX6gqvQv4HeprAT7i
En445s6sOqObeAYWc5FUatvk3R5KPtgqHOgQIPtXQXnahT7HwvZPCjYoawc2MGax
ejRg20the6MtJHh1K2hUGJ/ic7Hbvk2QMHqYvwjFva4q4Uz3cjiA4RXn4joxm8SE
gLUOPV7pWvv7JzZRRLYiXQAcTb4QvJMIwY997/r228sr+fgYjxK6O0QKPZI2iJ5H
PvJX+E+ceUD7JIZc87FvaA5OqwFUFXqJfYNU4ZE7d6ovRja8JwnErHa+7pEk6KkN
8wIDAQAB
-----END PUBLIC KEY-----"#;

    fn ec_pem() -> String {
        let secret = p256::SecretKey::random(&mut rand::rngs::OsRng);
        secret.public_key().to_public_key_pem(LineEnding::LF).unwrap()
    }

    #[test]
    fn test_algorithm_tags() {
        assert_eq!("rsa:2048".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::Rsa2048);
        assert_eq!("ec:secp256r1".parse::<KeyAlgorithm>().unwrap(), KeyAlgorithm::EcP256);
        assert!(matches!(
            "ec:secp384r1".parse::<KeyAlgorithm>(),
            Err(KasKeyError::UnsupportedAlgorithm(_))
        ));
        let json = serde_json::to_string(&KeyAlgorithm::EcP256).unwrap();
        assert_eq!(json, r#""ec:secp256r1""#);
    }

    #[test]
    fn test_validate_rsa_public_key_pem() {
        assert!(KasPublicKey::new(KeyAlgorithm::Rsa2048, RSA_2048_PEM)
            .validate()
            .is_ok());
        assert!(validate_rsa_public_key_pem("not a valid pem").is_err());
    }

    #[test]
    fn test_algorithm_mismatch_rejected() {
        let as_ec = KasPublicKey::new(KeyAlgorithm::EcP256, RSA_2048_PEM);
        assert!(matches!(as_ec.validate(), Err(KasKeyError::InvalidPem { .. })));

        let as_rsa4096 = KasPublicKey::new(KeyAlgorithm::Rsa4096, RSA_2048_PEM);
        assert!(as_rsa4096.validate().is_err());

        let ec_as_rsa = KasPublicKey::new(KeyAlgorithm::Rsa2048, ec_pem());
        assert!(ec_as_rsa.validate().is_err());
    }

    #[test]
    fn test_kas_public_key_response() {
        let json = serde_json::json!({ "publicKey": ec_pem(), "kid": "e1" }).to_string();
        let key = KasPublicKeyResponse::from_json(&json)
            .unwrap()
            .into_public_key(KeyAlgorithm::EcP256)
            .unwrap();
        assert_eq!(key.kid.as_deref(), Some("e1"));

        let err = KasPublicKeyResponse::from_json(r#"{"kid": 7}"#).unwrap_err();
        assert!(matches!(err, KasKeyError::JsonError(_)));
        assert_eq!(err.error_code(), "OPENTDF_E_KAS_KEY_JSON");
    }

    #[test]
    fn test_static_resolver() {
        let mut resolver = StaticKasKeyResolver::new();
        resolver
            .insert(
                "https://kas.example.com",
                KasPublicKey::new(KeyAlgorithm::EcP256, ec_pem()),
            )
            .unwrap();

        assert!(resolver.resolve("https://kas.example.com").is_ok());
        assert!(matches!(
            resolver.resolve("https://other.example.com"),
            Err(KasKeyError::UnknownKas { .. })
        ));
    }
}
