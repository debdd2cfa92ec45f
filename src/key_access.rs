//! Key access objects and the strategies that write them
//!
//! A key access object (KAO) carries one wrapped key share for one KAS, bound to
//! the policy with an HMAC keyed by that share. Two wrap methods exist:
//!
//! - `ec-wrapped`: ECDH between a fresh P-256 key and the KAS key, HKDF-SHA256 with
//!   the TDF salt, then AES-256-GCM. `wrappedKey` is `base64(IV || ct || tag)` and
//!   the ephemeral public key travels in `ephemeralPublicKey`.
//! - `wrapped`: RSA-OAEP with SHA-1, as other OpenTDF clients do.

use crate::crypto::{self, CryptoError, IV_LEN};
use crate::kas_key::{KasKeyError, KasPublicKey, KeyAlgorithm};
use crate::policy::CanonicalPolicy;
use crate::split::KeyShare;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use p256::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rand::rngs::OsRng;
use rsa::{Oaep, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use thiserror::Error;

/// Key access `type` values
pub mod key_access_type {
    pub const WRAPPED: &str = "wrapped";
    pub const EC_WRAPPED: &str = "ec-wrapped";
}

/// Protocol of every key access object
pub const KAS_PROTOCOL: &str = "kas";
/// Policy binding algorithm
pub const POLICY_BINDING_ALG: &str = "HS256";
/// Schema version written into each key access object
pub const KAO_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum KeyAccessError {
    #[error("Metadata must be a JSON string or object, got {kind}")]
    UnsupportedMetadata { kind: &'static str },

    #[error("Invalid KAS public key for '{url}': {reason}")]
    InvalidPublicKey { url: String, reason: String },

    #[error("RSA encryption failed: {0}")]
    RsaEncryption(String),

    #[error("Failed to encode ephemeral public key: {0}")]
    EphemeralKey(String),

    #[error("KAS key error: {0}")]
    KasKey(#[from] KasKeyError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KeyAccessError {
    pub fn error_code(&self) -> &'static str {
        match self {
            KeyAccessError::UnsupportedMetadata { .. } => "OPENTDF_E_KAO_METADATA",
            KeyAccessError::InvalidPublicKey { .. } => "OPENTDF_E_KAO_PUBLIC_KEY",
            KeyAccessError::RsaEncryption(_) => "OPENTDF_E_KAO_RSA",
            KeyAccessError::EphemeralKey(_) => "OPENTDF_E_KAO_EPHEMERAL_KEY",
            KeyAccessError::KasKey(e) => e.error_code(),
            KeyAccessError::Crypto(_) => "OPENTDF_E_KAO_CRYPTO",
            KeyAccessError::Serialization(_) => "OPENTDF_E_KAO_SERIALIZATION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyBinding {
    pub alg: String,
    pub hash: String,
}

/// Manifest entry for one wrapped key share
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyAccessObject {
    #[serde(rename = "type")]
    pub access_type: String,
    pub url: String,
    pub protocol: String,
    #[serde(rename = "wrappedKey")]
    pub wrapped_key: String,
    #[serde(rename = "encryptedMetadata", skip_serializing_if = "Option::is_none")]
    pub encrypted_metadata: Option<String>,
    #[serde(rename = "policyBinding")]
    pub policy_binding: PolicyBinding,
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(rename = "ephemeralPublicKey", skip_serializing_if = "Option::is_none")]
    pub ephemeral_public_key: Option<String>,
}

impl KeyAccessObject {
    pub fn is_ec_wrapped(&self) -> bool {
        self.access_type == key_access_type::EC_WRAPPED
    }
}

/// Encrypted metadata container, base64'd into `encryptedMetadata`
#[derive(Debug, Serialize, Deserialize)]
pub struct EncryptedMetadata {
    pub ciphertext: String,
    pub iv: String,
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Reject metadata that is neither a string nor an object
pub fn validate_metadata(value: &serde_json::Value) -> Result<(), KeyAccessError> {
    match value {
        serde_json::Value::String(_) | serde_json::Value::Object(_) => Ok(()),
        other => Err(KeyAccessError::UnsupportedMetadata {
            kind: json_kind(other),
        }),
    }
}

/// Encrypt KAO metadata under a key share
///
/// Strings are encrypted as-is, objects as their JSON text.
pub fn encrypt_metadata(
    value: &serde_json::Value,
    share: &KeyShare,
    iv: &[u8; IV_LEN],
) -> Result<String, KeyAccessError> {
    validate_metadata(value)?;
    let plaintext = match value {
        serde_json::Value::String(s) => s.clone(),
        other => serde_json::to_string(other)?,
    };
    let ciphertext = crypto::seal_with_iv(share.as_slice(), iv, plaintext.as_bytes())?;
    let container = EncryptedMetadata {
        ciphertext: BASE64.encode(ciphertext),
        iv: BASE64.encode(iv),
    };
    Ok(BASE64.encode(serde_json::to_string(&container)?))
}

/// Wraps a share with ECDH against a P-256 KAS key
pub struct EcWrappedKeyAccess {
    url: String,
    kas_public_key: p256::PublicKey,
    ephemeral: p256::SecretKey,
    kid: Option<String>,
    sid: Option<String>,
    key_access_object: Option<KeyAccessObject>,
}

impl EcWrappedKeyAccess {
    pub fn new(
        url: impl Into<String>,
        kas_public_key_pem: &str,
        kid: Option<String>,
        sid: Option<String>,
    ) -> Result<Self, KeyAccessError> {
        let url = url.into();
        let kas_public_key = p256::PublicKey::from_public_key_pem(kas_public_key_pem)
            .map_err(|e| KeyAccessError::InvalidPublicKey {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            url,
            kas_public_key,
            ephemeral: p256::SecretKey::random(&mut OsRng),
            kid,
            sid,
            key_access_object: None,
        })
    }

    fn write(
        &mut self,
        policy: &CanonicalPolicy,
        share: &KeyShare,
        encrypted_metadata: Option<&str>,
    ) -> Result<&KeyAccessObject, KeyAccessError> {
        let shared_secret = p256::elliptic_curve::ecdh::diffie_hellman(
            self.ephemeral.to_nonzero_scalar(),
            self.kas_public_key.as_affine(),
        );
        let kek = crypto::derive_kek(shared_secret.raw_secret_bytes().as_slice())?;
        let wrapped = crypto::seal(kek.as_slice(), share.as_slice())?;

        let ephemeral_pem = self
            .ephemeral
            .public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| KeyAccessError::EphemeralKey(e.to_string()))?;

        let kao = KeyAccessObject {
            access_type: key_access_type::EC_WRAPPED.to_string(),
            url: self.url.clone(),
            protocol: KAS_PROTOCOL.to_string(),
            wrapped_key: BASE64.encode(wrapped),
            encrypted_metadata: encrypted_metadata.map(str::to_string),
            policy_binding: binding(policy, share)?,
            schema_version: KAO_SCHEMA_VERSION.to_string(),
            kid: self.kid.clone(),
            sid: self.sid.clone(),
            ephemeral_public_key: Some(ephemeral_pem),
        };
        Ok(self.key_access_object.insert(kao))
    }
}

/// Wraps a share with RSA-OAEP for an RSA KAS key
pub struct WrappedKeyAccess {
    url: String,
    kas_public_key: RsaPublicKey,
    kid: Option<String>,
    sid: Option<String>,
    key_access_object: Option<KeyAccessObject>,
}

impl WrappedKeyAccess {
    pub fn new(
        url: impl Into<String>,
        kas_public_key_pem: &str,
        kid: Option<String>,
        sid: Option<String>,
    ) -> Result<Self, KeyAccessError> {
        let url = url.into();
        let kas_public_key = RsaPublicKey::from_public_key_pem(kas_public_key_pem).map_err(|e| {
            KeyAccessError::InvalidPublicKey {
                url: url.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            url,
            kas_public_key,
            kid,
            sid,
            key_access_object: None,
        })
    }

    fn write(
        &mut self,
        policy: &CanonicalPolicy,
        share: &KeyShare,
        encrypted_metadata: Option<&str>,
    ) -> Result<&KeyAccessObject, KeyAccessError> {
        // SHA-1 OAEP, as KAS expects
        let wrapped = self
            .kas_public_key
            .encrypt(&mut OsRng, Oaep::new::<Sha1>(), share.as_slice())
            .map_err(|e| KeyAccessError::RsaEncryption(e.to_string()))?;

        let kao = KeyAccessObject {
            access_type: key_access_type::WRAPPED.to_string(),
            url: self.url.clone(),
            protocol: KAS_PROTOCOL.to_string(),
            wrapped_key: BASE64.encode(wrapped),
            encrypted_metadata: encrypted_metadata.map(str::to_string),
            policy_binding: binding(policy, share)?,
            schema_version: KAO_SCHEMA_VERSION.to_string(),
            kid: self.kid.clone(),
            sid: self.sid.clone(),
            ephemeral_public_key: None,
        };
        Ok(self.key_access_object.insert(kao))
    }
}

fn binding(policy: &CanonicalPolicy, share: &KeyShare) -> Result<PolicyBinding, KeyAccessError> {
    Ok(PolicyBinding {
        alg: POLICY_BINDING_ALG.to_string(),
        hash: crypto::calculate_policy_binding(policy.base64(), share.as_slice())?,
    })
}

/// How a share gets wrapped for its KAS
pub enum KeyAccessStrategy {
    EcWrapped(EcWrappedKeyAccess),
    Wrapped(WrappedKeyAccess),
}

impl KeyAccessStrategy {
    /// Pick the wrap method from the KAS key algorithm
    pub fn for_kas(
        url: impl Into<String>,
        key: &KasPublicKey,
        sid: Option<String>,
    ) -> Result<Self, KeyAccessError> {
        match key.algorithm {
            KeyAlgorithm::EcP256 => Ok(KeyAccessStrategy::EcWrapped(EcWrappedKeyAccess::new(
                url,
                &key.pem,
                key.kid.clone(),
                sid,
            )?)),
            KeyAlgorithm::Rsa2048 | KeyAlgorithm::Rsa4096 => Ok(KeyAccessStrategy::Wrapped(
                WrappedKeyAccess::new(url, &key.pem, key.kid.clone(), sid)?,
            )),
        }
    }

    /// Wrap `share` and bind it to `policy`
    ///
    /// The result is cached on the strategy; writing again replaces it.
    pub fn write(
        &mut self,
        policy: &CanonicalPolicy,
        share: &KeyShare,
        encrypted_metadata: Option<&str>,
    ) -> Result<&KeyAccessObject, KeyAccessError> {
        match self {
            KeyAccessStrategy::EcWrapped(s) => s.write(policy, share, encrypted_metadata),
            KeyAccessStrategy::Wrapped(s) => s.write(policy, share, encrypted_metadata),
        }
    }

    /// Last object produced by [`KeyAccessStrategy::write`]
    pub fn key_access_object(&self) -> Option<&KeyAccessObject> {
        match self {
            KeyAccessStrategy::EcWrapped(s) => s.key_access_object.as_ref(),
            KeyAccessStrategy::Wrapped(s) => s.key_access_object.as_ref(),
        }
    }

    pub fn into_key_access_object(self) -> Option<KeyAccessObject> {
        match self {
            KeyAccessStrategy::EcWrapped(s) => s.key_access_object,
            KeyAccessStrategy::Wrapped(s) => s.key_access_object,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            KeyAccessStrategy::EcWrapped(s) => &s.url,
            KeyAccessStrategy::Wrapped(s) => &s.url,
        }
    }

    pub fn access_type(&self) -> &'static str {
        match self {
            KeyAccessStrategy::EcWrapped(_) => key_access_type::EC_WRAPPED,
            KeyAccessStrategy::Wrapped(_) => key_access_type::WRAPPED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Policy;
    use serde_json::json;

    const RSA_2048_PEM: &str = r#"-----BEGIN PUBLIC KEY-----
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEA2dMTGDH4QhhB4aYg4d48
SrapeZD128mpRTRCvbQa5ZaDykVvs8jJ5USJSZErNZ/HVvPyX6gqvQv4HeprAT7i
En445s6sOqObeAYWc5FUatvk3R5KPtgqHOgQIPtXQXnahT7HwvZPCjYoawc2MGax
ejRg20the6MtJHh1K2hUGJ/ic7Hbvk2QMHqYvwjFva4q4Uz3cjiA4RXn4joxm8SE
gLUOPV7pWvv7JzZRRLYiXQAcTb4QvJMIwY997/r228sr+fgYjxK6O0QKPZI2iJ5H
PvJX+E+ceUD7JIZc87FvaA5OqwFUFXqJfYNU4ZE7d6ovRja8JwnErHa+7pEk6KkN
8wIDAQAB
-----END PUBLIC KEY-----"#;

    fn ec_key() -> KasPublicKey {
        let secret = p256::SecretKey::random(&mut OsRng);
        let pem = secret.public_key().to_public_key_pem(LineEnding::LF).unwrap();
        KasPublicKey::new(KeyAlgorithm::EcP256, pem).with_kid("e1")
    }

    fn policy() -> CanonicalPolicy {
        let policy = Policy::new(
            "3a1d1d0e-7c6f-4f3c-9c1a-6f0b6f2b8b11".to_string(),
            vec![],
            vec![],
        );
        CanonicalPolicy::from_policy(&policy).unwrap()
    }

    #[test]
    fn test_ec_wrapped_shape() {
        let share = KeyShare::from_bytes(&[5u8; 32]);
        let mut strategy =
            KeyAccessStrategy::for_kas("https://kas.example.com", &ec_key(), Some("s1".into()))
                .unwrap();
        let kao = strategy.write(&policy(), &share, None).unwrap().clone();

        assert!(kao.is_ec_wrapped());
        assert_eq!(kao.protocol, "kas");
        assert_eq!(kao.schema_version, "1.0");
        assert_eq!(kao.policy_binding.alg, "HS256");
        assert_eq!(kao.kid.as_deref(), Some("e1"));
        assert_eq!(kao.sid.as_deref(), Some("s1"));
        let pem = kao.ephemeral_public_key.as_deref().unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));
        assert_eq!(
            BASE64.decode(&kao.wrapped_key).unwrap().len(),
            crypto::IV_LEN + 32 + crypto::TAG_LEN
        );
    }

    #[test]
    fn test_wrapped_shape_omits_optional_fields() {
        let share = KeyShare::from_bytes(&[5u8; 32]);
        let key = KasPublicKey::new(KeyAlgorithm::Rsa2048, RSA_2048_PEM);
        let mut strategy =
            KeyAccessStrategy::for_kas("https://kas.example.com", &key, None).unwrap();
        assert_eq!(strategy.access_type(), "wrapped");
        let kao = strategy.write(&policy(), &share, None).unwrap();

        assert_eq!(BASE64.decode(&kao.wrapped_key).unwrap().len(), 256);
        let value = serde_json::to_value(kao).unwrap();
        let obj = value.as_object().unwrap();
        for absent in ["kid", "sid", "ephemeralPublicKey", "encryptedMetadata"] {
            assert!(!obj.contains_key(absent), "{} should be omitted", absent);
        }
        assert_eq!(obj["type"], "wrapped");
    }

    #[test]
    fn test_binding_matches_share() {
        let share = KeyShare::from_bytes(&[7u8; 32]);
        let policy = policy();
        let mut strategy =
            KeyAccessStrategy::for_kas("https://kas.example.com", &ec_key(), None).unwrap();
        let kao = strategy.write(&policy, &share, None).unwrap();
        assert!(crypto::verify_policy_binding(
            policy.base64(),
            share.as_slice(),
            &kao.policy_binding.hash
        )
        .is_ok());
    }

    #[test]
    fn test_write_replaces_cached_object() {
        let mut strategy =
            KeyAccessStrategy::for_kas("https://kas.example.com", &ec_key(), None).unwrap();
        assert!(strategy.key_access_object().is_none());

        let first = strategy
            .write(&policy(), &KeyShare::from_bytes(&[1u8; 32]), None)
            .unwrap()
            .clone();
        let second = strategy
            .write(&policy(), &KeyShare::from_bytes(&[2u8; 32]), Some("meta"))
            .unwrap()
            .clone();
        assert_ne!(first.wrapped_key, second.wrapped_key);
        assert_eq!(strategy.key_access_object(), Some(&second));
        assert_eq!(second.encrypted_metadata.as_deref(), Some("meta"));
    }

    #[test]
    fn test_invalid_public_key() {
        let bad = KasPublicKey::new(KeyAlgorithm::EcP256, RSA_2048_PEM);
        assert!(matches!(
            KeyAccessStrategy::for_kas("https://kas.example.com", &bad, None),
            Err(KeyAccessError::InvalidPublicKey { .. })
        ));
    }

    #[test]
    fn test_metadata_kinds() {
        let share = KeyShare::from_bytes(&[3u8; 32]);
        let iv = [0u8; IV_LEN];

        for ok in [json!("note"), json!({"owner": "alice"})] {
            let encoded = encrypt_metadata(&ok, &share, &iv).unwrap();
            let container: EncryptedMetadata =
                serde_json::from_slice(&BASE64.decode(encoded).unwrap()).unwrap();
            assert_eq!(BASE64.decode(container.iv).unwrap(), iv);
        }

        for bad in [json!(null), json!(1), json!(true), json!(["a"])] {
            assert!(matches!(
                encrypt_metadata(&bad, &share, &iv),
                Err(KeyAccessError::UnsupportedMetadata { .. })
            ));
        }
    }
}
