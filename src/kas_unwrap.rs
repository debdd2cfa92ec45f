//! KAS-side unwrap of key access objects
//!
//! Performs what a KAS does on rewrap, minus the network: recover the share with
//! the KAS private key, check the policy binding, and rebuild the DEK from one
//! share per split id.

use crate::crypto::{self, CryptoError};
use crate::key_access::{key_access_type, EncryptedMetadata, KeyAccessObject};
use crate::split::{self, KeyShare, SplitError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Oaep, RsaPrivateKey};
use sha1::Sha1;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum UnwrapError {
    #[error("Key access type '{got}' cannot be unwrapped with a {expected} key")]
    KeyTypeMismatch { expected: &'static str, got: String },

    #[error("ec-wrapped key access object has no ephemeralPublicKey")]
    MissingEphemeralKey,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Metadata is not valid UTF-8: {0}")]
    InvalidMetadata(String),

    #[error("RSA-OAEP decryption failed: {0}")]
    RsaDecryption(String),

    #[error("No key access object for split '{sid}' could be unwrapped")]
    MissingShare { sid: String },

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Split error: {0}")]
    Split(#[from] SplitError),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// KAS private key material
pub enum KasPrivateKey {
    Ec(p256::SecretKey),
    Rsa(RsaPrivateKey),
}

impl KasPrivateKey {
    pub fn ec_from_pem(pem: &str) -> Result<Self, UnwrapError> {
        p256::SecretKey::from_pkcs8_pem(pem)
            .map(KasPrivateKey::Ec)
            .map_err(|e| UnwrapError::InvalidKey(e.to_string()))
    }

    pub fn rsa_from_pem(pem: &str) -> Result<Self, UnwrapError> {
        RsaPrivateKey::from_pkcs8_pem(pem)
            .map(KasPrivateKey::Rsa)
            .map_err(|e| UnwrapError::InvalidKey(e.to_string()))
    }
}

/// Recover the key share carried by `kao`
pub fn unwrap_key_access(
    kao: &KeyAccessObject,
    key: &KasPrivateKey,
) -> Result<KeyShare, UnwrapError> {
    let wrapped = BASE64.decode(&kao.wrapped_key)?;
    match (kao.access_type.as_str(), key) {
        (key_access_type::EC_WRAPPED, KasPrivateKey::Ec(secret)) => {
            let pem = kao
                .ephemeral_public_key
                .as_deref()
                .ok_or(UnwrapError::MissingEphemeralKey)?;
            let ephemeral = p256::PublicKey::from_public_key_pem(pem)
                .map_err(|e| UnwrapError::InvalidKey(e.to_string()))?;
            let shared_secret = p256::elliptic_curve::ecdh::diffie_hellman(
                secret.to_nonzero_scalar(),
                ephemeral.as_affine(),
            );
            let kek = crypto::derive_kek(shared_secret.raw_secret_bytes().as_slice())?;
            let share = crypto::open(kek.as_slice(), &wrapped)?;
            Ok(KeyShare::from_bytes(&share))
        }
        (key_access_type::WRAPPED, KasPrivateKey::Rsa(secret)) => {
            let share = secret
                .decrypt(Oaep::new::<Sha1>(), &wrapped)
                .map_err(|e| UnwrapError::RsaDecryption(e.to_string()))?;
            Ok(KeyShare::from_bytes(&share))
        }
        (other, KasPrivateKey::Ec(_)) => Err(UnwrapError::KeyTypeMismatch {
            expected: "EC",
            got: other.to_string(),
        }),
        (other, KasPrivateKey::Rsa(_)) => Err(UnwrapError::KeyTypeMismatch {
            expected: "RSA",
            got: other.to_string(),
        }),
    }
}

/// Check the policy binding of `kao` against the share it carries
pub fn verify_policy_binding(
    kao: &KeyAccessObject,
    policy_base64: &str,
    share: &KeyShare,
) -> Result<(), UnwrapError> {
    crypto::verify_policy_binding(policy_base64, share.as_slice(), &kao.policy_binding.hash)?;
    Ok(())
}

/// Decrypt `encryptedMetadata` with the share of its key access object
pub fn decrypt_metadata(encoded: &str, share: &KeyShare) -> Result<String, UnwrapError> {
    let container: EncryptedMetadata = serde_json::from_slice(&BASE64.decode(encoded)?)?;
    let iv = BASE64.decode(container.iv)?;
    let ciphertext = BASE64.decode(container.ciphertext)?;

    let mut sealed = iv;
    sealed.extend_from_slice(&ciphertext);
    let plaintext = crypto::open(share.as_slice(), &sealed)?;
    String::from_utf8(plaintext).map_err(|e| UnwrapError::InvalidMetadata(e.to_string()))
}

/// Rebuild the DEK from the key access objects of one manifest
///
/// Objects are grouped by sid; within a group the first one `unwrap` succeeds on
/// supplies that share. Objects without a sid form one group.
pub fn reconstruct_dek<F>(
    key_access: &[KeyAccessObject],
    mut unwrap: F,
) -> Result<KeyShare, UnwrapError>
where
    F: FnMut(&KeyAccessObject) -> Result<KeyShare, UnwrapError>,
{
    let mut groups: BTreeMap<&str, Vec<&KeyAccessObject>> = BTreeMap::new();
    for kao in key_access {
        groups
            .entry(kao.sid.as_deref().unwrap_or_default())
            .or_default()
            .push(kao);
    }

    let mut shares = Vec::with_capacity(groups.len());
    for (sid, candidates) in groups {
        let mut recovered = None;
        for kao in candidates {
            match unwrap(kao) {
                Ok(share) => {
                    recovered = Some(share);
                    break;
                }
                Err(e) => warn!(sid, url = %kao.url, error = %e, "unwrap failed, trying next KAS"),
            }
        }
        let share = recovered.ok_or_else(|| UnwrapError::MissingShare {
            sid: sid.to_string(),
        })?;
        shares.push(share);
    }

    debug!(shares = shares.len(), "reconstructing key from shares");
    Ok(split::merge(&shares)?)
}
