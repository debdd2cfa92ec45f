use crate::crypto::KeyInfo;
use crate::key_access::KeyAccessObject;
use crate::policy::{CanonicalPolicy, Policy, PolicyError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Payload cipher names accepted by [`assemble`]
pub mod cipher {
    pub const AES_256_GCM: &str = "AES-256-GCM";
}

pub const ENCRYPTION_TYPE_SPLIT: &str = "split";
pub const ROOT_SIGNATURE_ALG: &str = "HS256";
pub const SEGMENT_HASH_ALG: &str = "GMAC";
pub const SEGMENT_SIZE_DEFAULT: u64 = 1_000_000;
pub const ENCRYPTED_SEGMENT_SIZE_DEFAULT: u64 = 1_000_028;
pub const MANIFEST_SCHEMA_VERSION: &str = "4.3.0";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("No payload cipher configured")]
    MissingCipher,

    #[error("Unsupported payload cipher: {name}")]
    UnsupportedCipher { name: String },

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ManifestError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ManifestError::MissingCipher => "OPENTDF_E_MANIFEST_CIPHER_MISSING",
            ManifestError::UnsupportedCipher { .. } => "OPENTDF_E_MANIFEST_CIPHER_UNSUPPORTED",
            ManifestError::Policy(e) => e.error_code(),
            ManifestError::Base64(_) => "OPENTDF_E_MANIFEST_BASE64",
            ManifestError::Serialization(_) => "OPENTDF_E_MANIFEST_SERIALIZATION",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TdfManifest {
    pub payload: Payload,
    #[serde(rename = "encryptionInformation")]
    pub encryption_information: EncryptionInformation,
    #[serde(rename = "schemaVersion", skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(rename = "type")]
    pub payload_type: String,
    pub url: String,
    pub protocol: String,
    #[serde(rename = "isEncrypted")]
    pub is_encrypted: bool,
    #[serde(rename = "mimeType", skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionInformation {
    #[serde(rename = "type")]
    pub encryption_type: String,
    #[serde(rename = "keyAccess")]
    pub key_access: Vec<KeyAccessObject>,
    pub method: EncryptionMethod,
    #[serde(rename = "integrityInformation")]
    pub integrity_information: IntegrityInformation,
    pub policy: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionMethod {
    pub algorithm: String,
    #[serde(rename = "isStreamable")]
    pub is_streamable: bool,
    pub iv: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrityInformation {
    #[serde(rename = "rootSignature")]
    pub root_signature: RootSignature,
    #[serde(rename = "segmentHashAlg")]
    pub segment_hash_alg: String,
    pub segments: Vec<Segment>,
    #[serde(rename = "segmentSizeDefault")]
    pub segment_size_default: u64,
    #[serde(rename = "encryptedSegmentSizeDefault")]
    pub encrypted_segment_size_default: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootSignature {
    pub alg: String,
    pub sig: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub hash: String,
    #[serde(rename = "segmentSize", skip_serializing_if = "Option::is_none")]
    pub segment_size: Option<u64>,
    #[serde(
        rename = "encryptedSegmentSize",
        skip_serializing_if = "Option::is_none"
    )]
    pub encrypted_segment_size: Option<u64>,
}

impl IntegrityInformation {
    /// Integrity section before any segment has been written
    pub fn empty() -> Self {
        Self {
            root_signature: RootSignature {
                alg: ROOT_SIGNATURE_ALG.to_string(),
                sig: String::new(),
            },
            segment_hash_alg: SEGMENT_HASH_ALG.to_string(),
            segments: Vec::new(),
            segment_size_default: SEGMENT_SIZE_DEFAULT,
            encrypted_segment_size_default: ENCRYPTED_SEGMENT_SIZE_DEFAULT,
        }
    }
}

/// Reject an empty or unknown payload cipher name
pub fn check_cipher(name: &str) -> Result<(), ManifestError> {
    match name {
        "" => Err(ManifestError::MissingCipher),
        cipher::AES_256_GCM => Ok(()),
        other => Err(ManifestError::UnsupportedCipher {
            name: other.to_string(),
        }),
    }
}

/// Collect the key access objects and cipher parameters into the encryption
/// section of the manifest
///
/// `policy` must be the same value the bindings of `key_access` were computed
/// over; its base64 form is embedded as-is.
pub fn assemble(
    cipher_name: &str,
    key_info: &KeyInfo,
    policy: &CanonicalPolicy,
    key_access: Vec<KeyAccessObject>,
) -> Result<EncryptionInformation, ManifestError> {
    check_cipher(cipher_name)?;

    info!(
        cipher = cipher_name,
        key_access = key_access.len(),
        "assembled encryption information"
    );

    Ok(EncryptionInformation {
        encryption_type: ENCRYPTION_TYPE_SPLIT.to_string(),
        key_access,
        method: EncryptionMethod {
            algorithm: cipher_name.to_string(),
            is_streamable: true,
            iv: BASE64.encode(key_info.iv()),
        },
        integrity_information: IntegrityInformation::empty(),
        policy: policy.base64().to_string(),
    })
}

impl EncryptionInformation {
    /// Decode the embedded policy
    pub fn policy(&self) -> Result<Policy, ManifestError> {
        let bytes = BASE64.decode(&self.policy)?;
        let json = String::from_utf8_lossy(&bytes);
        Ok(Policy::from_json(&json)?)
    }
}

impl TdfManifest {
    /// Wrap an encryption section with a reference payload
    pub fn new(payload_url: impl Into<String>, encryption_information: EncryptionInformation) -> Self {
        TdfManifest {
            payload: Payload {
                payload_type: "reference".to_string(),
                url: payload_url.into(),
                protocol: "zip".to_string(),
                is_encrypted: true,
                mime_type: None,
            },
            encryption_information,
            schema_version: Some(MANIFEST_SCHEMA_VERSION.to_string()),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ManifestError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
