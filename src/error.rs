//! Unified error type for the public API
//!
//! Internal modules maintain their domain-specific errors for precise handling.
//! This unified type wraps them and sorts every failure into one of five
//! [`ErrorCategory`] values.
//!
//! # Example
//!
//! ```
//! use opentdf_split::{ErrorCategory, OpenTdfError};
//! use opentdf_split::split::SplitError;
//!
//! let err = OpenTdfError::from(SplitError::EmptyKey);
//! assert_eq!(err.category(), ErrorCategory::Configuration);
//! assert_eq!(err.error_code(), "OPENTDF_E_SPLIT_EMPTY_KEY");
//! ```

use crate::attribute::AttributeError;
use crate::config::ConfigError;
use crate::crypto::CryptoError;
use crate::fqn::FqnError;
use crate::kas_key::KasKeyError;
use crate::kas_unwrap::UnwrapError;
use crate::key_access::KeyAccessError;
use crate::manifest::ManifestError;
use crate::policy::PolicyError;
use crate::split::SplitError;
use std::fmt;
use thiserror::Error;

/// Coarse classification of failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad settings or inputs, detected before any key material is used
    Configuration,
    /// Malformed policy or attribute references
    PolicyIntegrity,
    /// Key parsing, agreement, wrap or unwrap failures
    Cryptographic,
    /// Algorithm or cipher the crate does not implement
    Unsupported,
    /// Failures reported by caller-supplied collaborators
    Collaborator,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::PolicyIntegrity => "policy integrity",
            ErrorCategory::Cryptographic => "cryptographic",
            ErrorCategory::Unsupported => "unsupported",
            ErrorCategory::Collaborator => "collaborator",
        };
        f.write_str(name)
    }
}

/// Unified error type for all key-access operations
#[derive(Debug, Error)]
pub enum OpenTdfError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("FQN error: {0}")]
    Fqn(#[from] FqnError),

    #[error("Attribute error: {0}")]
    Attribute(#[from] AttributeError),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Key split error: {0}")]
    Split(#[from] SplitError),

    #[error("KAS key error: {0}")]
    KasKey(#[from] KasKeyError),

    /// The caller's resolver could not supply a key
    #[error("KAS key resolver failed for '{uri}': {source}")]
    Resolver {
        uri: String,
        #[source]
        source: KasKeyError,
    },

    #[error("Key access error: {0}")]
    KeyAccess(#[from] KeyAccessError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Unwrap error: {0}")]
    Unwrap(#[from] UnwrapError),

    /// A wrap task panicked or was cancelled
    #[error("Wrap task failed: {0}")]
    Task(String),
}

fn kas_key_category(e: &KasKeyError) -> ErrorCategory {
    match e {
        KasKeyError::UnsupportedAlgorithm(_) => ErrorCategory::Unsupported,
        KasKeyError::InvalidPem { .. } => ErrorCategory::Cryptographic,
        KasKeyError::UnknownKas { .. }
        | KasKeyError::ResolutionFailed { .. }
        | KasKeyError::JsonError(_) => ErrorCategory::Collaborator,
    }
}

fn manifest_category(e: &ManifestError) -> ErrorCategory {
    match e {
        ManifestError::MissingCipher => ErrorCategory::Configuration,
        ManifestError::UnsupportedCipher { .. } => ErrorCategory::Unsupported,
        ManifestError::Policy(_) | ManifestError::Base64(_) | ManifestError::Serialization(_) => {
            ErrorCategory::PolicyIntegrity
        }
    }
}

impl OpenTdfError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(ConfigError::Cipher(e)) => manifest_category(e),
            Self::Config(_) | Self::Split(_) => ErrorCategory::Configuration,
            Self::Fqn(_) | Self::Attribute(_) | Self::Policy(_) => ErrorCategory::PolicyIntegrity,
            Self::KasKey(e) => kas_key_category(e),
            Self::Resolver { .. } => ErrorCategory::Collaborator,
            Self::KeyAccess(KeyAccessError::UnsupportedMetadata { .. }) => {
                ErrorCategory::Configuration
            }
            Self::KeyAccess(KeyAccessError::KasKey(e)) => kas_key_category(e),
            Self::KeyAccess(_) | Self::Crypto(_) | Self::Unwrap(_) | Self::Task(_) => {
                ErrorCategory::Cryptographic
            }
            Self::Manifest(e) => manifest_category(e),
        }
    }

    /// Returns a stable error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(e) => e.error_code(),
            Self::Fqn(e) => e.error_code(),
            Self::Attribute(e) => e.error_code(),
            Self::Policy(e) => e.error_code(),
            Self::Split(e) => e.error_code(),
            Self::KasKey(e) => e.error_code(),
            Self::Resolver { .. } => "OPENTDF_E_KAS_KEY_RESOLVER",
            Self::KeyAccess(e) => e.error_code(),
            Self::Crypto(_) => "OPENTDF_E_CRYPTO",
            Self::Manifest(e) => e.error_code(),
            Self::Unwrap(_) => "OPENTDF_E_UNWRAP",
            Self::Task(_) => "OPENTDF_E_TASK",
        }
    }

    /// Returns a suggestion for resolving this error
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Policy(e) => e.suggestion(),
            Self::Fqn(e) => Some(e.hint()),
            Self::Attribute(AttributeError::NotFound { .. }) => {
                Some("Register the namespace, attribute and value in the AttributeGraph")
            }
            Self::Config(ConfigError::Cipher(ManifestError::UnsupportedCipher { .. }))
            | Self::Manifest(ManifestError::UnsupportedCipher { .. }) => {
                Some("Use AES-256-GCM as the payload cipher")
            }
            Self::KasKey(KasKeyError::UnsupportedAlgorithm(_)) => {
                Some("Supported KAS key algorithms are rsa:2048, rsa:4096 and ec:secp256r1")
            }
            Self::Resolver { .. } => {
                Some("Attach the KAS public key to the grant or register it with the resolver")
            }
            _ => None,
        }
    }

    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    pub fn is_policy_error(&self) -> bool {
        self.category() == ErrorCategory::PolicyIntegrity
    }

    pub fn is_crypto_error(&self) -> bool {
        self.category() == ErrorCategory::Cryptographic
    }

    pub fn is_unsupported(&self) -> bool {
        self.category() == ErrorCategory::Unsupported
    }

    /// Returns true if a caller-supplied collaborator failed
    pub fn is_collaborator_error(&self) -> bool {
        self.category() == ErrorCategory::Collaborator
    }
}
