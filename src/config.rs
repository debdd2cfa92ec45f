//! Settings for one key-access encryption operation

use crate::crypto::KEY_LEN;
use crate::kas_key::{KasKeyError, KeyAccessServer};
use crate::key_access::{self, KeyAccessError};
use crate::manifest::{self, ManifestError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on parallel wraps when no explicit limit is set
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cipher configuration error: {0}")]
    Cipher(#[from] ManifestError),

    #[error("max_concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("{cipher} needs a {expected}-byte key, got {got} bytes")]
    KeyLength {
        cipher: String,
        expected: usize,
        got: usize,
    },

    #[error("Invalid metadata: {0}")]
    Metadata(#[from] KeyAccessError),

    #[error("Invalid default KAS '{uri}': {source}")]
    DefaultKas {
        uri: String,
        #[source]
        source: KasKeyError,
    },

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ConfigError::Cipher(e) => e.error_code(),
            ConfigError::ZeroConcurrency => "OPENTDF_E_CONFIG_CONCURRENCY",
            ConfigError::KeyLength { .. } => "OPENTDF_E_CONFIG_KEY_LENGTH",
            ConfigError::Metadata(e) => e.error_code(),
            ConfigError::DefaultKas { .. } => "OPENTDF_E_CONFIG_DEFAULT_KAS",
            ConfigError::Parse(_) => "OPENTDF_E_CONFIG_PARSE",
        }
    }
}

/// Encryption settings
///
/// Deserializes from camelCase JSON; every field is optional.
///
/// ```
/// use opentdf_split::config::SplitConfig;
///
/// let config = SplitConfig::from_json(r#"{"maxConcurrency": 4}"#)?;
/// assert_eq!(config.cipher, "AES-256-GCM");
/// assert_eq!(config.concurrency_for(10), 4);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SplitConfig {
    /// Payload cipher named in the manifest
    pub cipher: String,
    /// Parallel wrap limit; defaults to the plan size capped at [`DEFAULT_MAX_CONCURRENCY`]
    pub max_concurrency: Option<usize>,
    /// KAS that receives the whole key when the policy yields no grants
    pub default_kas: Option<KeyAccessServer>,
    /// Plaintext metadata encrypted into every key access object
    pub metadata: Option<serde_json::Value>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            cipher: manifest::cipher::AES_256_GCM.to_string(),
            max_concurrency: None,
            default_kas: None,
            metadata: None,
        }
    }
}

impl SplitConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    #[must_use]
    pub fn with_cipher(mut self, cipher: impl Into<String>) -> Self {
        self.cipher = cipher.into();
        self
    }

    #[must_use]
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    #[must_use]
    pub fn with_default_kas(mut self, kas: KeyAccessServer) -> Self {
        self.default_kas = Some(kas);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Check every setting before any key material is touched
    pub fn validate(&self) -> Result<(), ConfigError> {
        manifest::check_cipher(&self.cipher)?;
        if self.max_concurrency == Some(0) {
            return Err(ConfigError::ZeroConcurrency);
        }
        if let Some(metadata) = &self.metadata {
            key_access::validate_metadata(metadata)?;
        }
        if let Some(kas) = &self.default_kas {
            if let Some(key) = &kas.public_key {
                key.validate().map_err(|source| ConfigError::DefaultKas {
                    uri: kas.uri.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    /// Check a DEK length against the configured cipher
    pub fn check_key_length(&self, len: usize) -> Result<(), ConfigError> {
        manifest::check_cipher(&self.cipher)?;
        // AES-256-GCM is the only accepted cipher
        if len != KEY_LEN {
            return Err(ConfigError::KeyLength {
                cipher: self.cipher.clone(),
                expected: KEY_LEN,
                got: len,
            });
        }
        Ok(())
    }

    /// Number of wraps allowed to run at once for a plan of `entries` steps
    pub fn concurrency_for(&self, entries: usize) -> usize {
        self.max_concurrency
            .unwrap_or_else(|| entries.min(DEFAULT_MAX_CONCURRENCY))
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = SplitConfig::default();
        assert_eq!(config.cipher, "AES-256-GCM");
        assert!(config.validate().is_ok());
        assert_eq!(config.concurrency_for(3), 3);
        assert_eq!(config.concurrency_for(20), 8);
        assert_eq!(config.concurrency_for(0), 1);
    }

    #[test]
    fn test_from_json() -> Result<(), Box<dyn std::error::Error>> {
        let config = SplitConfig::from_json(
            r#"{"cipher":"AES-256-GCM","maxConcurrency":2,"defaultKas":{"uri":"https://kas.example.com"},"metadata":{"a":1}}"#,
        )?;
        assert_eq!(config.max_concurrency, Some(2));
        assert_eq!(
            config.default_kas.as_ref().map(|k| k.uri.as_str()),
            Some("https://kas.example.com")
        );
        config.validate()?;
        Ok(())
    }

    #[test]
    fn test_validate_rejects() {
        let err = SplitConfig::new().with_cipher("").validate().unwrap_err();
        assert!(matches!(err, ConfigError::Cipher(ManifestError::MissingCipher)));

        let err = SplitConfig::new().with_cipher("ChaCha20").validate().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Cipher(ManifestError::UnsupportedCipher { .. })
        ));

        let err = SplitConfig::new().with_max_concurrency(0).validate().unwrap_err();
        assert!(matches!(err, ConfigError::ZeroConcurrency));

        let err = SplitConfig::new().with_metadata(json!(42)).validate().unwrap_err();
        assert_eq!(err.error_code(), "OPENTDF_E_KAO_METADATA");
    }

    #[test]
    fn test_key_length_matches_cipher() {
        let config = SplitConfig::default();
        assert!(config.check_key_length(32).is_ok());
        assert!(matches!(
            config.check_key_length(16),
            Err(ConfigError::KeyLength { expected: 32, got: 16, .. })
        ));
        assert!(config.check_key_length(300).is_err());
    }
}
