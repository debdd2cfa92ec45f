//! Commonly used types
//!
//! # Example
//!
//! ```rust
//! use opentdf_split::prelude::*;
//!
//! let policy = PolicyBuilder::new()
//!     .id_auto()
//!     .dissemination(["user@example.com"])
//!     .build()?;
//! let config = SplitConfig::new().with_max_concurrency(4);
//! let encryptor = KeyAccessEncryptor::new(config);
//! assert_eq!(encryptor.config().max_concurrency, Some(4));
//! # let _ = policy;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use crate::attribute::{AttributeGraph, AttributeRule, ValueRef};
pub use crate::config::SplitConfig;
pub use crate::crypto::KeyInfo;
pub use crate::error::{ErrorCategory, OpenTdfError};
pub use crate::fqn::AttributeFqn;
pub use crate::kas_key::{
    KasKeyResolver, KasPublicKey, KeyAccessServer, KeyAlgorithm, StaticKasKeyResolver,
};
pub use crate::kas_unwrap::{reconstruct_dek, unwrap_key_access, KasPrivateKey};
pub use crate::key_access::{KeyAccessObject, KeyAccessStrategy, PolicyBinding};
pub use crate::manifest::{EncryptionInformation, TdfManifest};
pub use crate::planner::{plan, GrantPlan, SplitId, SplitStep};
pub use crate::policy::{AttributeObject, CanonicalPolicy, Policy, PolicyBuilder};
pub use crate::split::KeyShare;
pub use crate::tdf::KeyAccessEncryptor;
