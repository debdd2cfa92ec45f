//! Key access for OpenTDF: grant planning, key splitting and KAS wrapping
//!
//! Given an attribute policy and a data encryption key, this crate decides which
//! Key Access Servers receive which share of the key, wraps each share for its
//! server and assembles the `encryptionInformation` section of a TDF manifest.
//! Payload encryption, archive I/O and KAS transport are left to the caller.

pub mod attribute;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fqn;
pub mod kas_key;
pub mod kas_unwrap;
pub mod key_access;
pub mod manifest;
pub mod planner;
pub mod policy;
pub mod prelude;
pub mod split;
pub mod tdf;

pub use attribute::{AttributeGraph, AttributeRule};
pub use config::SplitConfig;
pub use crypto::KeyInfo;
pub use error::{ErrorCategory, OpenTdfError};
pub use kas_key::{KasKeyResolver, KasPublicKey, KeyAccessServer, KeyAlgorithm};
pub use key_access::KeyAccessObject;
pub use manifest::{EncryptionInformation, TdfManifest};
pub use planner::{GrantPlan, SplitId};
pub use policy::{Policy, PolicyBuilder};
pub use tdf::KeyAccessEncryptor;
