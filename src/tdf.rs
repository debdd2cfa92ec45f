//! High-level key-access encryption
//!
//! [`KeyAccessEncryptor`] runs the whole pipeline for one encryption operation:
//! validate the settings and the policy, resolve the policy's attribute values,
//! plan the grants, split the DEK, wrap every share in parallel and assemble the
//! manifest section.

use crate::attribute::AttributeGraph;
use crate::config::SplitConfig;
use crate::crypto::{KeyInfo, IV_LEN};
use crate::error::OpenTdfError;
use crate::kas_key::{KasKeyError, KasKeyResolver, KasPublicKey, KeyAccessServer};
use crate::key_access::{encrypt_metadata, KeyAccessObject, KeyAccessStrategy};
use crate::manifest::{self, EncryptionInformation};
use crate::planner::{self, SplitId};
use crate::policy::{CanonicalPolicy, Policy};
use crate::split::{self, KeyShare, SplitError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// One share waiting to be wrapped for one KAS
struct WrapJob {
    strategy: KeyAccessStrategy,
    share: KeyShare,
    metadata: Option<serde_json::Value>,
    iv: [u8; IV_LEN],
}

impl WrapJob {
    fn run(mut self, policy: &CanonicalPolicy) -> Result<KeyAccessObject, OpenTdfError> {
        let encrypted_metadata = self
            .metadata
            .as_ref()
            .map(|m| encrypt_metadata(m, &self.share, &self.iv))
            .transpose()?;
        let kao = self
            .strategy
            .write(policy, &self.share, encrypted_metadata.as_deref())?;
        debug!(url = %kao.url, kind = %kao.access_type, sid = ?kao.sid, "wrapped key share");
        Ok(kao.clone())
    }
}

/// Encrypts a DEK for every KAS an attribute policy names
///
/// # Example
///
/// ```
/// use opentdf_split::prelude::*;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut graph = AttributeGraph::new();
/// graph.add_namespace("https://example.com", vec![])?;
/// graph.add_attribute("https://example.com/attr/level", AttributeRule::Hierarchy, vec![])?;
/// graph.add_value("https://example.com/attr/level/value/public", vec![])?;
///
/// let policy = PolicyBuilder::new()
///     .id_auto()
///     .attribute_fqn("https://example.com/attr/level/value/public")?
///     .build()?;
///
/// // No grants and no default KAS: nothing to wrap
/// let info = KeyAccessEncryptor::new(SplitConfig::default())
///     .encrypt(&graph, &policy, &KeyInfo::generate())
///     .await?;
/// assert!(info.key_access.is_empty());
/// # Ok(())
/// # }
/// ```
pub struct KeyAccessEncryptor {
    config: SplitConfig,
    resolver: Option<Arc<dyn KasKeyResolver>>,
}

impl KeyAccessEncryptor {
    pub fn new(config: SplitConfig) -> Self {
        Self {
            config,
            resolver: None,
        }
    }

    /// Set the resolver consulted for grants without key material
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn KasKeyResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    /// Produce the encryption section of the manifest for `policy`
    ///
    /// Fails without any partial result if validation, key resolution or any
    /// single wrap fails.
    pub async fn encrypt(
        &self,
        graph: &AttributeGraph,
        policy: &Policy,
        key_info: &KeyInfo,
    ) -> Result<EncryptionInformation, OpenTdfError> {
        self.config.validate()?;
        if key_info.dek().is_empty() {
            return Err(SplitError::EmptyKey.into());
        }
        self.config.check_key_length(key_info.dek().len())?;
        policy.validate()?;
        let canonical = Arc::new(CanonicalPolicy::from_policy(policy)?);

        let values = graph.resolve_policy(policy)?;
        let plan = planner::plan(&values);

        // (grant, sid, index of the share it receives)
        let mut share_count = 0;
        let steps: Vec<(KeyAccessServer, Option<SplitId>, usize)> = if plan.is_empty() {
            match &self.config.default_kas {
                Some(kas) => {
                    info!(kas = %kas.uri, "policy has no grants, using default KAS");
                    share_count = 1;
                    vec![(kas.clone(), None, 0)]
                }
                None => {
                    warn!(policy = %policy.uuid, "policy has no grants, no key access objects written");
                    Vec::new()
                }
            }
        } else {
            let split_ids = plan.split_ids();
            share_count = split_ids.len();
            info!(
                policy = %policy.uuid,
                steps = plan.len(),
                splits = share_count,
                "planned key access"
            );
            plan.into_iter()
                .map(|step| {
                    let index = split_ids.iter().position(|s| *s == step.sid).unwrap_or(0);
                    (step.kas, Some(step.sid), index)
                })
                .collect()
        };

        let shares = if share_count == 0 {
            Vec::new()
        } else {
            split::split(key_info.dek(), share_count)?
        };

        let mut keys: HashMap<String, KasPublicKey> = HashMap::new();
        let mut jobs = Vec::with_capacity(steps.len());
        for (kas, sid, index) in steps {
            let key = self.public_key(&kas, &mut keys)?;
            let share = shares
                .get(index)
                .cloned()
                .ok_or(SplitError::ZeroShares)?;
            jobs.push(WrapJob {
                strategy: KeyAccessStrategy::for_kas(&kas.uri, &key, sid.map(|s| s.to_string()))?,
                share,
                metadata: self.config.metadata.clone(),
                iv: *key_info.iv(),
            });
        }

        let key_access = self.wrap_all(jobs, canonical.clone()).await?;
        Ok(manifest::assemble(
            &self.config.cipher,
            key_info,
            &canonical,
            key_access,
        )?)
    }

    /// Key for `kas`: its own key material, else the resolver
    ///
    /// The first key seen for a URI is used for every later grant naming it.
    fn public_key(
        &self,
        kas: &KeyAccessServer,
        seen: &mut HashMap<String, KasPublicKey>,
    ) -> Result<KasPublicKey, OpenTdfError> {
        if let Some(key) = seen.get(&kas.uri) {
            if kas.public_key.as_ref().is_some_and(|k| k != key) {
                warn!(kas = %kas.uri, "conflicting key material for KAS, keeping the first");
            }
            return Ok(key.clone());
        }

        let key = match &kas.public_key {
            Some(key) => key.clone(),
            None => {
                let resolver = self.resolver.as_ref().ok_or_else(|| OpenTdfError::Resolver {
                    uri: kas.uri.clone(),
                    source: KasKeyError::UnknownKas {
                        uri: kas.uri.clone(),
                    },
                })?;
                debug!(kas = %kas.uri, "resolving KAS public key");
                resolver
                    .resolve(&kas.uri)
                    .map_err(|source| OpenTdfError::Resolver {
                        uri: kas.uri.clone(),
                        source,
                    })?
            }
        };
        seen.insert(kas.uri.clone(), key.clone());
        Ok(key)
    }

    /// Run every wrap on the blocking pool, at most `concurrency_for` at a time
    ///
    /// Output order follows `jobs`. The first failure aborts the remaining tasks.
    async fn wrap_all(
        &self,
        jobs: Vec<WrapJob>,
        policy: Arc<CanonicalPolicy>,
    ) -> Result<Vec<KeyAccessObject>, OpenTdfError> {
        let count = jobs.len();
        let limit = self.config.concurrency_for(count);
        let semaphore = Arc::new(Semaphore::new(limit));
        debug!(jobs = count, limit, "wrapping key shares");

        let mut tasks = JoinSet::new();
        for (index, job) in jobs.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let policy = Arc::clone(&policy);
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| OpenTdfError::Task(e.to_string()))?;
                let kao = tokio::task::spawn_blocking(move || job.run(&policy))
                    .await
                    .map_err(|e| OpenTdfError::Task(format!("spawn_blocking failed: {}", e)))??;
                Ok::<_, OpenTdfError>((index, kao))
            });
        }

        let mut results: Vec<Option<KeyAccessObject>> = vec![None; count];
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined
                .map_err(|e| OpenTdfError::Task(e.to_string()))
                .and_then(|r| r);
            match outcome {
                Ok((index, kao)) => results[index] = Some(kao),
                Err(e) => {
                    tasks.abort_all();
                    warn!(error = %e, code = e.error_code(), "wrap failed, aborting");
                    return Err(e);
                }
            }
        }

        results
            .into_iter()
            .map(|kao| kao.ok_or_else(|| OpenTdfError::Task("wrap task produced no result".into())))
            .collect()
    }
}
