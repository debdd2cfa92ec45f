//! Grant planning: which KAS holds which share of the key
//!
//! The planner turns the attribute values of a policy into a list of
//! `(KAS, split id)` steps. Values that are alternatives of each other share a
//! split id, so any one of their KASes can release that share. Distinct
//! compartments get distinct split ids, so every one of them must be released
//! to rebuild the key.

use crate::attribute::ValueRef;
use crate::kas_key::KeyAccessServer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Label of one key share
///
/// Ordered numerically and rendered as `s1`, `s2`, ... in key access objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SplitId(u32);

impl SplitId {
    pub fn new(rank: u32) -> Self {
        SplitId(rank)
    }

    pub fn rank(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for SplitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// One entry of a grant plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitStep {
    pub kas: KeyAccessServer,
    pub sid: SplitId,
}

/// Ordered, deduplicated list of split steps, sorted by sid then KAS URI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantPlan {
    steps: Vec<SplitStep>,
}

impl GrantPlan {
    pub fn steps(&self) -> &[SplitStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Distinct split ids in ascending order; share `i` of the key belongs to the
    /// i-th id of this list
    pub fn split_ids(&self) -> Vec<SplitId> {
        let mut ids: Vec<SplitId> = self.steps.iter().map(|s| s.sid).collect();
        ids.dedup();
        ids
    }

    /// Position of `sid` in [`GrantPlan::split_ids`]
    pub fn share_index(&self, sid: SplitId) -> Option<usize> {
        self.split_ids().iter().position(|s| *s == sid)
    }
}

impl IntoIterator for GrantPlan {
    type Item = SplitStep;
    type IntoIter = std::vec::IntoIter<SplitStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.into_iter()
    }
}

/// Compartment a value belongs to: the attribute for alternatives, the value
/// itself when every value of the attribute is required
fn compartment_key(value: &ValueRef<'_>) -> String {
    if value.rule().is_disjunctive() {
        value.attribute_fqn().to_url()
    } else {
        value.fqn().to_url()
    }
}

/// Build the grant plan for a set of attribute values
///
/// Each value contributes the grants of its most specific granted level; values
/// without any grant are dropped. Split ids are numbered in the sorted order of
/// compartment FQNs, so the plan does not depend on the order of `values`.
pub fn plan(values: &[ValueRef<'_>]) -> GrantPlan {
    let mut compartments: BTreeMap<String, BTreeMap<&str, &KeyAccessServer>> = BTreeMap::new();
    let mut dropped = 0usize;

    for value in values {
        let grants = value.grants();
        if grants.is_empty() {
            dropped += 1;
            continue;
        }
        let kases = compartments.entry(compartment_key(value)).or_default();
        for grant in grants {
            kases.entry(grant.uri.as_str()).or_insert(grant);
        }
    }

    let steps: Vec<SplitStep> = compartments
        .into_values()
        .zip(1u32..)
        .flat_map(|(kases, rank)| {
            kases.into_values().map(move |kas| SplitStep {
                kas: kas.clone(),
                sid: SplitId::new(rank),
            })
        })
        .collect();

    debug!(
        values = values.len(),
        dropped,
        steps = steps.len(),
        "built grant plan"
    );

    GrantPlan { steps }
}
