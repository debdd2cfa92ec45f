//! Attribute graph: namespaces, attributes and values with their KAS grants
//!
//! The graph is an arena of definitions keyed by FQN URL. Values and attributes
//! reference their parents by FQN rather than by pointer, so lookups walk the arena
//! instead of an ownership tree.
//!
//! # Example
//!
//! ```
//! use opentdf_split::attribute::{AttributeGraph, AttributeRule};
//!
//! let mut graph = AttributeGraph::new();
//! graph.add_namespace("https://example.com", vec![])?;
//! graph.add_attribute("https://example.com/attr/rel", AttributeRule::AnyOf, vec![])?;
//! graph.add_value("https://example.com/attr/rel/value/usa", vec![])?;
//!
//! let value = graph.value("https://example.com/attr/rel/value/usa")?;
//! assert!(value.grants().is_empty());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::fqn::{AttributeFqn, FqnError};
use crate::kas_key::KeyAccessServer;
use crate::policy::Policy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttributeError {
    #[error("FQN error: {0}")]
    Fqn(#[from] FqnError),

    #[error("Expected a {expected} FQN, got '{fqn}'")]
    WrongLevel { fqn: String, expected: &'static str },

    #[error("Unknown {kind} '{fqn}'")]
    NotFound { kind: &'static str, fqn: String },

    #[error("Duplicate definition for '{fqn}'")]
    Duplicate { fqn: String },
}

impl AttributeError {
    pub fn error_code(&self) -> &'static str {
        match self {
            AttributeError::Fqn(e) => e.error_code(),
            AttributeError::WrongLevel { .. } => "OPENTDF_E_ATTRIBUTE_LEVEL",
            AttributeError::NotFound { .. } => "OPENTDF_E_ATTRIBUTE_NOT_FOUND",
            AttributeError::Duplicate { .. } => "OPENTDF_E_ATTRIBUTE_DUPLICATE",
        }
    }
}

/// How multiple values of one attribute combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeRule {
    /// Every value is required; each is its own compartment
    AllOf,
    /// Values are alternatives
    AnyOf,
    /// Ordered levels; treated as alternatives for key access
    Hierarchy,
}

impl AttributeRule {
    /// Whether values of this attribute are alternatives of each other
    pub fn is_disjunctive(&self) -> bool {
        !matches!(self, AttributeRule::AllOf)
    }
}

#[derive(Debug, Clone)]
pub struct NamespaceDefinition {
    pub fqn: AttributeFqn,
    pub grants: Vec<KeyAccessServer>,
}

#[derive(Debug, Clone)]
pub struct AttributeDefinition {
    pub fqn: AttributeFqn,
    pub rule: AttributeRule,
    pub grants: Vec<KeyAccessServer>,
}

#[derive(Debug, Clone)]
pub struct ValueDefinition {
    pub fqn: AttributeFqn,
    pub grants: Vec<KeyAccessServer>,
}

/// Arena of attribute definitions addressed by FQN URL
#[derive(Debug, Clone, Default)]
pub struct AttributeGraph {
    namespaces: HashMap<String, NamespaceDefinition>,
    attributes: HashMap<String, AttributeDefinition>,
    values: HashMap<String, ValueDefinition>,
}

fn parse_at_level(
    fqn: &str,
    expected: &'static str,
    check: impl Fn(&AttributeFqn) -> bool,
) -> Result<AttributeFqn, AttributeError> {
    let parsed = AttributeFqn::parse(fqn)?;
    if check(&parsed) {
        Ok(parsed)
    } else {
        Err(AttributeError::WrongLevel {
            fqn: fqn.to_string(),
            expected,
        })
    }
}

impl AttributeGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a namespace with its grants
    pub fn add_namespace(
        &mut self,
        fqn: &str,
        grants: Vec<KeyAccessServer>,
    ) -> Result<&mut Self, AttributeError> {
        let fqn = parse_at_level(fqn, "namespace", |f| f.is_namespace())?;
        let key = fqn.to_url();
        if self.namespaces.contains_key(&key) {
            return Err(AttributeError::Duplicate { fqn: key });
        }
        self.namespaces
            .insert(key, NamespaceDefinition { fqn, grants });
        Ok(self)
    }

    /// Register an attribute; its namespace must already exist
    pub fn add_attribute(
        &mut self,
        fqn: &str,
        rule: AttributeRule,
        grants: Vec<KeyAccessServer>,
    ) -> Result<&mut Self, AttributeError> {
        let fqn = parse_at_level(fqn, "attribute", |f| !f.is_namespace() && !f.is_value())?;
        let key = fqn.to_url();
        if self.attributes.contains_key(&key) {
            return Err(AttributeError::Duplicate { fqn: key });
        }
        let namespace = AttributeFqn::namespace_of(fqn.namespace()).to_url();
        if !self.namespaces.contains_key(&namespace) {
            return Err(AttributeError::NotFound {
                kind: "namespace",
                fqn: namespace,
            });
        }
        self.attributes
            .insert(key, AttributeDefinition { fqn, rule, grants });
        Ok(self)
    }

    /// Register a value; its attribute must already exist
    pub fn add_value(
        &mut self,
        fqn: &str,
        grants: Vec<KeyAccessServer>,
    ) -> Result<&mut Self, AttributeError> {
        let fqn = parse_at_level(fqn, "value", |f| f.is_value())?;
        let key = fqn.to_url();
        if self.values.contains_key(&key) {
            return Err(AttributeError::Duplicate { fqn: key });
        }
        let attribute = fqn.parent().map(|p| p.to_url()).unwrap_or_default();
        if !self.attributes.contains_key(&attribute) {
            return Err(AttributeError::NotFound {
                kind: "attribute",
                fqn: attribute,
            });
        }
        self.values.insert(key, ValueDefinition { fqn, grants });
        Ok(self)
    }

    /// Look up a value together with its attribute and namespace
    pub fn value(&self, fqn: &str) -> Result<ValueRef<'_>, AttributeError> {
        let parsed = parse_at_level(fqn, "value", |f| f.is_value())?;
        let key = parsed.to_url();
        let value = self.values.get(&key).ok_or(AttributeError::NotFound {
            kind: "value",
            fqn: key,
        })?;
        let attr_key = value.fqn.parent().map(|p| p.to_url()).unwrap_or_default();
        let attribute = self
            .attributes
            .get(&attr_key)
            .ok_or(AttributeError::NotFound {
                kind: "attribute",
                fqn: attr_key,
            })?;
        let ns_key = AttributeFqn::namespace_of(value.fqn.namespace()).to_url();
        let namespace = self
            .namespaces
            .get(&ns_key)
            .ok_or(AttributeError::NotFound {
                kind: "namespace",
                fqn: ns_key,
            })?;
        Ok(ValueRef {
            value,
            attribute,
            namespace,
        })
    }

    /// Resolve a list of value FQNs, failing on the first unknown one
    pub fn values<'a, I, S>(&'a self, fqns: I) -> Result<Vec<ValueRef<'a>>, AttributeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        fqns.into_iter().map(|f| self.value(f.as_ref())).collect()
    }

    /// Resolve every data attribute of a policy
    pub fn resolve_policy(&self, policy: &Policy) -> Result<Vec<ValueRef<'_>>, AttributeError> {
        self.values(policy.attribute_fqns())
    }
}

/// A value viewed with its ancestors
#[derive(Debug, Clone, Copy)]
pub struct ValueRef<'a> {
    pub value: &'a ValueDefinition,
    pub attribute: &'a AttributeDefinition,
    pub namespace: &'a NamespaceDefinition,
}

impl<'a> ValueRef<'a> {
    /// Grants of the most specific level that has any: value, then attribute, then
    /// namespace. Empty when no level carries a grant.
    pub fn grants(&self) -> &'a [KeyAccessServer] {
        [
            &self.value.grants,
            &self.attribute.grants,
            &self.namespace.grants,
        ]
        .into_iter()
        .find(|grants| !grants.is_empty())
        .map(Vec::as_slice)
        .unwrap_or(&[])
    }

    pub fn rule(&self) -> AttributeRule {
        self.attribute.rule
    }

    pub fn fqn(&self) -> &'a AttributeFqn {
        &self.value.fqn
    }

    pub fn attribute_fqn(&self) -> &'a AttributeFqn {
        &self.attribute.fqn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kas(uri: &str) -> KeyAccessServer {
        KeyAccessServer::unresolved(uri)
    }

    fn uris(grants: &[KeyAccessServer]) -> Vec<&str> {
        grants.iter().map(|g| g.uri.as_str()).collect()
    }

    #[test]
    fn test_registration_requires_parents() {
        let mut graph = AttributeGraph::new();
        let err = graph
            .add_attribute("https://example.com/attr/a", AttributeRule::AnyOf, vec![])
            .unwrap_err();
        assert!(matches!(err, AttributeError::NotFound { kind: "namespace", .. }));

        graph.add_namespace("https://example.com", vec![]).unwrap();
        let err = graph
            .add_value("https://example.com/attr/a/value/x", vec![])
            .unwrap_err();
        assert!(matches!(err, AttributeError::NotFound { kind: "attribute", .. }));
    }

    #[test]
    fn test_wrong_level_and_duplicates() {
        let mut graph = AttributeGraph::new();
        assert!(matches!(
            graph.add_namespace("https://example.com/attr/a", vec![]),
            Err(AttributeError::WrongLevel { .. })
        ));
        graph.add_namespace("https://example.com", vec![]).unwrap();
        assert!(matches!(
            graph.add_namespace("https://EXAMPLE.com", vec![]),
            Err(AttributeError::Duplicate { .. })
        ));
    }

    #[test]
    fn test_grant_specificity() {
        let combos = [
            (true, true, true, "kas-v"),
            (true, false, true, "kas-v"),
            (true, true, false, "kas-v"),
            (false, true, true, "kas-a"),
            (false, true, false, "kas-a"),
            (false, false, true, "kas-n"),
        ];
        for (v, a, n, expected) in combos {
            let pick = |on: bool, uri: &str| if on { vec![kas(uri)] } else { vec![] };
            let mut graph = AttributeGraph::new();
            graph
                .add_namespace("https://example.com", pick(n, "kas-n"))
                .unwrap();
            graph
                .add_attribute(
                    "https://example.com/attr/a",
                    AttributeRule::AnyOf,
                    pick(a, "kas-a"),
                )
                .unwrap();
            graph
                .add_value("https://example.com/attr/a/value/x", pick(v, "kas-v"))
                .unwrap();

            let value = graph.value("https://example.com/attr/a/value/x").unwrap();
            assert_eq!(uris(value.grants()), vec![expected]);
        }
    }

    #[test]
    fn test_no_grants_anywhere() {
        let mut graph = AttributeGraph::new();
        graph.add_namespace("https://example.com", vec![]).unwrap();
        graph
            .add_attribute("https://example.com/attr/a", AttributeRule::AllOf, vec![])
            .unwrap();
        graph
            .add_value("https://example.com/attr/a/value/x", vec![])
            .unwrap();
        let value = graph.value("https://example.com/attr/a/value/x").unwrap();
        assert!(value.grants().is_empty());
        assert_eq!(value.rule(), AttributeRule::AllOf);
    }

    #[test]
    fn test_resolve_policy() {
        let mut graph = AttributeGraph::new();
        graph.add_namespace("https://example.com", vec![]).unwrap();
        graph
            .add_attribute("https://example.com/attr/a", AttributeRule::AnyOf, vec![])
            .unwrap();
        graph
            .add_value("https://example.com/attr/a/value/x", vec![kas("kas-x")])
            .unwrap();

        let policy = Policy::new(
            "p".to_string(),
            vec![crate::policy::AttributeObject::new("https://example.com/attr/a/value/x")],
            vec![],
        );
        let values = graph.resolve_policy(&policy).unwrap();
        assert_eq!(uris(values[0].grants()), vec!["kas-x"]);

        let unknown = Policy::new(
            "p".to_string(),
            vec![crate::policy::AttributeObject::new("https://example.com/attr/a/value/y")],
            vec![],
        );
        assert!(matches!(
            graph.resolve_policy(&unknown),
            Err(AttributeError::NotFound { kind: "value", .. })
        ));
    }

    #[test]
    fn test_unknown_value() {
        let graph = AttributeGraph::new();
        assert!(matches!(
            graph.value("https://example.com/attr/a/value/x"),
            Err(AttributeError::NotFound { kind: "value", .. })
        ));
    }
}
