//! Common test utilities for opentdf-split integration tests
//!
//! Attribute graph fixtures and KAS key pairs shared across test files.

#![allow(dead_code)]

use lazy_static::lazy_static;
use opentdf_split::kas_unwrap::KasPrivateKey;
use opentdf_split::prelude::*;
use rand::rngs::OsRng;

pub const NS: &str = "https://virtru.com";

pub const KAS_US: &str = "https://kas.us";
pub const KAS_CA: &str = "https://kas.ca";
pub const KAS_SEC: &str = "https://kas.sec";

lazy_static! {
    /// RSA key generation is slow; every test shares one key
    static ref RSA_PRIVATE: rsa::RsaPrivateKey =
        rsa::RsaPrivateKey::new(&mut OsRng, 2048).expect("generate RSA key");
}

/// Fresh P-256 KAS key pair
pub fn ec_kas_key() -> (KasPrivateKey, KasPublicKey) {
    use p256::pkcs8::{EncodePublicKey, LineEnding};

    let secret = p256::SecretKey::random(&mut OsRng);
    let pem = secret
        .public_key()
        .to_public_key_pem(LineEnding::LF)
        .expect("encode EC public key");
    (
        KasPrivateKey::Ec(secret),
        KasPublicKey::new(KeyAlgorithm::EcP256, pem),
    )
}

/// The shared RSA 2048 KAS key pair
pub fn rsa_kas_key() -> (KasPrivateKey, KasPublicKey) {
    use rsa::pkcs8::{EncodePublicKey, LineEnding};

    let private = RSA_PRIVATE.clone();
    let pem = private
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .expect("encode RSA public key");
    (
        KasPrivateKey::Rsa(private),
        KasPublicKey::new(KeyAlgorithm::Rsa2048, pem),
    )
}

pub fn value_fqn(attribute: &str, value: &str) -> String {
    format!("{NS}/attr/{attribute}/value/{value}")
}

/// classification (hierarchy, no grants), rel (anyOf, one KAS per country) and
/// needtoknow (allOf, one KAS for "sec")
pub fn classification_graph(
    us: KeyAccessServer,
    ca: KeyAccessServer,
    sec: KeyAccessServer,
) -> AttributeGraph {
    let mut g = AttributeGraph::new();
    g.add_namespace(NS, vec![]).expect("namespace");

    g.add_attribute(
        &format!("{NS}/attr/classification"),
        AttributeRule::Hierarchy,
        vec![],
    )
    .expect("classification");
    for level in ["topsecret", "secret", "confidential"] {
        g.add_value(&value_fqn("classification", level), vec![])
            .expect("classification value");
    }

    g.add_attribute(&format!("{NS}/attr/rel"), AttributeRule::AnyOf, vec![])
        .expect("rel");
    g.add_value(&value_fqn("rel", "usa"), vec![us]).expect("rel usa");
    g.add_value(&value_fqn("rel", "can"), vec![ca]).expect("rel can");

    g.add_attribute(&format!("{NS}/attr/needtoknow"), AttributeRule::AllOf, vec![])
        .expect("needtoknow");
    g.add_value(&value_fqn("needtoknow", "sec"), vec![sec])
        .expect("needtoknow sec");
    g.add_value(&value_fqn("needtoknow", "inf"), vec![])
        .expect("needtoknow inf");
    g
}

/// Policy over the given value FQNs with one dissemination target
pub fn policy_for(fqns: &[String]) -> Policy {
    fqns.iter()
        .try_fold(PolicyBuilder::new().id_auto(), |b, fqn| b.attribute_fqn(fqn))
        .expect("attribute fqn")
        .dissem("user@virtru.com")
        .build()
        .expect("policy")
}
