//! Symmetric primitives shared by the wrappers and the unwrapper
//!
//! AES-256-GCM with a 96-bit IV and 128-bit tag, HKDF-SHA256 key derivation with
//! the TDF salt, and HMAC-SHA256 policy bindings in the format KAS verifies.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use lazy_static::lazy_static;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

type HmacSha256 = Hmac<Sha256>;

/// AES-GCM nonce length in bytes
pub const IV_LEN: usize = 12;
/// AES-GCM tag length in bytes
pub const TAG_LEN: usize = 16;
/// AES-256 key length in bytes
pub const KEY_LEN: usize = 32;

lazy_static! {
    static ref TDF_SALT: [u8; 32] = Sha256::digest(b"TDF").into();
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("AEAD operation failed")]
    Aead,

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Invalid IV length: expected 12, got {0}")]
    InvalidIvLength(usize),

    #[error("Ciphertext too short: {0} bytes")]
    CiphertextTooShort(usize),

    #[error("Key derivation failed")]
    KeyDerivation,

    #[error("HMAC initialization failed")]
    HmacInit,

    #[error("Policy binding verification failed")]
    BindingMismatch,

    #[error("Base64 decode error: {0}")]
    Base64Error(#[from] base64::DecodeError),
}

/// Data encryption key and payload IV for one encryption operation
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyInfo {
    dek: Vec<u8>,
    iv: [u8; IV_LEN],
}

impl KeyInfo {
    /// Fresh random 256-bit DEK and IV
    pub fn generate() -> Self {
        let mut dek = vec![0u8; KEY_LEN];
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut dek);
        OsRng.fill_bytes(&mut iv);
        Self { dek, iv }
    }

    pub fn new(dek: &[u8], iv: &[u8]) -> Result<Self, CryptoError> {
        let iv: [u8; IV_LEN] = iv
            .try_into()
            .map_err(|_| CryptoError::InvalidIvLength(iv.len()))?;
        Ok(Self {
            dek: dek.to_vec(),
            iv,
        })
    }

    pub fn dek(&self) -> &[u8] {
        &self.dek
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }
}

impl std::fmt::Debug for KeyInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyInfo")
            .field("dek_len", &self.dek.len())
            .finish_non_exhaustive()
    }
}

/// HKDF salt used for every ECDH wrap: SHA-256 of `"TDF"`, computed once
pub fn hkdf_salt() -> &'static [u8; 32] {
    &*TDF_SALT
}

/// Derive the 32-byte key-encryption key from an ECDH shared secret
pub fn derive_kek(shared_secret: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let hkdf = Hkdf::<Sha256>::new(Some(hkdf_salt().as_slice()), shared_secret);
    let mut kek = Zeroizing::new([0u8; KEY_LEN]);
    hkdf.expand(&[], &mut kek[..])
        .map_err(|_| CryptoError::KeyDerivation)?;
    Ok(kek)
}

fn cipher(key: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
        expected: KEY_LEN,
        got: key.len(),
    })
}

/// AES-256-GCM encrypt with a caller-supplied IV; returns `ciphertext || tag`
pub fn seal_with_iv(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if iv.len() != IV_LEN {
        return Err(CryptoError::InvalidIvLength(iv.len()));
    }
    cipher(key)?
        .encrypt(Nonce::from_slice(iv), plaintext)
        .map_err(|_| CryptoError::Aead)
}

/// AES-256-GCM encrypt under a random IV; returns `IV || ciphertext || tag`
pub fn seal(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let ciphertext = seal_with_iv(key, &iv, plaintext)?;

    let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Inverse of [`seal`]
pub fn open(key: &[u8], sealed: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if sealed.len() < IV_LEN + TAG_LEN {
        return Err(CryptoError::CiphertextTooShort(sealed.len()));
    }
    let (iv, ciphertext) = sealed.split_at(IV_LEN);
    cipher(key)?
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::Aead)
}

pub fn calculate_hmac(key: &[u8], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| CryptoError::HmacInit)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Policy binding over an already base64-encoded policy
///
/// `base64(hex(HMAC-SHA256(key, policy_base64)))`, as KAS verifies it.
pub fn calculate_policy_binding(policy_base64: &str, key: &[u8]) -> Result<String, CryptoError> {
    let mac = calculate_hmac(key, policy_base64.as_bytes())?;
    Ok(BASE64.encode(hex::encode(mac)))
}

/// Check a stored binding in constant time
pub fn verify_policy_binding(
    policy_base64: &str,
    key: &[u8],
    expected_b64: &str,
) -> Result<(), CryptoError> {
    let calculated = calculate_policy_binding(policy_base64, key)?;
    let calculated = BASE64.decode(calculated)?;
    let expected = BASE64.decode(expected_b64)?;

    if calculated.ct_eq(&expected).into() {
        Ok(())
    } else {
        Err(CryptoError::BindingMismatch)
    }
}
