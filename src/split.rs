//! XOR secret splitting of the data encryption key
//!
//! `split(dek, n)` yields `n` shares whose XOR is the DEK. Any `n - 1` of them are
//! uniformly random and reveal nothing about the key.

use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SplitError {
    #[error("Cannot split an empty key")]
    EmptyKey,

    #[error("Share count must be at least 1")]
    ZeroShares,

    #[error("No shares to merge")]
    NoShares,

    #[error("Share {index} has length {got}, expected {expected}")]
    LengthMismatch {
        index: usize,
        expected: usize,
        got: usize,
    },
}

impl SplitError {
    pub fn error_code(&self) -> &'static str {
        match self {
            SplitError::EmptyKey => "OPENTDF_E_SPLIT_EMPTY_KEY",
            SplitError::ZeroShares => "OPENTDF_E_SPLIT_ZERO_SHARES",
            SplitError::NoShares => "OPENTDF_E_SPLIT_NO_SHARES",
            SplitError::LengthMismatch { .. } => "OPENTDF_E_SPLIT_LENGTH",
        }
    }
}

/// One share of a split key; zeroized on drop
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyShare(Vec<u8>);

impl KeyShare {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        KeyShare(bytes.to_vec())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyShare({} bytes)", self.0.len())
    }
}

/// Split `dek` into `n` shares
///
/// With `n == 1` the single share is the key itself.
pub fn split(dek: &[u8], n: usize) -> Result<Vec<KeyShare>, SplitError> {
    if dek.is_empty() {
        return Err(SplitError::EmptyKey);
    }
    if n == 0 {
        return Err(SplitError::ZeroShares);
    }

    let mut last = KeyShare::from_bytes(dek);
    let mut shares = Vec::with_capacity(n);
    for _ in 1..n {
        let mut random = vec![0u8; dek.len()];
        OsRng.fill_bytes(&mut random);
        for (acc, byte) in last.0.iter_mut().zip(&random) {
            *acc ^= byte;
        }
        shares.push(KeyShare(random));
    }
    shares.push(last);
    Ok(shares)
}

/// XOR-fold shares back into the key
pub fn merge<S: AsRef<[u8]>>(shares: &[S]) -> Result<KeyShare, SplitError> {
    let (first, rest) = shares.split_first().ok_or(SplitError::NoShares)?;
    let mut key = KeyShare::from_bytes(first.as_ref());
    for (i, share) in rest.iter().enumerate() {
        let share = share.as_ref();
        if share.len() != key.len() {
            return Err(SplitError::LengthMismatch {
                index: i + 1,
                expected: key.len(),
                got: share.len(),
            });
        }
        for (acc, byte) in key.0.iter_mut().zip(share) {
            *acc ^= byte;
        }
    }
    Ok(key)
}

impl AsRef<[u8]> for KeyShare {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
