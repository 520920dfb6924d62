//! Group call key hierarchy.
//!
//! ```text
//! GCK ──HKDF──┬── GCKH  handshake salt, call-scoped
//!             ├── GCHK  seals Hello messages
//!             └── GCSK  seals the encrypted call state
//! ```
//!
//! The GCK lives in memory only and is wiped on drop.

use crate::crypto::gcm::{self, GcmError};
use crate::crypto::hkdf::{self, HkdfError};
use rand::RngCore;
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const GCK_LEN: usize = 32;

const INFO_GCKH: &[u8] = b"groupcall/gckh";
const INFO_GCHK: &[u8] = b"groupcall/gchk";
const INFO_GCSK: &[u8] = b"groupcall/gcsk";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("key derivation failed: {0}")]
    Derivation(#[from] HkdfError),
    #[error("cipher failure: {0}")]
    Cipher(#[from] GcmError),
    #[error("epoch counter exhausted")]
    EpochExhausted,
    #[error("nonce counter exhausted")]
    CounterExhausted,
    #[error("replayed or reordered message: counter {counter}, expected at least {expected}")]
    Replay { counter: u64, expected: u64 },
    #[error("invalid public key")]
    InvalidPublicKey,
}

/// The symmetric call secret announced in the call-start message.
#[derive(Clone, Zeroize, ZeroizeOnDrop, PartialEq, Eq)]
pub struct GroupCallKey([u8; GCK_LEN]);

impl GroupCallKey {
    pub fn generate() -> Self {
        let mut key = [0u8; GCK_LEN];
        rand::rng().fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyError> {
        let key: [u8; GCK_LEN] = bytes.try_into().map_err(|_| KeyError::InvalidLength {
            expected: GCK_LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(key))
    }

    pub fn as_bytes(&self) -> &[u8; GCK_LEN] {
        &self.0
    }
}

impl fmt::Debug for GroupCallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GroupCallKey([REDACTED])")
    }
}

/// Keys derived from the GCK for one call.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct GroupCallKeys {
    gck: GroupCallKey,
    gckh: [u8; 32],
    gchk: [u8; 32],
    gcsk: [u8; 32],
}

impl fmt::Debug for GroupCallKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupCallKeys")
            .field("gck", &"[REDACTED]")
            .field("gckh", &"[REDACTED]")
            .field("gchk", &"[REDACTED]")
            .field("gcsk", &"[REDACTED]")
            .finish()
    }
}

impl GroupCallKeys {
    pub fn derive(gck: GroupCallKey) -> Result<Self, KeyError> {
        let gckh = hkdf::sha256_key(gck.as_bytes(), None, INFO_GCKH)?;
        let gchk = hkdf::sha256_key(gck.as_bytes(), None, INFO_GCHK)?;
        let gcsk = hkdf::sha256_key(gck.as_bytes(), None, INFO_GCSK)?;
        Ok(Self {
            gck,
            gckh,
            gchk,
            gcsk,
        })
    }

    pub fn gck(&self) -> &GroupCallKey {
        &self.gck
    }

    /// Call-scoped salt for pairwise key derivation.
    pub fn gckh(&self) -> &[u8; 32] {
        &self.gckh
    }

    pub fn seal_hello(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeyError> {
        Ok(gcm::seal(&self.gchk, plaintext, b"hello")?)
    }

    pub fn open_hello(&self, sealed: &[u8]) -> Result<Vec<u8>, KeyError> {
        Ok(gcm::open(&self.gchk, sealed, b"hello")?)
    }

    pub fn seal_call_state(&self, plaintext: &[u8]) -> Result<Vec<u8>, KeyError> {
        Ok(gcm::seal(&self.gcsk, plaintext, b"call-state")?)
    }

    pub fn open_call_state(&self, sealed: &[u8]) -> Result<Vec<u8>, KeyError> {
        Ok(gcm::open(&self.gcsk, sealed, b"call-state")?)
    }
}
