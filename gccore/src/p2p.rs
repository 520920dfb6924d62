//! Participant-to-participant handshake crypto.
//!
//! # Protocol Overview
//!
//! 1. Each participant generates an ephemeral X25519 key pair (PCK) and a
//!    16-byte cookie (PCCK) per call.
//! 2. `Hello { identity, nickname, pck, pcck }` is sealed with the GCK-derived
//!    handshake key, so only call members can read it.
//! 3. Both sides derive a directional pairwise key pair from the X25519
//!    shared secret, salted with GCKH and bound to both public keys.
//! 4. `Auth` echoes the peer's PCK and PCCK (proving the pairwise key is
//!    fresh) and carries the sender's media keys.
//! 5. Every later message uses the pairwise session with a strictly
//!    increasing counter nonce; replays are rejected.

use crate::crypto::gcm::{self, NONCE_LEN};
use crate::crypto::hkdf;
use crate::keys::KeyError;
use rand::RngCore;
use std::fmt;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const PCK_LEN: usize = 32;
pub const PCCK_LEN: usize = 16;
pub const MAX_PADDING: usize = 32;

const INFO_PAIRWISE: &[u8] = b"groupcall/p2p";

/// The local participant's ephemeral handshake material.
pub struct LocalParticipantKeys {
    secret: StaticSecret,
    public: PublicKey,
    cookie: [u8; PCCK_LEN],
}

impl fmt::Debug for LocalParticipantKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalParticipantKeys")
            .field("public", &hex::encode(self.public.as_bytes()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl LocalParticipantKeys {
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rng().fill_bytes(&mut seed);
        let secret = StaticSecret::from(seed);
        seed.zeroize();
        let public = PublicKey::from(&secret);
        let mut cookie = [0u8; PCCK_LEN];
        rand::rng().fill_bytes(&mut cookie);
        Self {
            secret,
            public,
            cookie,
        }
    }

    pub fn pck(&self) -> &[u8; PCK_LEN] {
        self.public.as_bytes()
    }

    pub fn pcck(&self) -> &[u8; PCCK_LEN] {
        &self.cookie
    }

    /// Establishes the pairwise session with a peer that sent `remote_pck`.
    pub fn establish(
        &self,
        remote_pck: &[u8],
        remote_pcck: &[u8],
        gckh: &[u8; 32],
    ) -> Result<PairwiseSession, KeyError> {
        let remote_pck: [u8; PCK_LEN] =
            remote_pck.try_into().map_err(|_| KeyError::InvalidLength {
                expected: PCK_LEN,
                actual: remote_pck.len(),
            })?;
        if remote_pcck.len() != PCCK_LEN {
            return Err(KeyError::InvalidLength {
                expected: PCCK_LEN,
                actual: remote_pcck.len(),
            });
        }
        if remote_pck == *self.pck() || remote_pcck == self.cookie {
            return Err(KeyError::InvalidPublicKey);
        }

        let shared = self.secret.diffie_hellman(&PublicKey::from(remote_pck));
        if !shared.was_contributory() {
            return Err(KeyError::InvalidPublicKey);
        }

        let send_key = directional_key(shared.as_bytes(), gckh, self.pck(), &remote_pck)?;
        let receive_key = directional_key(shared.as_bytes(), gckh, &remote_pck, self.pck())?;
        Ok(PairwiseSession {
            send_key,
            receive_key,
            send_counter: 0,
            receive_next: 0,
        })
    }
}

fn directional_key(
    shared: &[u8; 32],
    gckh: &[u8; 32],
    from: &[u8; PCK_LEN],
    to: &[u8; PCK_LEN],
) -> Result<[u8; 32], KeyError> {
    let mut info = Vec::with_capacity(INFO_PAIRWISE.len() + 2 * PCK_LEN);
    info.extend_from_slice(INFO_PAIRWISE);
    info.extend_from_slice(from);
    info.extend_from_slice(to);
    Ok(hkdf::sha256_key(shared, Some(gckh), &info)?)
}

/// Pairwise AEAD channel with one remote participant.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PairwiseSession {
    send_key: [u8; 32],
    receive_key: [u8; 32],
    send_counter: u64,
    receive_next: u64,
}

impl fmt::Debug for PairwiseSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairwiseSession")
            .field("send_counter", &self.send_counter)
            .field("receive_next", &self.receive_next)
            .finish()
    }
}

impl PairwiseSession {
    fn nonce(counter: u64) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        nonce[4..].copy_from_slice(&counter.to_be_bytes());
        nonce
    }

    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, KeyError> {
        let counter = self.send_counter;
        self.send_counter = counter.checked_add(1).ok_or(KeyError::CounterExhausted)?;
        Ok(gcm::seal_with_nonce(
            &self.send_key,
            &Self::nonce(counter),
            plaintext,
            b"p2p",
        )?)
    }

    pub fn open(&mut self, sealed: &[u8]) -> Result<Vec<u8>, KeyError> {
        if sealed.len() < NONCE_LEN {
            return Err(KeyError::Cipher(gcm::GcmError::TooShort(sealed.len())));
        }
        let mut counter_bytes = [0u8; 8];
        counter_bytes.copy_from_slice(&sealed[4..NONCE_LEN]);
        let counter = u64::from_be_bytes(counter_bytes);
        if sealed[..4] != [0u8; 4] || counter < self.receive_next {
            return Err(KeyError::Replay {
                counter,
                expected: self.receive_next,
            });
        }
        let plaintext = gcm::open(&self.receive_key, sealed, b"p2p")?;
        self.receive_next = counter.saturating_add(1);
        Ok(plaintext)
    }
}

/// Random padding up to [`MAX_PADDING`] bytes to blur message lengths.
pub fn padding() -> Vec<u8> {
    let mut rng = rand::rng();
    let len = (rng.next_u32() as usize) % (MAX_PADDING + 1);
    let mut out = vec![0u8; len];
    rng.fill_bytes(&mut out);
    out
}
