//! Per-participant media key sets and frame protection.
//!
//! A [`MediaKeySet`] holds one participant call media key (PCMK) for one
//! epoch, plus the keys derived from it for microphone, camera/screen and
//! control traffic.
//!
//! # Frame format
//!
//! ```text
//! epoch (u32 BE) | counter (u64 BE) | AES-256-GCM ciphertext + tag
//! ```
//!
//! The nonce is `counter || epoch` and the AAD is the 12-byte header followed
//! by the usage tag, so a frame cannot be replayed across kinds or epochs.

use crate::crypto::gcm::{self, GcmError};
use crate::crypto::hkdf;
use crate::keys::{GroupCallKey, KeyError};
use crate::types::ParticipantId;
use gcproto::groupcall::MediaKey;
use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const PCMK_LEN: usize = 32;
pub const FRAME_HEADER_LEN: usize = 12;

const INFO_INITIAL_PCMK: &[u8] = b"groupcall/initial-pcmk";
const INFO_RATCHET: &[u8] = b"groupcall/pcmk-ratchet";

/// What a derived key protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyUsage {
    Microphone,
    Camera,
    Control,
}

impl KeyUsage {
    fn info(self) -> &'static [u8] {
        match self {
            KeyUsage::Microphone => b"groupcall/microphone",
            KeyUsage::Camera => b"groupcall/camera",
            KeyUsage::Control => b"groupcall/control",
        }
    }

    fn tag(self) -> u8 {
        match self {
            KeyUsage::Microphone => 0,
            KeyUsage::Camera => 1,
            KeyUsage::Control => 2,
        }
    }

    pub(crate) fn index(self) -> usize {
        self.tag() as usize
    }
}

/// Key material of one participant for one epoch.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MediaKeySet {
    epoch: u32,
    ratchet_counter: u32,
    pcmk: [u8; PCMK_LEN],
    microphone: [u8; 32],
    camera: [u8; 32],
    control: [u8; 32],
}

impl fmt::Debug for MediaKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaKeySet")
            .field("epoch", &self.epoch)
            .field("ratchet_counter", &self.ratchet_counter)
            .field("pcmk", &"[REDACTED]")
            .finish()
    }
}

impl PartialEq for MediaKeySet {
    fn eq(&self, other: &Self) -> bool {
        self.epoch == other.epoch
            && self.ratchet_counter == other.ratchet_counter
            && self.pcmk == other.pcmk
    }
}

impl Eq for MediaKeySet {}

impl MediaKeySet {
    fn from_pcmk(epoch: u32, ratchet_counter: u32, pcmk: [u8; PCMK_LEN]) -> Result<Self, KeyError> {
        Ok(Self {
            epoch,
            ratchet_counter,
            microphone: hkdf::sha256_key(&pcmk, None, KeyUsage::Microphone.info())?,
            camera: hkdf::sha256_key(&pcmk, None, KeyUsage::Camera.info())?,
            control: hkdf::sha256_key(&pcmk, None, KeyUsage::Control.info())?,
            pcmk,
        })
    }

    /// Epoch-0 keys every peer can derive from the GCK and the slot alone.
    pub fn derive_initial(gck: &GroupCallKey, participant: ParticipantId) -> Result<Self, KeyError> {
        let mut info = Vec::with_capacity(INFO_INITIAL_PCMK.len() + 4);
        info.extend_from_slice(INFO_INITIAL_PCMK);
        info.extend_from_slice(&participant.value().to_be_bytes());
        let pcmk = hkdf::sha256_key(gck.as_bytes(), None, &info)?;
        Self::from_pcmk(0, 0, pcmk)
    }

    /// Fresh random keys, independent of any previous set.
    pub fn random(epoch: u32) -> Result<Self, KeyError> {
        let mut pcmk = [0u8; PCMK_LEN];
        rand::rng().fill_bytes(&mut pcmk);
        Self::from_pcmk(epoch, 0, pcmk)
    }

    /// One-way successor: the next epoch cannot be inverted to this one.
    pub fn ratcheted(&self) -> Result<Self, KeyError> {
        let epoch = self.epoch.checked_add(1).ok_or(KeyError::EpochExhausted)?;
        let ratchet_counter = self
            .ratchet_counter
            .checked_add(1)
            .ok_or(KeyError::EpochExhausted)?;
        let pcmk = hkdf::sha256_key(&self.pcmk, None, INFO_RATCHET)?;
        Self::from_pcmk(epoch, ratchet_counter, pcmk)
    }

    /// Independent keys for the next epoch.
    pub fn replaced(&self) -> Result<Self, KeyError> {
        let epoch = self.epoch.checked_add(1).ok_or(KeyError::EpochExhausted)?;
        Self::random(epoch)
    }

    pub fn from_wire(key: &MediaKey) -> Result<Self, KeyError> {
        let pcmk: [u8; PCMK_LEN] =
            key.pcmk
                .as_slice()
                .try_into()
                .map_err(|_| KeyError::InvalidLength {
                    expected: PCMK_LEN,
                    actual: key.pcmk.len(),
                })?;
        Self::from_pcmk(key.epoch, key.ratchet_counter, pcmk)
    }

    pub fn to_wire(&self) -> MediaKey {
        MediaKey {
            epoch: self.epoch,
            ratchet_counter: self.ratchet_counter,
            pcmk: self.pcmk.to_vec(),
        }
    }

    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    pub fn ratchet_counter(&self) -> u32 {
        self.ratchet_counter
    }

    pub fn key(&self, usage: KeyUsage) -> &[u8; 32] {
        match usage {
            KeyUsage::Microphone => &self.microphone,
            KeyUsage::Camera => &self.camera,
            KeyUsage::Control => &self.control,
        }
    }
}

/// Pluggable AEAD used to protect frames.
pub trait FrameCrypto: Send + Sync {
    fn seal(
        &self,
        key: &[u8; 32],
        nonce: &[u8; 12],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, GcmError>;

    fn open(
        &self,
        key: &[u8; 32],
        nonce: &[u8; 12],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, GcmError>;
}

/// Default AES-256-GCM backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct AesGcmFrameCrypto;

impl FrameCrypto for AesGcmFrameCrypto {
    fn seal(
        &self,
        key: &[u8; 32],
        nonce: &[u8; 12],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, GcmError> {
        gcm::encrypt(key, nonce, plaintext, aad)
    }

    fn open(
        &self,
        key: &[u8; 32],
        nonce: &[u8; 12],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, GcmError> {
        gcm::decrypt(key, nonce, ciphertext, aad)
    }
}

/// Parsed header of a protected frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub epoch: u32,
    pub counter: u64,
}

impl FrameHeader {
    pub fn encode(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut out = [0u8; FRAME_HEADER_LEN];
        out[..4].copy_from_slice(&self.epoch.to_be_bytes());
        out[4..].copy_from_slice(&self.counter.to_be_bytes());
        out
    }

    pub fn parse(frame: &[u8]) -> Option<(Self, &[u8])> {
        if frame.len() < FRAME_HEADER_LEN + gcm::TAG_LEN {
            return None;
        }
        let (header, body) = frame.split_at(FRAME_HEADER_LEN);
        let epoch = u32::from_be_bytes(header[..4].try_into().ok()?);
        let counter = u64::from_be_bytes(header[4..].try_into().ok()?);
        Some((Self { epoch, counter }, body))
    }

    pub(crate) fn nonce(&self) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce[..8].copy_from_slice(&self.counter.to_be_bytes());
        nonce[8..].copy_from_slice(&self.epoch.to_be_bytes());
        nonce
    }

    pub(crate) fn aad(&self, usage: KeyUsage) -> [u8; FRAME_HEADER_LEN + 1] {
        let mut aad = [0u8; FRAME_HEADER_LEN + 1];
        aad[..FRAME_HEADER_LEN].copy_from_slice(&self.encode());
        aad[FRAME_HEADER_LEN] = usage.tag();
        aad
    }
}

pub(crate) fn seal_frame(
    backend: &dyn FrameCrypto,
    keys: &MediaKeySet,
    usage: KeyUsage,
    counter: u64,
    plaintext: &[u8],
) -> Result<Vec<u8>, GcmError> {
    let header = FrameHeader {
        epoch: keys.epoch(),
        counter,
    };
    let ciphertext = backend.seal(
        keys.key(usage),
        &header.nonce(),
        &header.aad(usage),
        plaintext,
    )?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + ciphertext.len());
    frame.extend_from_slice(&header.encode());
    frame.extend_from_slice(&ciphertext);
    Ok(frame)
}

pub(crate) fn open_frame(
    backend: &dyn FrameCrypto,
    keys: &MediaKeySet,
    usage: KeyUsage,
    header: &FrameHeader,
    body: &[u8],
) -> Result<Vec<u8>, GcmError> {
    backend.open(keys.key(usage), &header.nonce(), &header.aad(usage), body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gck() -> GroupCallKey {
        GroupCallKey::from_slice(&[3u8; 32]).unwrap()
    }

    #[test]
    fn test_initial_keys_are_deterministic_per_slot() {
        let a = MediaKeySet::derive_initial(&gck(), ParticipantId(0)).unwrap();
        let b = MediaKeySet::derive_initial(&gck(), ParticipantId(0)).unwrap();
        let c = MediaKeySet::derive_initial(&gck(), ParticipantId(1)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.epoch(), 0);
    }

    #[test]
    fn test_usage_keys_are_distinct() {
        let keys = MediaKeySet::derive_initial(&gck(), ParticipantId(0)).unwrap();
        assert_ne!(keys.key(KeyUsage::Microphone), keys.key(KeyUsage::Camera));
        assert_ne!(keys.key(KeyUsage::Camera), keys.key(KeyUsage::Control));
    }

    #[test]
    fn test_ratchet_advances_epoch() {
        let keys = MediaKeySet::derive_initial(&gck(), ParticipantId(0)).unwrap();
        let next = keys.ratcheted().unwrap();
        assert_eq!(next.epoch(), 1);
        assert_eq!(next.ratchet_counter(), 1);
        assert_ne!(next.key(KeyUsage::Microphone), keys.key(KeyUsage::Microphone));
        assert_eq!(next, keys.ratcheted().unwrap());
    }

    #[test]
    fn test_replace_is_independent() {
        let keys = MediaKeySet::derive_initial(&gck(), ParticipantId(0)).unwrap();
        let replaced = keys.replaced().unwrap();
        assert_eq!(replaced.epoch(), 1);
        assert_eq!(replaced.ratchet_counter(), 0);
        assert_ne!(replaced, keys.ratcheted().unwrap());
    }

    #[test]
    fn test_epoch_exhaustion() {
        let keys = MediaKeySet::from_wire(&MediaKey {
            epoch: u32::MAX,
            ratchet_counter: 0,
            pcmk: vec![0u8; 32],
        })
        .unwrap();
        assert_eq!(keys.ratcheted().unwrap_err(), KeyError::EpochExhausted);
        assert_eq!(keys.replaced().unwrap_err(), KeyError::EpochExhausted);
    }

    #[test]
    fn test_wire_key_length_checked() {
        let err = MediaKeySet::from_wire(&MediaKey {
            epoch: 1,
            ratchet_counter: 0,
            pcmk: vec![0u8; 31],
        })
        .unwrap_err();
        assert!(matches!(err, KeyError::InvalidLength { actual: 31, .. }));
    }

    #[test]
    fn test_frame_bound_to_usage() {
        let backend = AesGcmFrameCrypto;
        let keys = MediaKeySet::derive_initial(&gck(), ParticipantId(0)).unwrap();
        let frame = seal_frame(&backend, &keys, KeyUsage::Microphone, 7, b"opus").unwrap();
        let (header, body) = FrameHeader::parse(&frame).unwrap();
        assert_eq!(header, FrameHeader { epoch: 0, counter: 7 });
        assert_eq!(
            open_frame(&backend, &keys, KeyUsage::Microphone, &header, body).unwrap(),
            b"opus"
        );
        assert!(open_frame(&backend, &keys, KeyUsage::Camera, &header, body).is_err());
    }
}
