//! Deterministic SDP media identifiers per participant slot.
//!
//! Every participant slot owns a block of eight consecutive symbols of the
//! MID alphabet. The alphabet is the decimal rendering of the 32-bit
//! unsigned integers, so the identifiers stay valid on SFUs that store MIDs
//! as `u32`. The block layout is fixed on every peer:
//!
//! | offset | line |
//! |--------|------|
//! | 0 | microphone |
//! | 1 | camera |
//! | 2..=6 | reserved (simulcast rids) |
//! | 7 | data |

use crate::types::{MediaKind, ParticipantId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Number of MIDs owned by one participant slot.
pub const MIDS_PER_PARTICIPANT: u64 = 8;
/// Number of symbols in the MID alphabet.
pub const MID_ALPHABET_LEN: u64 = 1 << 32;
/// Number of participant slots the alphabet can hold.
pub const MAX_PARTICIPANT_SLOTS: u64 = MID_ALPHABET_LEN / MIDS_PER_PARTICIPANT;
/// Number of reserved slots between camera and data.
pub const RESERVED_SLOTS: u8 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MidError {
    #[error("participant slot {participant} exceeds MID capacity of {capacity} slots")]
    CapacityExceeded {
        participant: ParticipantId,
        capacity: u64,
    },
}

/// One SDP `a=mid` value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Mid(String);

impl Mid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Mid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Position of a MID inside its participant block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaLine {
    Microphone,
    Camera,
    Reserved(u8),
    Data,
}

impl MediaLine {
    fn offset(self) -> u64 {
        match self {
            MediaLine::Microphone => 0,
            MediaLine::Camera => 1,
            MediaLine::Reserved(index) => 2 + u64::from(index),
            MediaLine::Data => 7,
        }
    }

    fn from_offset(offset: u64) -> Self {
        match offset {
            0 => MediaLine::Microphone,
            1 => MediaLine::Camera,
            7 => MediaLine::Data,
            n => MediaLine::Reserved((n - 2) as u8),
        }
    }
}

/// The MID block of one participant slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mids {
    participant: ParticipantId,
    base: u64,
}

impl Mids {
    /// Computes the MID block for `participant`.
    ///
    /// Fails with [`MidError::CapacityExceeded`] when the block would run past
    /// the end of the alphabet.
    pub fn for_participant(participant: ParticipantId) -> Result<Self, MidError> {
        let base = u64::from(participant.value()) * MIDS_PER_PARTICIPANT;
        if base + MIDS_PER_PARTICIPANT > MID_ALPHABET_LEN {
            return Err(MidError::CapacityExceeded {
                participant,
                capacity: MAX_PARTICIPANT_SLOTS,
            });
        }
        Ok(Self { participant, base })
    }

    /// Maps a MID back to its owning slot and line.
    pub fn resolve(mid: &str) -> Option<(ParticipantId, MediaLine)> {
        // Reject leading zeros so the mapping stays a bijection.
        if mid.is_empty() || (mid.len() > 1 && mid.starts_with('0')) {
            return None;
        }
        let value: u32 = mid.parse().ok()?;
        let value = u64::from(value);
        let participant = ParticipantId((value / MIDS_PER_PARTICIPANT) as u32);
        Some((
            participant,
            MediaLine::from_offset(value % MIDS_PER_PARTICIPANT),
        ))
    }

    pub fn participant(&self) -> ParticipantId {
        self.participant
    }

    pub fn line(&self, line: MediaLine) -> Mid {
        Mid((self.base + line.offset()).to_string())
    }

    pub fn microphone(&self) -> Mid {
        self.line(MediaLine::Microphone)
    }

    pub fn camera(&self) -> Mid {
        self.line(MediaLine::Camera)
    }

    pub fn data(&self) -> Mid {
        self.line(MediaLine::Data)
    }

    /// Reserved slot by position, `None` past the fifth slot.
    pub fn reserved(&self, index: u8) -> Option<Mid> {
        (index < RESERVED_SLOTS).then(|| self.line(MediaLine::Reserved(index)))
    }

    /// All eight MIDs in block order.
    pub fn all(&self) -> Vec<Mid> {
        (0..MIDS_PER_PARTICIPANT)
            .map(|offset| self.line(MediaLine::from_offset(offset)))
            .collect()
    }

    /// Audio/video primary lines only. Reserved slots are positional.
    pub fn to_media_kind_map(&self) -> HashMap<MediaKind, Mid> {
        HashMap::from([
            (MediaKind::Audio, self.microphone()),
            (MediaKind::Video, self.camera()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_first_slot_is_first_eight_symbols() {
        let mids = Mids::for_participant(ParticipantId(0)).unwrap();
        let expected: Vec<String> = (0..8).map(|i| i.to_string()).collect();
        let actual: Vec<String> = mids.all().iter().map(|m| m.to_string()).collect();
        assert_eq!(actual, expected);
        assert_eq!(mids.microphone().as_str(), "0");
        assert_eq!(mids.camera().as_str(), "1");
        assert_eq!(mids.data().as_str(), "7");
    }

    #[test]
    fn test_slots_never_share_mids() {
        let mut seen = HashSet::new();
        for p in (0..200).chain([MAX_PARTICIPANT_SLOTS as u32 - 1]) {
            let mids = Mids::for_participant(ParticipantId(p)).unwrap();
            for mid in mids.all() {
                assert!(seen.insert(mid), "duplicate MID for slot {p}");
            }
        }
    }

    #[test]
    fn test_mids_are_deterministic() {
        let a = Mids::for_participant(ParticipantId(42)).unwrap();
        let b = Mids::for_participant(ParticipantId(42)).unwrap();
        assert_eq!(a.all(), b.all());
    }

    #[test]
    fn test_capacity_exceeded() {
        let p = ParticipantId(MAX_PARTICIPANT_SLOTS as u32);
        assert_eq!(
            Mids::for_participant(p),
            Err(MidError::CapacityExceeded {
                participant: p,
                capacity: MAX_PARTICIPANT_SLOTS,
            })
        );
        assert!(Mids::for_participant(ParticipantId(u32::MAX)).is_err());
    }

    #[test]
    fn test_last_slot_fits_in_u32() {
        let mids = Mids::for_participant(ParticipantId(MAX_PARTICIPANT_SLOTS as u32 - 1)).unwrap();
        assert_eq!(mids.data().as_str(), u32::MAX.to_string());
    }

    #[test]
    fn test_reserved_slots_are_positional() {
        let mids = Mids::for_participant(ParticipantId(1)).unwrap();
        assert_eq!(mids.reserved(0).unwrap().as_str(), "10");
        assert_eq!(mids.reserved(4).unwrap().as_str(), "14");
        assert!(mids.reserved(5).is_none());
    }

    #[test]
    fn test_media_kind_map_excludes_reserved() {
        let map = Mids::for_participant(ParticipantId(2))
            .unwrap()
            .to_media_kind_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&MediaKind::Audio].as_str(), "16");
        assert_eq!(map[&MediaKind::Video].as_str(), "17");
    }

    #[test]
    fn test_resolve_round_trips_block_positions() {
        assert_eq!(
            Mids::resolve("17"),
            Some((ParticipantId(2), MediaLine::Camera))
        );
        assert_eq!(
            Mids::resolve("12"),
            Some((ParticipantId(1), MediaLine::Reserved(2)))
        );
        assert_eq!(Mids::resolve("007"), None);
        assert_eq!(Mids::resolve("abc"), None);
        assert_eq!(Mids::resolve("4294967296"), None);
    }
}
