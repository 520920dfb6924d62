//! Media key vault.
//!
//! Holds the local sender's evolving [`MediaKeySet`] and one decryptor per
//! remote participant. Keys are per direction: the local participant only
//! ever encrypts under its own keys, and decrypts each peer's frames under
//! the keys that peer announced (or the deterministic initial keys derived
//! from the GCK before any announcement arrived).
//!
//! # Epoch rules
//!
//! - The local epoch only moves forward. Ratchet and replace both advance it
//!   by exactly one.
//! - A replacement is prepared as pending keys first, so it can be announced
//!   before any frame uses it. No ratchet runs while one is pending.
//! - A frame below a decryptor's current epoch fails closed.
//! - A frame above it is tried against the closest announced set, ratcheted
//!   forward at most [`MAX_RATCHET_LOOKAHEAD`] steps. The candidate becomes
//!   current only after it authenticates a frame.
//! - A rekey announcement never lowers a participant's epoch.

use crate::crypto::gcm::GcmError;
use crate::keys::{GroupCallKey, KeyError};
use crate::media_keys::{
    AesGcmFrameCrypto, FrameCrypto, FrameHeader, KeyUsage, MediaKeySet, open_frame, seal_frame,
};
use crate::types::ParticipantId;
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Maximum number of deterministic ratchet steps tried for a future epoch.
pub const MAX_RATCHET_LOOKAHEAD: u32 = 16;
/// Maximum number of announced future key sets kept per participant.
pub const MAX_ANNOUNCED_KEYS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    Uninitialized,
    Active,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("media key vault is not initialized")]
    Uninitialized,
    #[error("media key vault is already active")]
    AlreadyActive,
    #[error("a media key replacement is already pending")]
    ReplacementPending,
    #[error("no decryptor for {0}")]
    UnknownParticipant(ParticipantId),
    #[error("{0} has left and its keys were purged")]
    RetiredParticipant(ParticipantId),
    #[error("stale epoch {epoch} from {participant}, current is {current}")]
    StaleEpoch {
        participant: ParticipantId,
        epoch: u32,
        current: u32,
    },
    #[error("epoch {epoch} from {participant} is too far ahead of {current}")]
    EpochTooFarAhead {
        participant: ParticipantId,
        epoch: u32,
        current: u32,
    },
    #[error("{participant} announced conflicting keys for epoch {epoch}")]
    ConflictingRekey {
        participant: ParticipantId,
        epoch: u32,
    },
    #[error("malformed frame")]
    MalformedFrame,
    #[error("frame from {participant} failed to authenticate under current epoch {epoch}")]
    DecryptFailedUnderCurrentEpoch {
        participant: ParticipantId,
        epoch: u32,
    },
    #[error("frame from {participant} failed to authenticate under candidate epoch {epoch}")]
    DecryptFailed {
        participant: ParticipantId,
        epoch: u32,
    },
    #[error("frame encryption failed: {0}")]
    Encrypt(GcmError),
    #[error(transparent)]
    Key(#[from] KeyError),
}

impl VaultError {
    /// Errors that mean the key state itself can no longer be trusted.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            VaultError::DecryptFailedUnderCurrentEpoch { .. }
                | VaultError::Encrypt(_)
                | VaultError::Key(KeyError::EpochExhausted)
                | VaultError::Key(KeyError::CounterExhausted)
        )
    }
}

/// Result of applying a peer's key announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RekeyOutcome {
    /// Stored; becomes current once a frame authenticates under it.
    Announced { epoch: u32 },
    /// The same keys were already known.
    Duplicate { epoch: u32 },
}

struct LocalEncryptor {
    participant: ParticipantId,
    keys: MediaKeySet,
    pending: Option<MediaKeySet>,
    counters: [u64; 3],
}

impl LocalEncryptor {
    fn apply(&mut self, keys: MediaKeySet) {
        self.keys = keys;
        self.counters = [0; 3];
    }
}

struct Decryptor {
    current: MediaKeySet,
    announced: BTreeMap<u32, MediaKeySet>,
}

impl Decryptor {
    fn candidate(&self, epoch: u32) -> Option<MediaKeySet> {
        let base = self
            .announced
            .range(..=epoch)
            .next_back()
            .map(|(_, keys)| keys)
            .unwrap_or(&self.current);
        let steps = epoch - base.epoch();
        if steps > MAX_RATCHET_LOOKAHEAD {
            return None;
        }
        let mut keys = base.clone();
        for _ in 0..steps {
            keys = keys.ratcheted().ok()?;
        }
        Some(keys)
    }

    fn adopt(&mut self, keys: MediaKeySet) {
        let epoch = keys.epoch();
        self.current = keys;
        self.announced.retain(|e, _| *e > epoch);
    }
}

/// Owner of all media key material of one call.
pub struct MediaKeyVault {
    backend: Arc<dyn FrameCrypto>,
    local: Option<LocalEncryptor>,
    decryptors: HashMap<ParticipantId, Decryptor>,
    retired: HashSet<ParticipantId>,
    decryptors_removed: u64,
}

impl Default for MediaKeyVault {
    fn default() -> Self {
        Self::new(Arc::new(AesGcmFrameCrypto))
    }
}

impl std::fmt::Debug for MediaKeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaKeyVault")
            .field("state", &self.state())
            .field("local_epoch", &self.local_epoch())
            .field("decryptors", &self.decryptors.len())
            .field("retired", &self.retired.len())
            .finish()
    }
}

impl MediaKeyVault {
    pub fn new(backend: Arc<dyn FrameCrypto>) -> Self {
        Self {
            backend,
            local: None,
            decryptors: HashMap::new(),
            retired: HashSet::new(),
            decryptors_removed: 0,
        }
    }

    pub fn state(&self) -> VaultState {
        if self.local.is_some() {
            VaultState::Active
        } else {
            VaultState::Uninitialized
        }
    }

    /// Installs the local sender's initial keys once the SFU assigned a slot.
    pub fn activate(
        &mut self,
        gck: &GroupCallKey,
        local: ParticipantId,
    ) -> Result<u32, VaultError> {
        if self.local.is_some() {
            return Err(VaultError::AlreadyActive);
        }
        let keys = MediaKeySet::derive_initial(gck, local)?;
        let epoch = keys.epoch();
        self.local = Some(LocalEncryptor {
            participant: local,
            keys,
            pending: None,
            counters: [0; 3],
        });
        debug!("Media key vault active for local participant {local}");
        Ok(epoch)
    }

    /// Derives and installs the initial decryptor for a newly added participant.
    ///
    /// Any previous record for the same slot is discarded.
    pub fn derive_initial_keys(
        &mut self,
        gck: &GroupCallKey,
        participant: ParticipantId,
    ) -> Result<&MediaKeySet, VaultError> {
        let keys = MediaKeySet::derive_initial(gck, participant)?;
        self.retired.remove(&participant);
        let decryptor = Decryptor {
            current: keys,
            announced: BTreeMap::new(),
        };
        self.decryptors.insert(participant, decryptor);
        match self.decryptors.get(&participant) {
            Some(decryptor) => Ok(&decryptor.current),
            None => Err(VaultError::UnknownParticipant(participant)),
        }
    }

    /// Advances the local sender keys by one deterministic ratchet step.
    ///
    /// Refused while a replacement is pending, since both would claim the
    /// next epoch.
    pub fn ratchet_and_apply_new_keys(&mut self) -> Result<u32, VaultError> {
        let local = self.local.as_mut().ok_or(VaultError::Uninitialized)?;
        if local.pending.is_some() {
            return Err(VaultError::ReplacementPending);
        }
        let next = local.keys.ratcheted()?;
        let epoch = next.epoch();
        local.apply(next);
        debug!("Ratcheted local media keys to epoch {epoch}");
        Ok(epoch)
    }

    /// Replaces the local sender keys with independent random ones.
    ///
    /// Returns the new set so the caller can distribute it in the same turn.
    pub fn replace_and_apply_new_media_keys(&mut self) -> Result<MediaKeySet, VaultError> {
        let next = self.prepare_new_media_keys()?;
        self.apply_pending_media_keys()?;
        Ok(next)
    }

    /// Creates independent random keys for the next epoch without using them.
    ///
    /// The caller announces the returned set, then activates it with
    /// [`Self::apply_pending_media_keys`].
    pub fn prepare_new_media_keys(&mut self) -> Result<MediaKeySet, VaultError> {
        let local = self.local.as_mut().ok_or(VaultError::Uninitialized)?;
        if local.pending.is_some() {
            return Err(VaultError::ReplacementPending);
        }
        let next = local.keys.replaced()?;
        local.pending = Some(next.clone());
        debug!("Prepared pending media keys for epoch {}", next.epoch());
        Ok(next)
    }

    /// Switches encryption to the pending keys, if any. Returns the new epoch.
    pub fn apply_pending_media_keys(&mut self) -> Result<Option<u32>, VaultError> {
        let local = self.local.as_mut().ok_or(VaultError::Uninitialized)?;
        let Some(next) = local.pending.take() else {
            return Ok(None);
        };
        let epoch = next.epoch();
        local.apply(next);
        debug!("Replaced local media keys, epoch {epoch}");
        Ok(Some(epoch))
    }

    /// Keys announced but not yet used for encryption.
    pub fn pending_keys(&self) -> Option<&MediaKeySet> {
        self.local.as_ref().and_then(|l| l.pending.as_ref())
    }

    /// Applies a key update announced by `from` for its own media.
    pub fn rekey_received(
        &mut self,
        from: ParticipantId,
        keys: MediaKeySet,
    ) -> Result<RekeyOutcome, VaultError> {
        if self.local.as_ref().map(|l| l.participant) == Some(from) {
            return Err(VaultError::UnknownParticipant(from));
        }
        let decryptor = self.decryptor_mut(from)?;
        let epoch = keys.epoch();
        let current = decryptor.current.epoch();

        if epoch < current {
            return Err(VaultError::StaleEpoch {
                participant: from,
                epoch,
                current,
            });
        }
        if epoch == current {
            return if decryptor.current == keys {
                Ok(RekeyOutcome::Duplicate { epoch })
            } else {
                Err(VaultError::ConflictingRekey {
                    participant: from,
                    epoch,
                })
            };
        }
        if let Some(existing) = decryptor.announced.get(&epoch) {
            return if *existing == keys {
                Ok(RekeyOutcome::Duplicate { epoch })
            } else {
                Err(VaultError::ConflictingRekey {
                    participant: from,
                    epoch,
                })
            };
        }

        decryptor.announced.insert(epoch, keys);
        while decryptor.announced.len() > MAX_ANNOUNCED_KEYS {
            decryptor.announced.pop_first();
        }
        debug!("{from} announced media keys for epoch {epoch}");
        Ok(RekeyOutcome::Announced { epoch })
    }

    /// Purges a departed participant's keys. Returns whether a decryptor existed.
    pub fn remove_decryptor(&mut self, participant: ParticipantId) -> bool {
        self.retired.insert(participant);
        let removed = self.decryptors.remove(&participant).is_some();
        if removed {
            self.decryptors_removed += 1;
            debug!("Removed decryptor for {participant}");
        }
        removed
    }

    pub fn has_decryptor(&self, participant: ParticipantId) -> bool {
        self.decryptors.contains_key(&participant)
    }

    pub fn decryptor_epoch(&self, participant: ParticipantId) -> Option<u32> {
        self.decryptors.get(&participant).map(|d| d.current.epoch())
    }

    /// Total number of decryptors purged so far.
    pub fn decryptors_removed(&self) -> u64 {
        self.decryptors_removed
    }

    pub fn local_epoch(&self) -> Option<u32> {
        self.local.as_ref().map(|l| l.keys.epoch())
    }

    pub fn local_keys(&self) -> Result<&MediaKeySet, VaultError> {
        self.local
            .as_ref()
            .map(|l| &l.keys)
            .ok_or(VaultError::Uninitialized)
    }

    /// Encrypts one local frame under the current local epoch.
    pub fn encrypt_frame(&mut self, usage: KeyUsage, plaintext: &[u8]) -> Result<Vec<u8>, VaultError> {
        let local = self.local.as_mut().ok_or(VaultError::Uninitialized)?;
        let slot = &mut local.counters[usage.index()];
        let counter = *slot;
        *slot = counter.checked_add(1).ok_or(KeyError::CounterExhausted)?;
        seal_frame(self.backend.as_ref(), &local.keys, usage, counter, plaintext)
            .map_err(VaultError::Encrypt)
    }

    /// Decrypts one frame sent by `from`.
    pub fn decrypt_frame(
        &mut self,
        from: ParticipantId,
        usage: KeyUsage,
        frame: &[u8],
    ) -> Result<Vec<u8>, VaultError> {
        let (header, body) = FrameHeader::parse(frame).ok_or(VaultError::MalformedFrame)?;
        let backend = Arc::clone(&self.backend);
        let decryptor = self.decryptor_mut(from)?;
        let current = decryptor.current.epoch();

        if header.epoch < current {
            return Err(VaultError::StaleEpoch {
                participant: from,
                epoch: header.epoch,
                current,
            });
        }

        if header.epoch == current {
            return open_frame(backend.as_ref(), &decryptor.current, usage, &header, body).map_err(
                |_| VaultError::DecryptFailedUnderCurrentEpoch {
                    participant: from,
                    epoch: current,
                },
            );
        }

        let candidate = decryptor
            .candidate(header.epoch)
            .ok_or(VaultError::EpochTooFarAhead {
                participant: from,
                epoch: header.epoch,
                current,
            })?;
        match open_frame(backend.as_ref(), &candidate, usage, &header, body) {
            Ok(plaintext) => {
                debug!("{from} moved to media epoch {}", header.epoch);
                decryptor.adopt(candidate);
                Ok(plaintext)
            }
            Err(_) => {
                warn!("Frame from {from} failed under candidate epoch {}", header.epoch);
                Err(VaultError::DecryptFailed {
                    participant: from,
                    epoch: header.epoch,
                })
            }
        }
    }

    /// Drops all key material and returns to `Uninitialized`.
    pub fn clear(&mut self) {
        self.local = None;
        self.decryptors.clear();
        self.retired.clear();
    }

    fn decryptor_mut(&mut self, participant: ParticipantId) -> Result<&mut Decryptor, VaultError> {
        if self.retired.contains(&participant) {
            return Err(VaultError::RetiredParticipant(participant));
        }
        self.decryptors
            .get_mut(&participant)
            .ok_or(VaultError::UnknownParticipant(participant))
    }
}
