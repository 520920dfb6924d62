//! Call-related error types.

use gccore::{
    CallId, HeaderExtensionError, KeyError, MidError, ParticipantId, StartMessageError, VaultError,
};
use thiserror::Error;

use super::peer_connection::PeerConnectionError;
use super::sfu::SfuError;
use super::state::InvalidTransition;

/// Coarse failure classes the call actor reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// No MIDs left for the assigned slot, or the SFU reports the call full.
    Capacity,
    /// Malformed or unexpected input from the SFU or a participant.
    Protocol,
    Connectivity,
    Credential,
    /// The media key vault detected a state that must never happen.
    CryptoInvariant,
    Internal,
}

#[derive(Debug, Error)]
pub enum CallError {
    #[error("participant slot exhausted: {0}")]
    Capacity(#[from] MidError),

    #[error("invalid header extension announcement: {0}")]
    HeaderExtension(#[from] HeaderExtensionError),

    #[error("protocol violation by {}: {reason}", source_label(.participant))]
    Protocol {
        participant: Option<ParticipantId>,
        reason: String,
    },

    #[error("malformed message: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("peer connection: {0}")]
    PeerConnection(#[from] PeerConnectionError),

    #[error("data channel closed")]
    DataChannelClosed,

    #[error("ICE connection failed")]
    IceFailed,

    #[error("timed out while {0}")]
    Timeout(&'static str),

    #[error("SFU: {0}")]
    Sfu(#[from] SfuError),

    #[error("media key vault: {0}")]
    Vault(#[from] VaultError),

    #[error("key error: {0}")]
    Key(#[from] KeyError),

    #[error("invalid call start: {0}")]
    Start(#[from] StartMessageError),

    #[error("invalid call state transition: {0}")]
    InvalidTransition(#[from] InvalidTransition),

    #[error("call actor is no longer running")]
    ActorGone,

    #[error("call {0} is already active")]
    AlreadyActive(CallId),

    #[error("call {0} is not known")]
    UnknownCall(CallId),
}

fn source_label(participant: &Option<ParticipantId>) -> String {
    match participant {
        Some(p) => p.to_string(),
        None => "SFU".to_string(),
    }
}

impl CallError {
    pub fn protocol(participant: Option<ParticipantId>, reason: impl Into<String>) -> Self {
        Self::Protocol {
            participant,
            reason: reason.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Capacity(_) => ErrorClass::Capacity,
            Self::HeaderExtension(_) | Self::Protocol { .. } | Self::Decode(_) => {
                ErrorClass::Protocol
            }
            Self::Start(_) => ErrorClass::Protocol,
            Self::PeerConnection(_)
            | Self::DataChannelClosed
            | Self::IceFailed
            | Self::Timeout(_) => ErrorClass::Connectivity,
            Self::Sfu(e) => e.class(),
            Self::Vault(e) if e.is_invariant_violation() => ErrorClass::CryptoInvariant,
            Self::Vault(
                VaultError::Uninitialized
                | VaultError::AlreadyActive
                | VaultError::ReplacementPending,
            ) => ErrorClass::Internal,
            Self::Vault(_) => ErrorClass::Protocol,
            Self::Key(KeyError::EpochExhausted | KeyError::CounterExhausted) => {
                ErrorClass::CryptoInvariant
            }
            Self::Key(_) => ErrorClass::Protocol,
            Self::InvalidTransition(_)
            | Self::ActorGone
            | Self::AlreadyActive(_)
            | Self::UnknownCall(_) => ErrorClass::Internal,
        }
    }

    /// Whether the error ends the call. Isolated protocol errors do not.
    pub fn is_fatal(&self) -> bool {
        self.class() != ErrorClass::Protocol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        let capacity = CallError::from(MidError::CapacityExceeded {
            participant: ParticipantId(u32::MAX),
            capacity: 8,
        });
        assert_eq!(capacity.class(), ErrorClass::Capacity);
        assert!(capacity.is_fatal());

        let protocol = CallError::protocol(Some(ParticipantId(3)), "unexpected hello");
        assert_eq!(protocol.class(), ErrorClass::Protocol);
        assert!(!protocol.is_fatal());
        assert_eq!(
            protocol.to_string(),
            "protocol violation by P3: unexpected hello"
        );

        assert_eq!(
            CallError::Sfu(SfuError::Unauthorized).class(),
            ErrorClass::Credential
        );
        assert_eq!(CallError::IceFailed.class(), ErrorClass::Connectivity);
        assert_eq!(
            CallError::Key(KeyError::EpochExhausted).class(),
            ErrorClass::CryptoInvariant
        );
    }

    #[test]
    fn test_vault_errors_split_by_severity() {
        let stale = CallError::Vault(VaultError::StaleEpoch {
            participant: ParticipantId(1),
            epoch: 0,
            current: 2,
        });
        assert_eq!(stale.class(), ErrorClass::Protocol);

        let broken = CallError::Vault(VaultError::DecryptFailedUnderCurrentEpoch {
            participant: ParticipantId(1),
            epoch: 2,
        });
        assert_eq!(broken.class(), ErrorClass::CryptoInvariant);
        assert!(broken.is_fatal());
    }
}
