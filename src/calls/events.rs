//! Events a call reports to its owner.

use gccore::{CallId, ParticipantId};
use gcproto::groupcall::CaptureDevice;
use serde::Serialize;

use super::state::{CallState, EndReason};

/// Notification emitted by a running call, in the order things happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallEvent {
    StateChanged {
        call_id: CallId,
        state: CallState,
    },
    /// The SFU announced a participant; the handshake has not completed yet.
    ParticipantAdded {
        participant: ParticipantId,
    },
    ParticipantJoined {
        participant: ParticipantId,
        identity: String,
        nickname: String,
    },
    ParticipantRemoved {
        participant: ParticipantId,
    },
    RemoteCaptureChanged {
        participant: ParticipantId,
        #[serde(serialize_with = "serialize_device")]
        device: CaptureDevice,
        on: bool,
    },
    LocalCaptureChanged {
        #[serde(serialize_with = "serialize_device")]
        device: CaptureDevice,
        on: bool,
    },
    RemoteHold {
        participant: ParticipantId,
    },
    /// Local media is now encrypted under fresh keys.
    MediaKeysReplaced {
        epoch: u32,
    },
    /// A peek returned the leader's call state.
    CallStateRefreshed {
        participants: usize,
    },
    Ended {
        call_id: CallId,
        reason: EndReason,
    },
}

fn serialize_device<S: serde::Serializer>(
    device: &CaptureDevice,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(match device {
        CaptureDevice::Microphone => "microphone",
        CaptureDevice::Camera => "camera",
    })
}
