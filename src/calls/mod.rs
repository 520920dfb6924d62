//! End-to-end encrypted group calls routed through an SFU.
//!
//! # Architecture
//!
//! - [`GroupCallRegistry`]: remembers announced calls and peeks them at the SFU
//! - [`actor::spawn`]: runs one call on its own task, driven by a [`CallHandle`]
//! - [`CallContext`]: the call's participants, keys and media lines
//! - [`RemoteParticipant`]: per-participant handshake and capture state
//! - [`PeerConnectionAdapter`]: the engine's view of the platform WebRTC stack
//! - [`SfuClient`]: join and peek requests against the SFU
//!
//! Media keys live in the frame-crypto vault from `gccore`; every key change
//! goes through [`CallContext`] so the vault and the participant map stay in
//! step.

pub mod actor;
mod context;
mod error;
mod events;
mod participant;
pub mod peer_connection;
mod registry;
pub mod session_description;
pub mod sfu;
mod state;

pub use actor::{
    CallDependencies, CallHandle, CallParams, CallSubscription, DEFAULT_CAMERA_SUBSCRIPTION,
    SpawnedCall,
};
pub use context::{
    CallContext, CallContextParams, DiscardReason, MembershipChange, MessageResponseAction,
};
pub use error::{CallError, ErrorClass};
pub use events::CallEvent;
pub use participant::{
    CameraSubscription, HandshakeState, LocalIdentity, ParticipantState, RemoteParticipant,
};
pub use peer_connection::{
    AdapterEvent, IceCandidate, IceConnectionState, PeerConnection, PeerConnectionAdapter,
    PeerConnectionConfig, PeerConnectionError, PeerConnectionEvent, PeerConnectionFactory,
};
pub use registry::{CreatedOrJoined, GroupCallRegistry, KnownCall, RegistryEvent, RemovalReason};
pub use sfu::{CredentialProvider, SfuClient, SfuError, SfuToken};
pub use state::{CallState, CallStateMachine, CallTransition, EndReason, InvalidTransition};
