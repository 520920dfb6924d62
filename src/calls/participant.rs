//! Per-participant record and the participant-to-participant handshake.
//!
//! ```text
//!  joined before me                         joined after me
//!  ───────────────                          ───────────────
//!  I send Hello                             AwaitNewParticipantHello
//!  AwaitExistingParticipantHello              │ their Hello
//!    │ their Hello                            ▼ send Hello + Auth
//!    ▼                                      AwaitAuth
//!  AwaitAuth                                  │ their Auth
//!    │ their Auth                             ▼
//!    ▼ send Auth                            Done
//!  Done
//! ```
//!
//! Hellos are sealed with the call's hello key; everything after is sealed
//! with the pairwise session. A record is `Pending` until the handshake is
//! done, then `Joined`, then `Left` once the SFU reports the departure.

use gccore::gcproto::groupcall::{
    Auth, AuthEnvelope, CaptureDevice, CaptureState, Hello, HelloEnvelope, HoldState, MediaKey,
    P2pEnvelope, p2p_envelope,
};
use gccore::p2p::{self, LocalParticipantKeys, PairwiseSession};
use gccore::vault::RekeyOutcome;
use gccore::{GroupCallKeys, MediaKeySet, MediaKeyVault, MidError, Mids, ParticipantId};
use log::{debug, info};
use prost::Message;

use super::error::CallError;

/// Name the local user is announced with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub identity: String,
    pub nickname: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// They were in the call before me; my Hello is out.
    AwaitExistingParticipantHello,
    /// They joined after me; they speak first.
    AwaitNewParticipantHello,
    AwaitAuth,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantState {
    Pending,
    Joined,
    Left,
}

/// Requested receive quality for a remote camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraSubscription {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// What the caller must do after a record consumed a message.
#[derive(Debug, Clone, PartialEq)]
pub enum ParticipantOutput {
    None,
    /// Payloads to relay to this participant, in order.
    Send(Vec<Vec<u8>>),
    HandshakeCompleted { send: Vec<Vec<u8>> },
    CaptureStateChanged { device: CaptureDevice, on: bool },
    Rekeyed(RekeyOutcome),
    Hold,
}

/// Everything a record needs from its call to run the handshake.
pub struct HandshakeContext<'a> {
    pub keys: &'a GroupCallKeys,
    pub local: &'a LocalParticipantKeys,
    pub identity: &'a LocalIdentity,
    pub vault: &'a mut MediaKeyVault,
}

#[derive(Debug)]
pub struct RemoteParticipant {
    id: ParticipantId,
    mids: Mids,
    existing: bool,
    state: ParticipantState,
    handshake: HandshakeState,
    session: Option<PairwiseSession>,
    remote_pck: Vec<u8>,
    remote_pcck: Vec<u8>,
    identity: Option<String>,
    nickname: Option<String>,
    microphone_on: bool,
    camera_on: bool,
    camera_subscription: Option<CameraSubscription>,
    protocol_errors: u32,
    /// Newest local epoch our Auth carried.
    auth_epoch: Option<u32>,
}

impl RemoteParticipant {
    /// Creates a pending record. `existing` marks participants that were in
    /// the call before the local one joined.
    pub fn new(id: ParticipantId, existing: bool) -> Result<Self, MidError> {
        let mids = Mids::for_participant(id)?;
        Ok(Self {
            id,
            mids,
            existing,
            state: ParticipantState::Pending,
            handshake: if existing {
                HandshakeState::AwaitExistingParticipantHello
            } else {
                HandshakeState::AwaitNewParticipantHello
            },
            session: None,
            remote_pck: Vec::new(),
            remote_pcck: Vec::new(),
            identity: None,
            nickname: None,
            microphone_on: false,
            camera_on: false,
            camera_subscription: None,
            protocol_errors: 0,
            auth_epoch: None,
        })
    }

    pub fn id(&self) -> ParticipantId {
        self.id
    }

    pub fn mids(&self) -> &Mids {
        &self.mids
    }

    pub fn state(&self) -> ParticipantState {
        self.state
    }

    pub fn handshake_state(&self) -> HandshakeState {
        self.handshake
    }

    pub fn is_joined(&self) -> bool {
        self.state == ParticipantState::Joined
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    pub fn microphone_on(&self) -> bool {
        self.microphone_on
    }

    pub fn camera_on(&self) -> bool {
        self.camera_on
    }

    pub fn camera_subscription(&self) -> Option<CameraSubscription> {
        self.camera_subscription
    }

    pub fn set_camera_subscription(&mut self, subscription: Option<CameraSubscription>) {
        self.camera_subscription = subscription;
    }

    /// Counts one protocol violation and returns the running total.
    pub fn record_protocol_error(&mut self) -> u32 {
        self.protocol_errors += 1;
        self.protocol_errors
    }

    pub fn mark_left(&mut self) {
        self.state = ParticipantState::Left;
        self.session = None;
    }

    /// Our Hello, sent when this participant was in the call before us.
    pub fn initial_hello(&self, ctx: &HandshakeContext<'_>) -> Result<Option<Vec<u8>>, CallError> {
        if self.handshake != HandshakeState::AwaitExistingParticipantHello {
            return Ok(None);
        }
        Ok(Some(seal_hello(ctx)?))
    }

    /// Consumes one relayed payload from this participant.
    pub fn handle(
        &mut self,
        data: &[u8],
        ctx: &mut HandshakeContext<'_>,
    ) -> Result<ParticipantOutput, CallError> {
        match (self.state, self.handshake) {
            (ParticipantState::Left, _) => Err(self.violation("message after departure")),
            (_, HandshakeState::AwaitNewParticipantHello) => {
                self.accept_hello(data, ctx)?;
                let hello = seal_hello(ctx)?;
                let auth = self.seal_auth(ctx)?;
                self.handshake = HandshakeState::AwaitAuth;
                Ok(ParticipantOutput::Send(vec![hello, auth]))
            }
            (_, HandshakeState::AwaitExistingParticipantHello) => {
                self.accept_hello(data, ctx)?;
                self.handshake = HandshakeState::AwaitAuth;
                Ok(ParticipantOutput::None)
            }
            (_, HandshakeState::AwaitAuth) => {
                self.accept_auth(data, ctx)?;
                // Only the later joiner still owes its Auth here.
                let send = if self.existing {
                    vec![self.seal_auth(ctx)?]
                } else {
                    Vec::new()
                };
                self.handshake = HandshakeState::Done;
                self.state = ParticipantState::Joined;
                info!(
                    target: "GroupCall/Handshake",
                    "Handshake with {} ({}) completed",
                    self.id,
                    self.identity.as_deref().unwrap_or("?")
                );
                Ok(ParticipantOutput::HandshakeCompleted { send })
            }
            (_, HandshakeState::Done) => self.handle_post_handshake(data, ctx),
        }
    }

    fn violation(&self, reason: impl Into<String>) -> CallError {
        CallError::protocol(Some(self.id), reason)
    }

    fn session(&mut self) -> Result<&mut PairwiseSession, CallError> {
        let id = self.id;
        self.session
            .as_mut()
            .ok_or_else(|| CallError::protocol(Some(id), "no pairwise session"))
    }

    fn accept_hello(&mut self, data: &[u8], ctx: &HandshakeContext<'_>) -> Result<(), CallError> {
        let plaintext = ctx
            .keys
            .open_hello(data)
            .map_err(|e| self.violation(format!("undecryptable hello: {e}")))?;
        let hello = HelloEnvelope::decode(plaintext.as_slice())?
            .hello
            .ok_or_else(|| self.violation("hello envelope without hello"))?;
        if hello.identity.is_empty() {
            return Err(self.violation("hello without identity"));
        }
        let session = ctx
            .local
            .establish(&hello.pck, &hello.pcck, ctx.keys.gckh())
            .map_err(|e| self.violation(format!("unusable hello keys: {e}")))?;
        debug!(target: "GroupCall/Handshake", "Hello from {} as {}", self.id, hello.identity);
        self.session = Some(session);
        self.remote_pck = hello.pck;
        self.remote_pcck = hello.pcck;
        self.identity = Some(hello.identity);
        self.nickname = Some(hello.nickname);
        Ok(())
    }

    /// Carries the current local keys and any pending replacement.
    fn seal_auth(&mut self, ctx: &HandshakeContext<'_>) -> Result<Vec<u8>, CallError> {
        let mut media_keys = vec![ctx.vault.local_keys()?.to_wire()];
        media_keys.extend(ctx.vault.pending_keys().map(MediaKeySet::to_wire));
        let auth_epoch = media_keys.iter().map(|key| key.epoch).max();
        let envelope = AuthEnvelope {
            padding: p2p::padding(),
            auth: Some(Auth {
                pck: self.remote_pck.clone(),
                pcck: self.remote_pcck.clone(),
                media_keys,
            }),
        };
        let sealed = self.session()?.seal(&envelope.encode_to_vec())?;
        self.auth_epoch = auth_epoch;
        Ok(sealed)
    }

    fn accept_auth(&mut self, data: &[u8], ctx: &mut HandshakeContext<'_>) -> Result<(), CallError> {
        let plaintext = self
            .session()?
            .open(data)
            .map_err(|e| self.violation(format!("undecryptable auth: {e}")))?;
        let auth = AuthEnvelope::decode(plaintext.as_slice())?
            .auth
            .ok_or_else(|| self.violation("auth envelope without auth"))?;
        if auth.pck != ctx.local.pck().as_slice() || auth.pcck != ctx.local.pcck().as_slice() {
            return Err(self.violation("auth does not echo our handshake keys"));
        }
        if auth.media_keys.is_empty() {
            return Err(self.violation("auth without media keys"));
        }
        for key in &auth.media_keys {
            self.apply_media_key(key, ctx)?;
        }
        Ok(())
    }

    fn apply_media_key(
        &self,
        key: &MediaKey,
        ctx: &mut HandshakeContext<'_>,
    ) -> Result<RekeyOutcome, CallError> {
        let keys = MediaKeySet::from_wire(key).map_err(|e| self.violation(e.to_string()))?;
        Ok(ctx.vault.rekey_received(self.id, keys)?)
    }

    fn handle_post_handshake(
        &mut self,
        data: &[u8],
        ctx: &mut HandshakeContext<'_>,
    ) -> Result<ParticipantOutput, CallError> {
        let plaintext = self
            .session()?
            .open(data)
            .map_err(|e| self.violation(format!("undecryptable message: {e}")))?;
        let envelope = P2pEnvelope::decode(plaintext.as_slice())?;
        match envelope.content {
            Some(p2p_envelope::Content::Rekey(key)) => {
                let outcome = self.apply_media_key(&key, ctx)?;
                Ok(ParticipantOutput::Rekeyed(outcome))
            }
            Some(p2p_envelope::Content::CaptureState(state)) => {
                let device = CaptureDevice::try_from(state.device)
                    .map_err(|_| self.violation(format!("unknown device {}", state.device)))?;
                match device {
                    CaptureDevice::Microphone => self.microphone_on = state.on,
                    CaptureDevice::Camera => self.camera_on = state.on,
                }
                Ok(ParticipantOutput::CaptureStateChanged {
                    device,
                    on: state.on,
                })
            }
            Some(p2p_envelope::Content::HoldState(_)) => Ok(ParticipantOutput::Hold),
            None => Err(self.violation("empty envelope")),
        }
    }

    fn seal_post_handshake(
        &mut self,
        content: p2p_envelope::Content,
    ) -> Result<Option<Vec<u8>>, CallError> {
        if self.handshake != HandshakeState::Done || self.state != ParticipantState::Joined {
            return Ok(None);
        }
        let envelope = P2pEnvelope {
            padding: p2p::padding(),
            content: Some(content),
        };
        Ok(Some(self.session()?.seal(&envelope.encode_to_vec())?))
    }

    /// Announces fresh local media keys. `None` until the handshake is done;
    /// pending participants receive the current keys in our Auth instead.
    pub fn seal_rekey(&mut self, keys: &MediaKeySet) -> Result<Option<Vec<u8>>, CallError> {
        self.seal_post_handshake(p2p_envelope::Content::Rekey(keys.to_wire()))
    }

    /// Rekeys for every local key set newer than what our Auth carried.
    ///
    /// Keys can move on between our Auth and the end of the handshake, and
    /// `seal_rekey` skips participants that are still pending.
    pub fn seal_missed_keys(&mut self, keys: &[MediaKeySet]) -> Result<Vec<Vec<u8>>, CallError> {
        let sent = self.auth_epoch;
        let mut payloads = Vec::new();
        for key in keys.iter().filter(|key| sent.is_none_or(|epoch| key.epoch() > epoch)) {
            if let Some(payload) = self.seal_rekey(key)? {
                payloads.push(payload);
                self.auth_epoch = Some(key.epoch());
            }
        }
        Ok(payloads)
    }

    pub fn seal_capture_state(
        &mut self,
        device: CaptureDevice,
        on: bool,
    ) -> Result<Option<Vec<u8>>, CallError> {
        self.seal_post_handshake(p2p_envelope::Content::CaptureState(CaptureState {
            device: device as i32,
            on,
        }))
    }

    pub fn seal_hold(&mut self) -> Result<Option<Vec<u8>>, CallError> {
        self.seal_post_handshake(p2p_envelope::Content::HoldState(HoldState {}))
    }
}

fn seal_hello(ctx: &HandshakeContext<'_>) -> Result<Vec<u8>, CallError> {
    let envelope = HelloEnvelope {
        padding: p2p::padding(),
        hello: Some(Hello {
            identity: ctx.identity.identity.clone(),
            nickname: ctx.identity.nickname.clone(),
            pck: ctx.local.pck().to_vec(),
            pcck: ctx.local.pcck().to_vec(),
        }),
    };
    Ok(ctx.keys.seal_hello(&envelope.encode_to_vec())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gccore::GroupCallKey;

    struct Side {
        keys: GroupCallKeys,
        local: LocalParticipantKeys,
        identity: LocalIdentity,
        vault: MediaKeyVault,
    }

    impl Side {
        fn new(id: u32, gck: &GroupCallKey, name: &str) -> Self {
            let mut vault = MediaKeyVault::default();
            vault.activate(gck, ParticipantId(id)).unwrap();
            Self {
                keys: GroupCallKeys::derive(gck.clone()).unwrap(),
                local: LocalParticipantKeys::generate(),
                identity: LocalIdentity {
                    identity: name.to_string(),
                    nickname: name.to_lowercase(),
                },
                vault,
            }
        }

        fn ctx(&mut self) -> HandshakeContext<'_> {
            HandshakeContext {
                keys: &self.keys,
                local: &self.local,
                identity: &self.identity,
                vault: &mut self.vault,
            }
        }
    }

    /// `a` was in the call first, `b` joined later.
    fn handshaken() -> (Side, RemoteParticipant, Side, RemoteParticipant) {
        let gck = GroupCallKey::generate();
        let mut a = Side::new(1, &gck, "ALICE001");
        let mut b = Side::new(2, &gck, "BOBBY002");
        a.vault.derive_initial_keys(&gck, ParticipantId(2)).unwrap();
        b.vault.derive_initial_keys(&gck, ParticipantId(1)).unwrap();
        let mut a_sees_b = RemoteParticipant::new(ParticipantId(2), false).unwrap();
        let mut b_sees_a = RemoteParticipant::new(ParticipantId(1), true).unwrap();

        let hello_b = b_sees_a.initial_hello(&b.ctx()).unwrap().unwrap();
        assert_eq!(a_sees_b.initial_hello(&a.ctx()).unwrap(), None);

        let ParticipantOutput::Send(replies) = a_sees_b.handle(&hello_b, &mut a.ctx()).unwrap()
        else {
            panic!("expected hello and auth");
        };
        assert_eq!(replies.len(), 2);
        assert_eq!(a_sees_b.handshake_state(), HandshakeState::AwaitAuth);

        assert_eq!(
            b_sees_a.handle(&replies[0], &mut b.ctx()).unwrap(),
            ParticipantOutput::None
        );
        let ParticipantOutput::HandshakeCompleted { send } =
            b_sees_a.handle(&replies[1], &mut b.ctx()).unwrap()
        else {
            panic!("expected completion");
        };
        assert_eq!(send.len(), 1);

        assert_eq!(
            a_sees_b.handle(&send[0], &mut a.ctx()).unwrap(),
            ParticipantOutput::HandshakeCompleted { send: Vec::new() }
        );
        (a, a_sees_b, b, b_sees_a)
    }

    #[test]
    fn test_full_handshake() {
        let (_a, a_sees_b, _b, b_sees_a) = handshaken();
        assert!(a_sees_b.is_joined());
        assert!(b_sees_a.is_joined());
        assert_eq!(a_sees_b.identity(), Some("BOBBY002"));
        assert_eq!(b_sees_a.nickname(), Some("alice001"));
        assert_eq!(b_sees_a.handshake_state(), HandshakeState::Done);
    }

    #[test]
    fn test_rekey_after_handshake() {
        let (mut a, mut a_sees_b, mut b, mut b_sees_a) = handshaken();
        let fresh = a.vault.replace_and_apply_new_media_keys().unwrap();
        let message = a_sees_b.seal_rekey(&fresh).unwrap().unwrap();
        assert_eq!(
            b_sees_a.handle(&message, &mut b.ctx()).unwrap(),
            ParticipantOutput::Rekeyed(RekeyOutcome::Announced { epoch: 1 })
        );

        let frame = a
            .vault
            .encrypt_frame(gccore::media_keys::KeyUsage::Microphone, b"audio")
            .unwrap();
        assert_eq!(
            b.vault
                .decrypt_frame(
                    ParticipantId(1),
                    gccore::media_keys::KeyUsage::Microphone,
                    &frame
                )
                .unwrap(),
            b"audio"
        );
    }

    #[test]
    fn test_auth_carries_pending_keys() {
        let gck = GroupCallKey::generate();
        let mut a = Side::new(1, &gck, "ALICE001");
        let mut b = Side::new(2, &gck, "BOBBY002");
        a.vault.derive_initial_keys(&gck, ParticipantId(2)).unwrap();
        b.vault.derive_initial_keys(&gck, ParticipantId(1)).unwrap();
        let pending = a.vault.prepare_new_media_keys().unwrap();

        let mut a_sees_b = RemoteParticipant::new(ParticipantId(2), false).unwrap();
        let mut b_sees_a = RemoteParticipant::new(ParticipantId(1), true).unwrap();
        let hello_b = b_sees_a.initial_hello(&b.ctx()).unwrap().unwrap();
        let ParticipantOutput::Send(replies) = a_sees_b.handle(&hello_b, &mut a.ctx()).unwrap()
        else {
            panic!("expected hello and auth");
        };
        b_sees_a.handle(&replies[0], &mut b.ctx()).unwrap();
        b_sees_a.handle(&replies[1], &mut b.ctx()).unwrap();

        a.vault.apply_pending_media_keys().unwrap();
        let frame = a
            .vault
            .encrypt_frame(gccore::media_keys::KeyUsage::Microphone, b"audio")
            .unwrap();
        assert_eq!(
            b.vault
                .decrypt_frame(
                    ParticipantId(1),
                    gccore::media_keys::KeyUsage::Microphone,
                    &frame
                )
                .unwrap(),
            b"audio"
        );
        assert_eq!(b.vault.decryptor_epoch(ParticipantId(1)), Some(pending.epoch()));
        // Nothing newer than the Auth is owed.
        let current = a.vault.local_keys().unwrap().clone();
        assert!(a_sees_b.seal_missed_keys(&[current]).unwrap().is_empty());
    }

    /// Test that keys replaced while our Auth is in flight follow once the
    /// handshake completes.
    #[test]
    fn test_keys_replaced_mid_handshake_are_sent_after_completion() {
        let gck = GroupCallKey::generate();
        let mut a = Side::new(1, &gck, "ALICE001");
        let mut b = Side::new(2, &gck, "BOBBY002");
        a.vault.derive_initial_keys(&gck, ParticipantId(2)).unwrap();
        b.vault.derive_initial_keys(&gck, ParticipantId(1)).unwrap();

        let mut a_sees_b = RemoteParticipant::new(ParticipantId(2), false).unwrap();
        let mut b_sees_a = RemoteParticipant::new(ParticipantId(1), true).unwrap();
        let hello_b = b_sees_a.initial_hello(&b.ctx()).unwrap().unwrap();
        let ParticipantOutput::Send(replies) = a_sees_b.handle(&hello_b, &mut a.ctx()).unwrap()
        else {
            panic!("expected hello and auth");
        };

        let fresh = a.vault.replace_and_apply_new_media_keys().unwrap();
        assert_eq!(a_sees_b.seal_rekey(&fresh).unwrap(), None);

        b_sees_a.handle(&replies[0], &mut b.ctx()).unwrap();
        let ParticipantOutput::HandshakeCompleted { send } =
            b_sees_a.handle(&replies[1], &mut b.ctx()).unwrap()
        else {
            panic!("expected completion");
        };
        a_sees_b.handle(&send[0], &mut a.ctx()).unwrap();

        let owed = a_sees_b.seal_missed_keys(&[fresh.clone()]).unwrap();
        assert_eq!(owed.len(), 1);
        assert_eq!(
            b_sees_a.handle(&owed[0], &mut b.ctx()).unwrap(),
            ParticipantOutput::Rekeyed(RekeyOutcome::Announced { epoch: 1 })
        );
        assert!(a_sees_b.seal_missed_keys(&[fresh]).unwrap().is_empty());

        let frame = a
            .vault
            .encrypt_frame(gccore::media_keys::KeyUsage::Microphone, b"audio")
            .unwrap();
        assert_eq!(
            b.vault
                .decrypt_frame(
                    ParticipantId(1),
                    gccore::media_keys::KeyUsage::Microphone,
                    &frame
                )
                .unwrap(),
            b"audio"
        );
    }

    #[test]
    fn test_capture_state_and_replay() {
        let (_a, mut a_sees_b, mut b, mut b_sees_a) = handshaken();
        let message = a_sees_b
            .seal_capture_state(CaptureDevice::Camera, true)
            .unwrap()
            .unwrap();
        assert_eq!(
            b_sees_a.handle(&message, &mut b.ctx()).unwrap(),
            ParticipantOutput::CaptureStateChanged {
                device: CaptureDevice::Camera,
                on: true
            }
        );
        assert!(b_sees_a.camera_on());
        assert!(!b_sees_a.microphone_on());

        let replayed = b_sees_a.handle(&message, &mut b.ctx()).unwrap_err();
        assert!(matches!(replayed, CallError::Protocol { participant: Some(ParticipantId(1)), .. }));
    }

    #[test]
    fn test_pending_participants_get_no_post_handshake_messages() {
        let gck = GroupCallKey::generate();
        let mut a = Side::new(1, &gck, "ALICE001");
        let mut pending = RemoteParticipant::new(ParticipantId(2), false).unwrap();
        let keys = a.vault.replace_and_apply_new_media_keys().unwrap();
        assert_eq!(pending.seal_rekey(&keys).unwrap(), None);
        assert_eq!(pending.seal_hold().unwrap(), None);
        assert_eq!(pending.state(), ParticipantState::Pending);
    }

    /// Test that a hello sealed for another call is a protocol violation.
    #[test]
    fn test_foreign_hello_rejected() {
        let mut a = Side::new(1, &GroupCallKey::generate(), "ALICE001");
        let mut b = Side::new(2, &GroupCallKey::generate(), "BOBBY002");
        let b_sees_a = RemoteParticipant::new(ParticipantId(1), true).unwrap();
        let hello = b_sees_a.initial_hello(&b.ctx()).unwrap().unwrap();

        let mut a_sees_b = RemoteParticipant::new(ParticipantId(2), false).unwrap();
        let err = a_sees_b.handle(&hello, &mut a.ctx()).unwrap_err();
        assert_eq!(err.class(), super::super::error::ErrorClass::Protocol);
        assert_eq!(
            a_sees_b.handshake_state(),
            HandshakeState::AwaitNewParticipantHello
        );
    }

    #[test]
    fn test_messages_after_departure_rejected() {
        let (mut a, mut a_sees_b, _b, mut b_sees_a) = handshaken();
        let message = b_sees_a.seal_hold().unwrap().unwrap();
        a_sees_b.mark_left();
        assert_eq!(a_sees_b.state(), ParticipantState::Left);
        assert!(a_sees_b.handle(&message, &mut a.ctx()).is_err());
        assert_eq!(a_sees_b.record_protocol_error(), 1);
    }

    #[test]
    fn test_mid_capacity_checked() {
        assert!(RemoteParticipant::new(ParticipantId(u32::MAX), true).is_err());
    }
}
