//! State of one joined call session, owned by the call actor.
//!
//! The context holds the participant records, the media key vault and the
//! peer connection adapter. Membership and key state changes are applied
//! synchronously within one call; only then are side effects (transceiver
//! changes, renegotiation, outgoing messages) awaited.

use bytes::Bytes;
use chrono::Utc;
use gcproto::groupcall::{
    self as proto, CaptureDevice, OuterEnvelope, ParticipantToSfu, SfuToParticipant,
    SubscribeCamera, UnsubscribeCamera, UpdateCallState, participant_to_sfu, sfu_to_participant,
};
use gccore::p2p::{self, LocalParticipantKeys};
use gccore::vault::RekeyOutcome;
use gccore::{CallId, GroupCallKeys, HeaderExtensions, MediaKeyVault, Mids, ParticipantId};
use log::{debug, info, warn};
use prost::Message;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::actor::CallMessage;
use super::error::CallError;
use super::participant::{
    CameraSubscription, HandshakeContext, LocalIdentity, ParticipantOutput, RemoteParticipant,
};
use super::peer_connection::{PeerConnectionAdapter, PeerConnectionError};
use super::session_description::{self, RemoteLine, RemoteSessionParameters};
use crate::config::GroupCallConfig;

/// Why an inbound message was dropped without effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    UnknownSender(ParticipantId),
    WrongReceiver(u32),
    Malformed(String),
    ProtocolViolation(String),
    Empty,
}

/// Result of a membership update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipChange {
    pub added: Vec<ParticipantId>,
    pub removed: Vec<ParticipantId>,
    /// Local epoch after the update if a late join moved it.
    pub ratcheted_to: Option<u32>,
    /// Epoch of fresh keys announced because of a departure.
    pub pending_epoch: Option<u32>,
}

impl MembershipChange {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// What the call actor must do after the context consumed a message.
#[derive(Debug)]
pub enum MessageResponseAction {
    None,
    Discard { reason: DiscardReason },
    /// The SFU listed the participants present at join time.
    SfuHelloReceived(MembershipChange),
    ParticipantsChanged(MembershipChange),
    ParticipantJoined {
        participant: ParticipantId,
        identity: String,
        nickname: String,
    },
    CaptureStateChanged {
        participant: ParticipantId,
        device: CaptureDevice,
        on: bool,
    },
    RekeyApplied {
        participant: ParticipantId,
        outcome: RekeyOutcome,
    },
    Hold(ParticipantId),
    /// The participant exceeded the protocol-error threshold.
    RemoveParticipant(ParticipantId),
    PropagateError(CallError),
}

/// Inputs for a freshly joined call.
pub struct CallContextParams {
    pub call_id: CallId,
    pub local_id: ParticipantId,
    pub identity: LocalIdentity,
    pub keys: GroupCallKeys,
    pub session: RemoteSessionParameters,
    pub header_extensions: HeaderExtensions,
    pub microphone_on: bool,
    pub camera_on: bool,
}

pub struct CallContext {
    call_id: CallId,
    config: Arc<GroupCallConfig>,
    local_id: ParticipantId,
    local_mids: Mids,
    identity: LocalIdentity,
    keys: GroupCallKeys,
    local_keys: LocalParticipantKeys,
    vault: MediaKeyVault,
    adapter: PeerConnectionAdapter,
    session: RemoteSessionParameters,
    header_extensions: HeaderExtensions,
    participants: BTreeMap<ParticipantId, RemoteParticipant>,
    media_lines: Vec<RemoteLine>,
    session_version: u64,
    microphone_on: bool,
    camera_on: bool,
    mailbox: mpsc::WeakSender<CallMessage>,
    state_update_task: Option<AbortHandle>,
    rekey_task: Option<AbortHandle>,
    /// A departure happened after the pending keys went out.
    replacement_stale: bool,
    left: bool,
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("call_id", &self.call_id)
            .field("local_id", &self.local_id)
            .field("participants", &self.participants.len())
            .field("vault", &self.vault)
            .field("left", &self.left)
            .finish()
    }
}

impl CallContext {
    /// Activates the vault for the local slot. Fails if the slot has no MIDs.
    pub fn new(
        params: CallContextParams,
        adapter: PeerConnectionAdapter,
        config: Arc<GroupCallConfig>,
        mailbox: mpsc::WeakSender<CallMessage>,
    ) -> Result<Self, CallError> {
        let local_mids = Mids::for_participant(params.local_id)?;
        let mut vault = match &config.frame_crypto {
            Some(backend) => MediaKeyVault::new(Arc::clone(backend)),
            None => MediaKeyVault::default(),
        };
        vault.activate(params.keys.gck(), params.local_id)?;
        Ok(Self {
            call_id: params.call_id,
            config,
            local_id: params.local_id,
            local_mids,
            identity: params.identity,
            keys: params.keys,
            local_keys: LocalParticipantKeys::generate(),
            vault,
            adapter,
            session: params.session,
            header_extensions: params.header_extensions,
            participants: BTreeMap::new(),
            media_lines: Vec::new(),
            session_version: 0,
            microphone_on: params.microphone_on,
            camera_on: params.camera_on,
            mailbox,
            state_update_task: None,
            rekey_task: None,
            replacement_stale: false,
            left: false,
        })
    }

    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn local_id(&self) -> ParticipantId {
        self.local_id
    }

    pub fn local_mids(&self) -> &Mids {
        &self.local_mids
    }

    pub fn vault(&self) -> &MediaKeyVault {
        &self.vault
    }

    /// Media frames are encrypted and decrypted through the vault.
    pub fn vault_mut(&mut self) -> &mut MediaKeyVault {
        &mut self.vault
    }

    pub fn header_extensions(&self) -> &HeaderExtensions {
        &self.header_extensions
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&RemoteParticipant> {
        self.participants.get(&id)
    }

    pub fn participants(&self) -> impl Iterator<Item = &RemoteParticipant> {
        self.participants.values()
    }

    pub fn microphone_on(&self) -> bool {
        self.microphone_on
    }

    pub fn camera_on(&self) -> bool {
        self.camera_on
    }

    pub fn has_left(&self) -> bool {
        self.left
    }

    /// Negotiates the initial session and hands the SFU's candidates to ICE.
    pub async fn start(&mut self) -> Result<(), CallError> {
        self.renegotiate().await?;
        for candidate in session_description::ice_candidates(
            &self.session,
            &self.local_mids.microphone(),
            self.config.allow_ipv6_candidates,
        ) {
            self.adapter.add_ice_candidate(&candidate).await?;
        }
        self.map_local_transceivers(!self.microphone_on, !self.camera_on)
            .await
    }

    async fn renegotiate(&mut self) -> Result<(), CallError> {
        self.session_version += 1;
        let offer = session_description::remote_offer(
            self.session_version,
            &self.session,
            &self.local_mids,
            &self.media_lines,
            &self.header_extensions,
        );
        self.adapter
            .negotiate(&offer, session_description::patch_local_answer)
            .await?;
        debug!(
            target: "GroupCall/Context",
            "Negotiated session version {} with {} remote line(s)",
            self.session_version,
            self.media_lines.len()
        );
        Ok(())
    }

    /// Enables or disables the local microphone and camera transceivers.
    pub async fn map_local_transceivers(
        &mut self,
        audio_muted: bool,
        video_muted: bool,
    ) -> Result<(), CallError> {
        self.adapter
            .set_transceiver_active(&self.local_mids.microphone(), !audio_muted)
            .await?;
        self.adapter
            .set_transceiver_active(&self.local_mids.camera(), !video_muted)
            .await?;
        Ok(())
    }

    async fn map_remote_transceivers(&self, id: ParticipantId) -> Result<(), CallError> {
        let Some(line) = self.media_lines.iter().find(|l| l.participant() == id) else {
            return Ok(());
        };
        let record = self.participants.get(&id);
        let joined = line.active && record.is_some_and(|r| r.is_joined());
        let camera = joined && record.is_some_and(|r| r.camera_subscription().is_some());
        self.adapter
            .set_transceiver_active(&line.mids.microphone(), joined)
            .await?;
        self.adapter
            .set_transceiver_active(&line.mids.camera(), camera)
            .await?;
        Ok(())
    }

    fn split(
        &mut self,
    ) -> (
        &mut BTreeMap<ParticipantId, RemoteParticipant>,
        HandshakeContext<'_>,
    ) {
        (
            &mut self.participants,
            HandshakeContext {
                keys: &self.keys,
                local: &self.local_keys,
                identity: &self.identity,
                vault: &mut self.vault,
            },
        )
    }

    /// Applies one membership update from the SFU.
    ///
    /// `existing` marks added participants that were in the call before the
    /// local one joined. Either every change in the batch is applied or none
    /// is. Departures purge the leaver's keys and announce fresh random local
    /// keys, applied after `rekey_delay`. Participants joining after us cause
    /// one ratchet per batch.
    pub async fn update_participants(
        &mut self,
        add: &[ParticipantId],
        remove: &[ParticipantId],
        existing: bool,
    ) -> Result<MembershipChange, CallError> {
        if self.left {
            return Ok(MembershipChange::default());
        }

        let mut removed = Vec::new();
        for id in remove {
            if self.participants.contains_key(id) && !removed.contains(id) {
                removed.push(*id);
            }
        }
        let mut records: Vec<RemoteParticipant> = Vec::new();
        for id in add {
            if *id == self.local_id {
                continue;
            }
            let present = self.participants.contains_key(id) && !removed.contains(id);
            if present || records.iter().any(|r| r.id() == *id) {
                debug!(target: "GroupCall/Context", "Ignoring duplicate add of {id}");
                continue;
            }
            records.push(RemoteParticipant::new(*id, existing)?);
        }

        // Every addition is validated above, so nothing below can fail on
        // capacity. Removals run first so a slot re-assigned within the batch
        // gets a new record.
        for id in &removed {
            if let Some(mut record) = self.participants.remove(id) {
                record.mark_left();
            }
            self.vault.remove_decryptor(*id);
            if let Some(line) = self.media_lines.iter_mut().find(|l| l.participant() == *id) {
                line.active = false;
            }
            info!(target: "GroupCall/Context", "{id} left the call");
        }

        let mut added = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id();
            self.vault.derive_initial_keys(self.keys.gck(), id)?;
            match self.media_lines.iter_mut().find(|l| l.participant() == id) {
                Some(line) => line.active = true,
                None => self.media_lines.push(RemoteLine {
                    mids: *record.mids(),
                    active: true,
                }),
            }
            self.participants.insert(id, record);
            added.push(id);
            info!(target: "GroupCall/Context", "{id} added (existing: {existing})");
        }

        let ratcheted_to = if !existing && !added.is_empty() {
            Some(self.advance_for_late_join()?)
        } else {
            None
        };

        let mut change = MembershipChange {
            added,
            removed,
            ratcheted_to,
            pending_epoch: None,
        };
        if change.is_empty() {
            return Ok(change);
        }

        for id in &change.removed {
            self.map_remote_transceivers(*id).await?;
        }
        self.renegotiate().await?;
        for id in &change.added {
            self.map_remote_transceivers(*id).await?;
        }

        let mut hellos = Vec::new();
        {
            let (participants, ctx) = self.split();
            for id in &change.added {
                if let Some(record) = participants.get(id) {
                    if let Some(hello) = record.initial_hello(&ctx)? {
                        hellos.push((*id, hello));
                    }
                }
            }
        }
        for (id, hello) in hellos {
            self.relay(id, vec![hello]).await?;
        }

        let stale_applied = self.replacement_stale && self.vault.pending_keys().is_none();
        if !change.removed.is_empty() || stale_applied {
            change.pending_epoch = self.replace_media_keys().await?;
        }
        Ok(change)
    }

    /// Moves the local keys past anything a newcomer could have recorded. A
    /// pending replacement is applied early instead of ratcheting.
    fn advance_for_late_join(&mut self) -> Result<u32, CallError> {
        if let Some(epoch) = self.vault.apply_pending_media_keys()? {
            if let Some(task) = self.rekey_task.take() {
                task.abort();
            }
            return Ok(epoch);
        }
        Ok(self.vault.ratchet_and_apply_new_keys()?)
    }

    /// Entry point for everything the SFU sends on the data channel.
    pub async fn handle_sfu_message(&mut self, data: &[u8]) -> MessageResponseAction {
        let message = match SfuToParticipant::decode(data) {
            Ok(message) => message,
            Err(e) => {
                return MessageResponseAction::Discard {
                    reason: DiscardReason::Malformed(e.to_string()),
                };
            }
        };
        let (add, remove, existing, hello) = match message.content {
            Some(sfu_to_participant::Content::Relay(envelope)) => return self.handle(envelope).await,
            Some(sfu_to_participant::Content::Hello(hello)) => (
                hello
                    .participant_ids
                    .into_iter()
                    .map(ParticipantId)
                    .collect::<Vec<_>>(),
                Vec::new(),
                true,
                true,
            ),
            Some(sfu_to_participant::Content::ParticipantJoined(joined)) => (
                vec![ParticipantId(joined.participant_id)],
                Vec::new(),
                false,
                false,
            ),
            Some(sfu_to_participant::Content::ParticipantLeft(left)) => (
                Vec::new(),
                vec![ParticipantId(left.participant_id)],
                true,
                false,
            ),
            None => {
                return MessageResponseAction::Discard {
                    reason: DiscardReason::Empty,
                };
            }
        };
        match self.update_participants(&add, &remove, existing).await {
            Ok(change) if hello => MessageResponseAction::SfuHelloReceived(change),
            Ok(change) => MessageResponseAction::ParticipantsChanged(change),
            Err(CallError::Capacity(e)) => MessageResponseAction::Discard {
                reason: DiscardReason::ProtocolViolation(format!(
                    "SFU announced an unusable slot: {e}"
                )),
            },
            Err(e) => MessageResponseAction::PropagateError(e),
        }
    }

    /// Handles one relayed participant-to-participant envelope.
    pub async fn handle(&mut self, envelope: OuterEnvelope) -> MessageResponseAction {
        if envelope.receiver != self.local_id.value() {
            return MessageResponseAction::Discard {
                reason: DiscardReason::WrongReceiver(envelope.receiver),
            };
        }
        let sender = ParticipantId(envelope.sender);
        let threshold = self.config.protocol_error_threshold;

        let result = {
            let (participants, mut ctx) = self.split();
            let Some(record) = participants.get_mut(&sender) else {
                debug!(target: "GroupCall/Context", "Discarding message from unknown {sender}");
                return MessageResponseAction::Discard {
                    reason: DiscardReason::UnknownSender(sender),
                };
            };
            match record.handle(&envelope.encrypted_data, &mut ctx) {
                Ok(output) => Ok(output),
                Err(e) if e.is_fatal() => Err((e, None)),
                Err(e) => {
                    let count = record.record_protocol_error();
                    Err((e, Some(count)))
                }
            }
        };

        let output = match result {
            Ok(output) => output,
            Err((e, None)) => return MessageResponseAction::PropagateError(e),
            Err((e, Some(count))) => {
                warn!(
                    target: "GroupCall/Context",
                    "Protocol error {count}/{threshold} from {sender}: {e}"
                );
                return if count >= threshold {
                    MessageResponseAction::RemoveParticipant(sender)
                } else {
                    MessageResponseAction::Discard {
                        reason: DiscardReason::ProtocolViolation(e.to_string()),
                    }
                };
            }
        };

        match self.apply_output(sender, output).await {
            Ok(action) => action,
            Err(e) => MessageResponseAction::PropagateError(e),
        }
    }

    async fn apply_output(
        &mut self,
        sender: ParticipantId,
        output: ParticipantOutput,
    ) -> Result<MessageResponseAction, CallError> {
        Ok(match output {
            ParticipantOutput::None => MessageResponseAction::None,
            ParticipantOutput::Send(payloads) => {
                self.relay(sender, payloads).await?;
                MessageResponseAction::None
            }
            ParticipantOutput::HandshakeCompleted { send } => {
                self.relay(sender, send).await?;
                self.map_remote_transceivers(sender).await?;
                let (microphone_on, camera_on) = (self.microphone_on, self.camera_on);
                let mut local_keys = vec![self.vault.local_keys()?.clone()];
                local_keys.extend(self.vault.pending_keys().cloned());
                let mut payloads = Vec::new();
                if let Some(record) = self.participants.get_mut(&sender) {
                    payloads.extend(record.seal_missed_keys(&local_keys)?);
                    if !payloads.is_empty() {
                        debug!(
                            target: "GroupCall/Context",
                            "Sending {sender} media keys that changed during the handshake"
                        );
                    }
                    for (device, on) in [
                        (CaptureDevice::Microphone, microphone_on),
                        (CaptureDevice::Camera, camera_on),
                    ] {
                        payloads.extend(record.seal_capture_state(device, on)?);
                    }
                }
                self.relay(sender, payloads).await?;
                let record = self.participants.get(&sender);
                MessageResponseAction::ParticipantJoined {
                    participant: sender,
                    identity: record
                        .and_then(|r| r.identity())
                        .unwrap_or_default()
                        .to_string(),
                    nickname: record
                        .and_then(|r| r.nickname())
                        .unwrap_or_default()
                        .to_string(),
                }
            }
            ParticipantOutput::CaptureStateChanged { device, on } => {
                MessageResponseAction::CaptureStateChanged {
                    participant: sender,
                    device,
                    on,
                }
            }
            ParticipantOutput::Rekeyed(outcome) => MessageResponseAction::RekeyApplied {
                participant: sender,
                outcome,
            },
            ParticipantOutput::Hold => MessageResponseAction::Hold(sender),
        })
    }

    /// Changes local capture, maps the transceivers and tells joined participants.
    pub async fn set_capture(&mut self, device: CaptureDevice, on: bool) -> Result<(), CallError> {
        match device {
            CaptureDevice::Microphone => self.microphone_on = on,
            CaptureDevice::Camera => self.camera_on = on,
        }
        self.map_local_transceivers(!self.microphone_on, !self.camera_on)
            .await?;
        self.adapter.notify_local_capture(device, on);

        let mut outgoing = Vec::new();
        for record in self.participants.values_mut() {
            if let Some(payload) = record.seal_capture_state(device, on)? {
                outgoing.push((record.id(), payload));
            }
        }
        for (id, payload) in outgoing {
            self.relay(id, vec![payload]).await?;
        }
        Ok(())
    }

    /// Asks the SFU to forward a remote camera at the given quality.
    pub async fn subscribe_camera(
        &mut self,
        participant: ParticipantId,
        subscription: CameraSubscription,
    ) -> Result<(), CallError> {
        let record = self
            .participants
            .get_mut(&participant)
            .ok_or_else(|| CallError::protocol(Some(participant), "not in the call"))?;
        record.set_camera_subscription(Some(subscription));
        self.send_to_sfu(participant_to_sfu::Content::SubscribeCamera(SubscribeCamera {
            participant_id: participant.value(),
            width: subscription.width,
            height: subscription.height,
            fps: subscription.fps,
        }))
        .await?;
        self.map_remote_transceivers(participant).await
    }

    pub async fn unsubscribe_camera(&mut self, participant: ParticipantId) -> Result<(), CallError> {
        let record = self
            .participants
            .get_mut(&participant)
            .ok_or_else(|| CallError::protocol(Some(participant), "not in the call"))?;
        record.set_camera_subscription(None);
        self.send_to_sfu(participant_to_sfu::Content::UnsubscribeCamera(
            UnsubscribeCamera {
                participant_id: participant.value(),
            },
        ))
        .await?;
        self.map_remote_transceivers(participant).await
    }

    /// The participant with the lowest ID publishes the encrypted call state.
    pub fn is_state_leader(&self) -> bool {
        self.participants
            .keys()
            .next()
            .is_none_or(|lowest| self.local_id < *lowest)
    }

    /// Opens a call-state blob published by the current leader.
    pub fn open_call_state(&self, sealed: &[u8]) -> Result<proto::CallState, CallError> {
        let plaintext = self.keys.open_call_state(sealed)?;
        Ok(proto::CallState::decode(plaintext.as_slice())?)
    }

    /// Publishes the encrypted call state if we are the leader.
    pub async fn send_call_state_if_leader(&mut self) -> Result<bool, CallError> {
        if self.left || !self.is_state_leader() {
            return Ok(false);
        }
        let mut participants = HashMap::new();
        participants.insert(
            self.local_id.value(),
            proto::CallStateParticipant {
                identity: self.identity.identity.clone(),
                nickname: self.identity.nickname.clone(),
            },
        );
        for record in self.participants.values().filter(|r| r.is_joined()) {
            participants.insert(
                record.id().value(),
                proto::CallStateParticipant {
                    identity: record.identity().unwrap_or_default().to_string(),
                    nickname: record.nickname().unwrap_or_default().to_string(),
                },
            );
        }
        let state = proto::CallState {
            state_created_at: Utc::now().timestamp_millis().max(0) as u64,
            state_created_by: self.local_id.value(),
            participants,
            padding: p2p::padding(),
        };
        let sealed = self.keys.seal_call_state(&state.encode_to_vec())?;
        self.send_to_sfu(participant_to_sfu::Content::UpdateCallState(UpdateCallState {
            encrypted_call_state: sealed,
        }))
        .await?;
        Ok(true)
    }

    /// Starts the periodic state-update ticker once. It stops by itself when
    /// the call actor is gone.
    pub fn start_state_update_task_if_necessary(&mut self) {
        if self.left || self.state_update_task.is_some() {
            return;
        }
        let mailbox = self.mailbox.clone();
        let period = self.config.state_update_interval;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(sender) = mailbox.upgrade() else {
                    break;
                };
                if sender.send(CallMessage::StateUpdateTick).await.is_err() {
                    break;
                }
            }
            debug!(target: "GroupCall/Context", "State update task stopped");
        });
        self.state_update_task = Some(handle.abort_handle());
    }

    /// Posts `ApplyPendingMediaKeys` once `rekey_delay` has passed.
    fn schedule_key_switch(&mut self, epoch: u32) {
        if let Some(task) = self.rekey_task.take() {
            task.abort();
        }
        let mailbox = self.mailbox.clone();
        let delay = self.config.rekey_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(sender) = mailbox.upgrade() {
                let _ = sender
                    .send(CallMessage::ApplyPendingMediaKeys { epoch })
                    .await;
            }
        });
        self.rekey_task = Some(handle.abort_handle());
    }

    /// Announces fresh random local keys to every joined participant and
    /// schedules their use. Returns the announced epoch.
    ///
    /// While keys are pending, further calls only mark them stale: another
    /// replacement follows once they are applied.
    pub async fn replace_media_keys(&mut self) -> Result<Option<u32>, CallError> {
        if self.left {
            return Ok(None);
        }
        if let Some(pending) = self.vault.pending_keys() {
            debug!(
                target: "GroupCall/Context",
                "Media keys for epoch {} already pending, marking them stale",
                pending.epoch()
            );
            self.replacement_stale = true;
            return Ok(None);
        }
        self.replacement_stale = false;
        let keys = self.vault.prepare_new_media_keys()?;
        let mut outgoing = Vec::new();
        for record in self.participants.values_mut() {
            if let Some(payload) = record.seal_rekey(&keys)? {
                outgoing.push((record.id(), payload));
            }
        }
        let recipients = outgoing.len();
        for (id, payload) in outgoing {
            self.relay(id, vec![payload]).await?;
        }
        self.schedule_key_switch(keys.epoch());
        info!(
            target: "GroupCall/Context",
            "Announced media keys for epoch {} to {recipients} participant(s)",
            keys.epoch()
        );
        Ok(Some(keys.epoch()))
    }

    /// Starts encrypting under the pending keys announced for `epoch`.
    ///
    /// A switch for keys a late join already applied is ignored.
    pub async fn apply_pending_media_keys(&mut self, epoch: u32) -> Result<Option<u32>, CallError> {
        if self.left {
            return Ok(None);
        }
        if self.vault.pending_keys().map(|keys| keys.epoch()) != Some(epoch) {
            debug!(target: "GroupCall/Context", "No pending media keys for epoch {epoch}");
            return Ok(None);
        }
        self.rekey_task = None;
        let applied = self.vault.apply_pending_media_keys()?;
        info!(target: "GroupCall/Context", "Applied media keys, epoch {epoch}");
        if self.replacement_stale {
            self.replace_media_keys().await?;
        }
        Ok(applied)
    }

    async fn relay(&self, to: ParticipantId, payloads: Vec<Vec<u8>>) -> Result<(), CallError> {
        for payload in payloads {
            self.send_to_sfu(participant_to_sfu::Content::Relay(OuterEnvelope {
                sender: self.local_id.value(),
                receiver: to.value(),
                encrypted_data: payload,
            }))
            .await?;
        }
        Ok(())
    }

    async fn send_to_sfu(&self, content: participant_to_sfu::Content) -> Result<(), CallError> {
        let message = ParticipantToSfu {
            padding: p2p::padding(),
            content: Some(content),
        };
        self.adapter
            .send(Bytes::from(message.encode_to_vec()))
            .await
            .map_err(|e| match e {
                PeerConnectionError::Closed => CallError::DataChannelClosed,
                other => CallError::PeerConnection(other),
            })
    }

    /// Tears the session down. Safe to call more than once.
    pub async fn leave(&mut self) {
        if self.left {
            return;
        }
        self.left = true;
        for task in [self.state_update_task.take(), self.rekey_task.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
        if let Err(e) = self.map_local_transceivers(true, true).await {
            debug!(target: "GroupCall/Context", "Could not stop local media: {e}");
        }
        self.adapter.close().await;
        for record in self.participants.values_mut() {
            record.mark_left();
        }
        self.participants.clear();
        self.vault.clear();
        info!(target: "GroupCall/Context", "Left call {}", self.call_id);
    }
}
