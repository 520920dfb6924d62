//! The per-call actor.
//!
//! One task owns everything about a call session. User commands, timer
//! ticks and peer connection events are all serialized through it, so
//! membership updates, key ratchets and inbound messages never interleave.
//!
//! ```text
//! NotJoined -> Connecting -> Joining -> Joined -> Ending -> NotJoined
//!                  \____________\__ Abort __/
//! ```

use gccore::start::{GroupIdentity, SUPPORTED_PROTOCOL_VERSION, SfuBaseUrl};
use gccore::{CallId, GroupCallKeys, GroupCallStartData, HeaderExtensions, Mids, ParticipantId};
use gcproto::groupcall::{CaptureDevice, PeekResponse};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;

use super::context::{CallContext, CallContextParams, MembershipChange, MessageResponseAction};
use super::error::CallError;
use super::events::CallEvent;
use super::participant::{CameraSubscription, LocalIdentity};
use super::peer_connection::{
    AdapterEvent, IceConnectionState, PeerConnectionAdapter, PeerConnectionConfig,
    PeerConnectionError, PeerConnectionFactory,
};
use super::session_description::RemoteSessionParameters;
use super::sfu::{CredentialProvider, SfuClient, SfuError, SfuToken};
use super::state::{CallState, CallStateMachine, CallTransition, EndReason};
use crate::config::GroupCallConfig;

/// Quality requested when a remote camera turns on.
pub const DEFAULT_CAMERA_SUBSCRIPTION: CameraSubscription = CameraSubscription {
    width: 640,
    height: 360,
    fps: 30,
};

/// Everything that can be posted into a call's mailbox.
#[derive(Debug)]
pub enum CallMessage {
    Leave {
        reply: Option<oneshot::Sender<()>>,
    },
    SetCapture {
        device: CaptureDevice,
        on: bool,
    },
    SubscribeCamera {
        participant: ParticipantId,
        subscription: CameraSubscription,
    },
    UnsubscribeCamera {
        participant: ParticipantId,
    },
    StateUpdateTick,
    PeekCompleted(Result<PeekResponse, SfuError>),
    /// Pending media keys announced for `epoch` are due.
    ApplyPendingMediaKeys {
        epoch: u32,
    },
}

/// What the caller knows about the call to join.
#[derive(Debug, Clone)]
pub struct CallParams {
    pub group: GroupIdentity,
    pub start: GroupCallStartData,
    pub identity: LocalIdentity,
    pub microphone_on: bool,
    pub camera_on: bool,
}

/// Collaborators a call needs.
#[derive(Clone)]
pub struct CallDependencies {
    pub config: Arc<GroupCallConfig>,
    pub sfu: SfuClient,
    pub credentials: Arc<dyn CredentialProvider>,
    pub peer_connections: Arc<dyn PeerConnectionFactory>,
}

/// Owning handle to a running call. The call tears itself down once every
/// handle is gone.
#[derive(Debug, Clone)]
pub struct CallHandle {
    call_id: CallId,
    sender: mpsc::Sender<CallMessage>,
    leave_timeout: Duration,
}

impl CallHandle {
    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Resolves once the actor has finished.
    pub async fn closed(&self) {
        self.sender.closed().await
    }

    /// Whether both handles drive the same actor.
    pub fn same_call(&self, other: &CallHandle) -> bool {
        self.sender.same_channel(&other.sender)
    }

    /// A non-owning handle for observers such as the UI.
    pub fn subscription(&self) -> CallSubscription {
        CallSubscription {
            call_id: self.call_id,
            sender: self.sender.downgrade(),
            leave_timeout: self.leave_timeout,
        }
    }

    async fn post(&self, message: CallMessage) -> Result<(), CallError> {
        self.sender
            .send(message)
            .await
            .map_err(|_| CallError::ActorGone)
    }

    pub async fn set_microphone(&self, on: bool) -> Result<(), CallError> {
        self.post(CallMessage::SetCapture {
            device: CaptureDevice::Microphone,
            on,
        })
        .await
    }

    pub async fn set_camera(&self, on: bool) -> Result<(), CallError> {
        self.post(CallMessage::SetCapture {
            device: CaptureDevice::Camera,
            on,
        })
        .await
    }

    pub async fn subscribe_camera(
        &self,
        participant: ParticipantId,
        subscription: CameraSubscription,
    ) -> Result<(), CallError> {
        self.post(CallMessage::SubscribeCamera {
            participant,
            subscription,
        })
        .await
    }

    pub async fn unsubscribe_camera(&self, participant: ParticipantId) -> Result<(), CallError> {
        self.post(CallMessage::UnsubscribeCamera { participant })
            .await
    }

    /// Leaves the call and waits for the teardown to finish.
    ///
    /// Leaving a call whose actor already stopped succeeds.
    pub async fn leave(&self) -> Result<(), CallError> {
        let (reply, confirmed) = oneshot::channel();
        if self
            .sender
            .send(CallMessage::Leave { reply: Some(reply) })
            .await
            .is_err()
        {
            return Ok(());
        }
        match tokio::time::timeout(self.leave_timeout, confirmed).await {
            Ok(_) => Ok(()),
            Err(_) => Err(CallError::Timeout("leaving the call")),
        }
    }
}

/// Weak reference to a call. Check it with [`CallSubscription::upgrade`]
/// before every use.
#[derive(Debug, Clone)]
pub struct CallSubscription {
    call_id: CallId,
    sender: mpsc::WeakSender<CallMessage>,
    leave_timeout: Duration,
}

impl CallSubscription {
    pub fn call_id(&self) -> &CallId {
        &self.call_id
    }

    pub fn upgrade(&self) -> Option<CallHandle> {
        self.sender
            .upgrade()
            .filter(|sender| !sender.is_closed())
            .map(|sender| CallHandle {
                call_id: self.call_id,
                sender,
                leave_timeout: self.leave_timeout,
            })
    }
}

/// A freshly spawned call.
pub struct SpawnedCall {
    pub handle: CallHandle,
    pub events: mpsc::UnboundedReceiver<CallEvent>,
    /// Resolves with the local slot once joined, or with the join error.
    pub joined: oneshot::Receiver<Result<ParticipantId, CallError>>,
}

/// Starts the actor for one call. Joining begins immediately.
pub fn spawn(params: CallParams, deps: CallDependencies) -> SpawnedCall {
    let call_id = params.start.call_id(&params.group);
    let (sender, mailbox) = mpsc::channel(deps.config.mailbox_capacity.max(1));
    let (events, events_rx) = mpsc::unbounded_channel();
    let (joined_tx, joined) = oneshot::channel();
    let handle = CallHandle {
        call_id,
        sender: sender.clone(),
        leave_timeout: deps.config.leave_timeout,
    };
    let actor = CallActor {
        call_id,
        weak: sender.downgrade(),
        params,
        deps,
        machine: CallStateMachine::default(),
        events,
        adapter: None,
        adapter_events: None,
        context: None,
        peek_task: None,
    };
    drop(sender);
    tokio::spawn(actor.run(mailbox, joined_tx));
    SpawnedCall {
        handle,
        events: events_rx,
        joined,
    }
}

enum JoinRace {
    Finished(Result<ParticipantId, CallError>),
    Abandoned(Option<oneshot::Sender<()>>),
}

struct CallActor {
    call_id: CallId,
    weak: mpsc::WeakSender<CallMessage>,
    params: CallParams,
    deps: CallDependencies,
    machine: CallStateMachine,
    events: mpsc::UnboundedSender<CallEvent>,
    /// Held between building the connection and creating the context.
    adapter: Option<PeerConnectionAdapter>,
    adapter_events: Option<mpsc::Receiver<AdapterEvent>>,
    context: Option<CallContext>,
    peek_task: Option<AbortHandle>,
}

async fn next_adapter_event(
    events: &mut Option<mpsc::Receiver<AdapterEvent>>,
) -> Option<AdapterEvent> {
    match events.as_mut() {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

async fn peek_once(
    credentials: &dyn CredentialProvider,
    sfu: &SfuClient,
    base: &SfuBaseUrl,
    call_id: &CallId,
    peek_timeout: Duration,
) -> Result<PeekResponse, SfuError> {
    let token = credentials.sfu_token(false).await?;
    tokio::time::timeout(peek_timeout, sfu.peek(base, &token, call_id))
        .await
        .map_err(|_| SfuError::Timeout)?
}

impl CallActor {
    async fn run(
        mut self,
        mut mailbox: mpsc::Receiver<CallMessage>,
        joined: oneshot::Sender<Result<ParticipantId, CallError>>,
    ) {
        info!(target: "GroupCall/Actor", "Joining call {}", self.call_id);
        let mut deferred = Vec::new();
        let race = {
            let join = self.join();
            tokio::pin!(join);
            loop {
                tokio::select! {
                    result = &mut join => break JoinRace::Finished(result),
                    message = mailbox.recv() => match message {
                        None => break JoinRace::Abandoned(None),
                        Some(CallMessage::Leave { reply }) => break JoinRace::Abandoned(reply),
                        Some(
                            message @ (CallMessage::SetCapture { .. }
                            | CallMessage::ApplyPendingMediaKeys { .. }),
                        ) => deferred.push(message),
                        Some(other) => debug!(target: "GroupCall/Actor", "Ignoring {other:?} while joining"),
                    },
                }
            }
        };

        let local_id = match race {
            JoinRace::Finished(Ok(local_id)) => local_id,
            JoinRace::Finished(Err(e)) => {
                error!(target: "GroupCall/Actor", "Join of {} failed: {e}", self.call_id);
                let reason = EndReason::join_failed(e.class(), e.to_string());
                self.abort_join(reason).await;
                let _ = joined.send(Err(e));
                return;
            }
            JoinRace::Abandoned(reply) => {
                info!(target: "GroupCall/Actor", "Join of {} abandoned", self.call_id);
                self.abort_join(EndReason::UserLeft).await;
                let _ = joined.send(Err(CallError::ActorGone));
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
                return;
            }
        };
        let _ = joined.send(Ok(local_id));
        info!(target: "GroupCall/Actor", "Joined call {} as {local_id}", self.call_id);

        // Departures seen while connecting may have scheduled a key switch.
        let mut ended = None;
        for message in deferred {
            if let Err(e) = self.handle_command(message).await {
                if e.is_fatal() {
                    ended = Some((EndReason::failed(e.class(), e.to_string()), None));
                    break;
                }
                warn!(target: "GroupCall/Actor", "Ignoring error: {e}");
            }
        }
        let (reason, reply) = match ended {
            Some(ended) => ended,
            None => self.joined_loop(&mut mailbox).await,
        };
        self.teardown(reason).await;
        if let Some(reply) = reply {
            let _ = reply.send(());
        }
    }

    async fn joined_loop(
        &mut self,
        mailbox: &mut mpsc::Receiver<CallMessage>,
    ) -> (EndReason, Option<oneshot::Sender<()>>) {
        if let Some(context) = self.context.as_mut() {
            context.start_state_update_task_if_necessary();
        }
        loop {
            let result = tokio::select! {
                message = mailbox.recv() => match message {
                    None => return (EndReason::UserLeft, None),
                    Some(CallMessage::Leave { reply }) => return (EndReason::UserLeft, reply),
                    Some(message) => self.handle_command(message).await,
                },
                event = next_adapter_event(&mut self.adapter_events) => match event {
                    Some(event) => self.handle_adapter_event(event).await.map(|_| None),
                    None => Err(CallError::DataChannelClosed),
                },
            };
            match result {
                Ok(None) => {}
                Ok(Some(reason)) => return (reason, None),
                Err(e) if e.is_fatal() => {
                    error!(target: "GroupCall/Actor", "Call {} failed: {e}", self.call_id);
                    return (EndReason::failed(e.class(), e.to_string()), None);
                }
                Err(e) => warn!(target: "GroupCall/Actor", "Ignoring error: {e}"),
            }
        }
    }

    fn emit(&self, event: CallEvent) {
        let _ = self.events.send(event);
    }

    fn transition(&mut self, transition: CallTransition) -> Result<(), CallError> {
        let state = self.machine.apply_transition(transition)?.clone();
        debug!(target: "GroupCall/Actor", "Call {} is now {state:?}", self.call_id);
        self.emit(CallEvent::StateChanged {
            call_id: self.call_id,
            state,
        });
        Ok(())
    }

    fn context_mut(&mut self) -> Result<&mut CallContext, CallError> {
        self.context
            .as_mut()
            .ok_or(CallError::PeerConnection(PeerConnectionError::Closed))
    }

    async fn token(&self, force_refresh: bool) -> Result<SfuToken, CallError> {
        let fetch = self.deps.credentials.sfu_token(force_refresh);
        let token = tokio::time::timeout(self.deps.config.credential_refresh_timeout, fetch)
            .await
            .map_err(|_| CallError::Timeout("fetching SFU credentials"))??;
        Ok(token)
    }

    /// Narrows the start message's SFU to what the token allows.
    fn checked_base_url(&self, token: &SfuToken) -> Result<SfuBaseUrl, CallError> {
        let base = &self.params.start.sfu_base_url;
        if token.allowed_hostname_suffixes.is_empty() {
            return Ok(base.clone());
        }
        Ok(SfuBaseUrl::parse(
            base.as_str(),
            &token.allowed_hostname_suffixes,
        )?)
    }

    async fn join(&mut self) -> Result<ParticipantId, CallError> {
        self.transition(CallTransition::Connect)?;
        let config = Arc::clone(&self.deps.config);

        let mut token = self.token(false).await?;
        let base = self.checked_base_url(&token)?;
        let connection_config = PeerConnectionConfig {
            enable_ipv6: config.allow_ipv6_candidates,
            ..PeerConnectionConfig::default()
        };
        let (adapter, adapter_events) =
            PeerConnectionAdapter::build(self.deps.peer_connections.as_ref(), &connection_config)
                .await?;
        let fingerprint = adapter.dtls_fingerprint();
        self.adapter = Some(adapter);
        self.adapter_events = Some(adapter_events);

        let mut refreshed = false;
        let response = loop {
            match self
                .deps
                .sfu
                .join(&base, &token, &self.call_id, SUPPORTED_PROTOCOL_VERSION, &fingerprint)
                .await
            {
                Err(SfuError::Unauthorized) if !refreshed => {
                    warn!(target: "GroupCall/Actor", "SFU rejected the token, refreshing once");
                    refreshed = true;
                    token = self.token(true).await?;
                }
                other => break other?,
            }
        };

        let local_id = ParticipantId(response.participant_id);
        Mids::for_participant(local_id)?;
        let header_extensions = HeaderExtensions::negotiate(&response)?;
        let session = RemoteSessionParameters::from_join_response(&response)?;
        self.transition(CallTransition::JoinAccepted {
            participant_id: local_id,
        })?;
        info!(
            target: "GroupCall/Actor",
            "SFU accepted {local_id} (max {} participants, fallback extensions: {})",
            response.max_participants,
            header_extensions.is_fallback
        );

        let adapter = self
            .adapter
            .take()
            .ok_or(CallError::PeerConnection(PeerConnectionError::Closed))?;
        let context = CallContext::new(
            CallContextParams {
                call_id: self.call_id,
                local_id,
                identity: self.params.identity.clone(),
                keys: GroupCallKeys::derive(self.params.start.gck.clone())?,
                session,
                header_extensions,
                microphone_on: self.params.microphone_on,
                camera_on: self.params.camera_on,
            },
            adapter,
            config,
            self.weak.clone(),
        )?;
        self.context.insert(context).start().await?;
        self.await_established().await?;
        self.transition(CallTransition::Established)?;
        Ok(local_id)
    }

    /// Waits for ICE to connect and for the SFU's hello.
    async fn await_established(&mut self) -> Result<(), CallError> {
        let connect_timeout = self.deps.config.connect_timeout;
        let wait = async {
            let mut ice_connected = false;
            let mut greeted = false;
            while !(ice_connected && greeted) {
                match next_adapter_event(&mut self.adapter_events).await {
                    Some(AdapterEvent::IceStateChanged(IceConnectionState::Connected)) => {
                        ice_connected = true;
                    }
                    Some(AdapterEvent::IceStateChanged(IceConnectionState::Failed)) => {
                        return Err(CallError::IceFailed);
                    }
                    Some(AdapterEvent::Message(data)) => {
                        greeted |= self.handle_data(&data).await?;
                    }
                    Some(AdapterEvent::DataChannelClosed) | None => {
                        return Err(CallError::DataChannelClosed);
                    }
                    Some(AdapterEvent::IceStateChanged(IceConnectionState::Closed)) => {
                        return Err(CallError::PeerConnection(PeerConnectionError::Closed));
                    }
                    Some(other) => {
                        debug!(target: "GroupCall/Actor", "While connecting: {other:?}");
                    }
                }
            }
            Ok::<(), CallError>(())
        };
        tokio::time::timeout(connect_timeout, wait)
            .await
            .map_err(|_| CallError::Timeout("connecting to the SFU"))?
    }

    /// Returns whether the message was the SFU's hello.
    async fn handle_data(&mut self, data: &[u8]) -> Result<bool, CallError> {
        let action = self.context_mut()?.handle_sfu_message(data).await;
        self.apply_action(action).await
    }

    async fn apply_action(&mut self, action: MessageResponseAction) -> Result<bool, CallError> {
        match action {
            MessageResponseAction::None => {}
            MessageResponseAction::Discard { reason } => {
                debug!(target: "GroupCall/Actor", "Discarded message: {reason:?}");
            }
            MessageResponseAction::SfuHelloReceived(change) => {
                self.announce_membership(&change);
                return Ok(true);
            }
            MessageResponseAction::ParticipantsChanged(change) => {
                self.announce_membership(&change);
            }
            MessageResponseAction::ParticipantJoined {
                participant,
                identity,
                nickname,
            } => self.emit(CallEvent::ParticipantJoined {
                participant,
                identity,
                nickname,
            }),
            MessageResponseAction::CaptureStateChanged {
                participant,
                device,
                on,
            } => {
                self.emit(CallEvent::RemoteCaptureChanged {
                    participant,
                    device,
                    on,
                });
                if device == CaptureDevice::Camera {
                    self.follow_remote_camera(participant, on).await?;
                }
            }
            MessageResponseAction::RekeyApplied {
                participant,
                outcome,
            } => debug!(target: "GroupCall/Actor", "{participant} rekeyed: {outcome:?}"),
            MessageResponseAction::Hold(participant) => {
                self.emit(CallEvent::RemoteHold { participant })
            }
            MessageResponseAction::RemoveParticipant(participant) => {
                warn!(target: "GroupCall/Actor", "Removing {participant} after repeated protocol errors");
                let change = self
                    .context_mut()?
                    .update_participants(&[], &[participant], true)
                    .await?;
                self.announce_membership(&change);
            }
            MessageResponseAction::PropagateError(e) => return Err(e),
        }
        Ok(false)
    }

    fn announce_membership(&self, change: &MembershipChange) {
        for participant in &change.removed {
            self.emit(CallEvent::ParticipantRemoved {
                participant: *participant,
            });
        }
        for participant in &change.added {
            self.emit(CallEvent::ParticipantAdded {
                participant: *participant,
            });
        }
    }

    /// Subscribes to a remote camera when it turns on, and back off when it stops.
    async fn follow_remote_camera(
        &mut self,
        participant: ParticipantId,
        on: bool,
    ) -> Result<(), CallError> {
        let context = self.context_mut()?;
        let subscribed = context
            .participant(participant)
            .and_then(|record| record.camera_subscription())
            .is_some();
        match (on, subscribed) {
            (true, false) => {
                context
                    .subscribe_camera(participant, DEFAULT_CAMERA_SUBSCRIPTION)
                    .await
            }
            (false, true) => context.unsubscribe_camera(participant).await,
            _ => Ok(()),
        }
    }

    async fn set_capture(&mut self, device: CaptureDevice, on: bool) -> Result<(), CallError> {
        self.context_mut()?.set_capture(device, on).await
    }

    async fn handle_command(&mut self, message: CallMessage) -> Result<Option<EndReason>, CallError> {
        match message {
            CallMessage::Leave { .. } => {}
            CallMessage::SetCapture { device, on } => self.set_capture(device, on).await?,
            CallMessage::SubscribeCamera {
                participant,
                subscription,
            } => {
                self.context_mut()?
                    .subscribe_camera(participant, subscription)
                    .await?
            }
            CallMessage::UnsubscribeCamera { participant } => {
                self.context_mut()?.unsubscribe_camera(participant).await?
            }
            CallMessage::StateUpdateTick => {
                self.context_mut()?.send_call_state_if_leader().await?;
                self.start_peek();
            }
            CallMessage::PeekCompleted(result) => {
                self.peek_task = None;
                return self.handle_peek(result);
            }
            CallMessage::ApplyPendingMediaKeys { epoch } => {
                let applied = self.context_mut()?.apply_pending_media_keys(epoch).await?;
                if let Some(epoch) = applied {
                    self.emit(CallEvent::MediaKeysReplaced { epoch });
                }
            }
        }
        Ok(None)
    }

    /// Peeks the SFU in the background to notice a call that ended silently.
    fn start_peek(&mut self) {
        if self.peek_task.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let credentials = Arc::clone(&self.deps.credentials);
        let sfu = self.deps.sfu.clone();
        let base = self.params.start.sfu_base_url.clone();
        let call_id = self.call_id;
        let peek_timeout = self.deps.config.peek_timeout;
        let mailbox = self.weak.clone();
        let task = tokio::spawn(async move {
            let result = peek_once(credentials.as_ref(), &sfu, &base, &call_id, peek_timeout).await;
            if let Some(sender) = mailbox.upgrade() {
                let _ = sender.send(CallMessage::PeekCompleted(result)).await;
            }
        });
        self.peek_task = Some(task.abort_handle());
    }

    fn handle_peek(
        &mut self,
        result: Result<PeekResponse, SfuError>,
    ) -> Result<Option<EndReason>, CallError> {
        match result {
            Ok(response) => {
                if let Some(sealed) = response.encrypted_call_state {
                    let opened = self.context_mut()?.open_call_state(&sealed);
                    match opened {
                        Ok(state) => self.emit(CallEvent::CallStateRefreshed {
                            participants: state.participants.len(),
                        }),
                        Err(e) => warn!(target: "GroupCall/Actor", "Unreadable call state: {e}"),
                    }
                }
                Ok(None)
            }
            Err(SfuError::NotFound) => {
                info!(target: "GroupCall/Actor", "SFU no longer knows call {}", self.call_id);
                Ok(Some(EndReason::CallEnded))
            }
            Err(e) => {
                warn!(target: "GroupCall/Actor", "Peek of {} failed: {e}", self.call_id);
                Ok(None)
            }
        }
    }

    async fn handle_adapter_event(&mut self, event: AdapterEvent) -> Result<(), CallError> {
        match event {
            AdapterEvent::IceStateChanged(IceConnectionState::Failed) => Err(CallError::IceFailed),
            AdapterEvent::IceStateChanged(IceConnectionState::Closed) => {
                Err(CallError::PeerConnection(PeerConnectionError::Closed))
            }
            AdapterEvent::IceStateChanged(IceConnectionState::Disconnected) => {
                warn!(target: "GroupCall/Actor", "ICE disconnected, waiting for recovery");
                Ok(())
            }
            AdapterEvent::IceStateChanged(state) => {
                debug!(target: "GroupCall/Actor", "ICE state {state:?}");
                Ok(())
            }
            AdapterEvent::DataChannelOpen => Ok(()),
            AdapterEvent::Message(data) => self.handle_data(&data).await.map(|_| ()),
            AdapterEvent::DataChannelClosed => Err(CallError::DataChannelClosed),
            AdapterEvent::LocalCaptureChanged { device, on } => {
                self.emit(CallEvent::LocalCaptureChanged { device, on });
                Ok(())
            }
        }
    }

    fn stop_background(&mut self) {
        if let Some(task) = self.peek_task.take() {
            task.abort();
        }
    }

    async fn release_connection(&mut self) {
        self.stop_background();
        if let Some(context) = self.context.as_mut() {
            context.leave().await;
        }
        self.context = None;
        if let Some(adapter) = self.adapter.take() {
            adapter.close().await;
        }
        self.adapter_events = None;
    }

    async fn abort_join(&mut self, reason: EndReason) {
        self.release_connection().await;
        if matches!(
            self.machine.state(),
            CallState::Connecting { .. } | CallState::Joining { .. }
        ) {
            let _ = self.transition(CallTransition::Abort);
        }
        self.emit(CallEvent::Ended {
            call_id: self.call_id,
            reason,
        });
    }

    async fn teardown(&mut self, reason: EndReason) {
        if let Err(e) = self.transition(CallTransition::Leave {
            reason: reason.clone(),
        }) {
            warn!(target: "GroupCall/Actor", "Teardown from unexpected state: {e}");
        }
        self.release_connection().await;
        let _ = self.transition(CallTransition::TornDown);
        info!(target: "GroupCall/Actor", "Call {} ended: {reason:?}", self.call_id);
        self.emit(CallEvent::Ended {
            call_id: self.call_id,
            reason,
        });
    }
}
