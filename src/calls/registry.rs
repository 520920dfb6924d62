//! Registry of the group calls the client knows about.
//!
//! Calls become known through call-start announcements. A refresh loop
//! peeks every known call at the SFU to learn when it started and whether it
//! still exists; calls the SFU no longer knows are dropped. Joining a known
//! call spawns its actor and registers the handle until the actor stops.
//! `create_or_join` starts a new call when the group has none running.

use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use futures_util::future::join_all;
use gccore::start::{GroupIdentity, SfuBaseUrl};
use gccore::{CallId, GroupCallKeys, GroupCallStartData};
use gcproto::groupcall::{CallState as WireCallState, GroupCallStart, PeekResponse};
use log::{debug, info, warn};
use prost::Message;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use super::actor::{self, CallDependencies, CallHandle, CallParams, SpawnedCall};
use super::error::CallError;
use super::participant::LocalIdentity;
use super::sfu::{SfuError, SfuToken};

/// Why a known call was forgotten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// The SFU answered the peek with "not found".
    Ended,
    /// Peeks kept failing and the announcement is old.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    CallDiscovered { call_id: CallId },
    CallUpdated { call_id: CallId },
    CallRemoved { call_id: CallId, reason: RemovalReason },
    CallJoined { call_id: CallId },
    CallLeft { call_id: CallId },
}

/// Result of [`GroupCallRegistry::create_or_join`].
pub struct CreatedOrJoined {
    pub call_id: CallId,
    pub spawned: SpawnedCall,
    /// Call-start message the caller must send to the group. `None` when an
    /// already running call was joined.
    pub announcement: Option<GroupCallStart>,
}

/// What the registry knows about one call.
#[derive(Debug, Clone)]
pub struct KnownCall {
    pub call_id: CallId,
    pub group: GroupIdentity,
    pub start: GroupCallStartData,
    pub announced_at: DateTime<Utc>,
    /// Exact start time reported by the SFU, once peeked.
    pub started_at: Option<DateTime<Utc>>,
    pub max_participants: u32,
    /// Participants listed in the leader's latest call state.
    pub participant_count: Option<usize>,
    failed_peeks: u32,
}

pub struct GroupCallRegistry {
    deps: CallDependencies,
    known: DashMap<CallId, KnownCall>,
    active: DashMap<CallId, CallHandle>,
    events: mpsc::UnboundedSender<RegistryEvent>,
    refresh_task: Mutex<Option<AbortHandle>>,
}

impl Drop for GroupCallRegistry {
    fn drop(&mut self) {
        if let Ok(mut task) = self.refresh_task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}

impl GroupCallRegistry {
    pub fn new(deps: CallDependencies) -> (Arc<Self>, mpsc::UnboundedReceiver<RegistryEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                deps,
                known: DashMap::new(),
                active: DashMap::new(),
                events,
                refresh_task: Mutex::new(None),
            }),
            receiver,
        )
    }

    fn emit(&self, event: RegistryEvent) {
        let _ = self.events.send(event);
    }

    /// Validates a call-start announcement and remembers the call.
    pub fn register_call_start(
        &self,
        group: GroupIdentity,
        message: &GroupCallStart,
        announced_at: DateTime<Utc>,
    ) -> Result<CallId, CallError> {
        let start =
            GroupCallStartData::from_wire(message, &self.deps.config.allowed_sfu_hostname_suffixes)?;
        let call_id = start.call_id(&group);
        if self.known.contains_key(&call_id) {
            return Ok(call_id);
        }
        info!(
            target: "GroupCall/Registry",
            "Discovered call {call_id} on {}",
            start.sfu_base_url
        );
        self.known.insert(
            call_id,
            KnownCall {
                call_id,
                group,
                start,
                announced_at,
                started_at: None,
                max_participants: 0,
                participant_count: None,
                failed_peeks: 0,
            },
        );
        self.emit(RegistryEvent::CallDiscovered { call_id });
        Ok(call_id)
    }

    pub fn known_call(&self, call_id: &CallId) -> Option<KnownCall> {
        self.known.get(call_id).map(|call| call.clone())
    }

    pub fn known_calls(&self) -> Vec<KnownCall> {
        self.known.iter().map(|call| call.clone()).collect()
    }

    /// The call of `group` the UI should offer: the one that started first.
    pub fn chosen_call(&self, group: &GroupIdentity) -> Option<CallId> {
        self.known
            .iter()
            .filter(|call| &call.group == group)
            .min_by_key(|call| (call.started_at.is_none(), call.started_at, call.announced_at))
            .map(|call| call.call_id)
    }

    pub fn active_call(&self, call_id: &CallId) -> Option<CallHandle> {
        self.active.get(call_id).map(|handle| handle.clone())
    }

    async fn token(&self, force_refresh: bool) -> Result<SfuToken, CallError> {
        let fetch = self.deps.credentials.sfu_token(force_refresh);
        let token = tokio::time::timeout(self.deps.config.credential_refresh_timeout, fetch)
            .await
            .map_err(|_| CallError::Timeout("fetching SFU credentials"))??;
        Ok(token)
    }

    async fn peek(
        &self,
        base: &SfuBaseUrl,
        token: &SfuToken,
        call_id: &CallId,
    ) -> Result<PeekResponse, SfuError> {
        tokio::time::timeout(
            self.deps.config.peek_timeout,
            self.deps.sfu.peek(base, token, call_id),
        )
        .await
        .map_err(|_| SfuError::Timeout)?
    }

    /// Peeks every known call once. Returns how many calls remain known.
    ///
    /// A `401` is answered with one forced token refresh and a second peek.
    pub async fn refresh_group_calls(&self) -> Result<usize, CallError> {
        let targets: Vec<(CallId, SfuBaseUrl)> = self
            .known
            .iter()
            .map(|call| (call.call_id, call.start.sfu_base_url.clone()))
            .collect();
        if targets.is_empty() {
            return Ok(0);
        }

        let token = self.token(false).await?;
        let results = join_all(
            targets
                .iter()
                .map(|(call_id, base)| self.peek(base, &token, call_id)),
        )
        .await;

        let mut unauthorized = Vec::new();
        for ((call_id, base), result) in targets.into_iter().zip(results) {
            match result {
                Err(SfuError::Unauthorized) => unauthorized.push((call_id, base)),
                other => self.apply_peek(call_id, other),
            }
        }

        if !unauthorized.is_empty() {
            warn!(
                target: "GroupCall/Registry",
                "Peek rejected the token for {} call(s), refreshing once",
                unauthorized.len()
            );
            let token = self.token(true).await?;
            let results = join_all(
                unauthorized
                    .iter()
                    .map(|(call_id, base)| self.peek(base, &token, call_id)),
            )
            .await;
            for ((call_id, _), result) in unauthorized.into_iter().zip(results) {
                self.apply_peek(call_id, result);
            }
        }
        Ok(self.known.len())
    }

    fn apply_peek(&self, call_id: CallId, result: Result<PeekResponse, SfuError>) {
        let removal = match result {
            Ok(response) => {
                if let Some(mut call) = self.known.get_mut(&call_id) {
                    call.failed_peeks = 0;
                    call.started_at = Utc
                        .timestamp_millis_opt(response.started_at as i64)
                        .single();
                    call.max_participants = response.max_participants;
                    if let Some(sealed) = &response.encrypted_call_state {
                        call.participant_count = participant_count(&call.start, sealed);
                    }
                }
                self.emit(RegistryEvent::CallUpdated { call_id });
                None
            }
            Err(SfuError::NotFound) => Some(RemovalReason::Ended),
            Err(e) => {
                let config = &self.deps.config;
                let stale_after = chrono::Duration::from_std(config.stale_call_age)
                    .unwrap_or_else(|_| chrono::Duration::weeks(5200));
                match self.known.get_mut(&call_id) {
                    Some(mut call) => {
                        call.failed_peeks += 1;
                        warn!(
                            target: "GroupCall/Registry",
                            "Peek of {call_id} failed ({} in a row): {e}",
                            call.failed_peeks
                        );
                        let stale = Utc::now() - call.announced_at > stale_after;
                        (call.failed_peeks >= config.max_failed_peeks && stale)
                            .then_some(RemovalReason::Stale)
                    }
                    None => None,
                }
            }
        };
        if let Some(reason) = removal {
            if self.known.remove(&call_id).is_some() {
                info!(target: "GroupCall/Registry", "Forgetting call {call_id}: {reason:?}");
                self.emit(RegistryEvent::CallRemoved { call_id, reason });
            }
        }
    }

    /// Starts the periodic refresh. It stops with the registry.
    pub fn start_refresh_loop(self: &Arc<Self>) {
        let Ok(mut slot) = self.refresh_task.lock() else {
            return;
        };
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let registry: Weak<Self> = Arc::downgrade(self);
        let period = self.deps.config.refresh_interval;
        let task = tokio::spawn(async move {
            loop {
                let Some(strong) = registry.upgrade() else {
                    break;
                };
                match strong.refresh_group_calls().await {
                    Ok(0) => {}
                    Ok(remaining) => {
                        debug!(target: "GroupCall/Registry", "{remaining} call(s) known after refresh")
                    }
                    Err(e) => warn!(target: "GroupCall/Registry", "Refresh failed: {e}"),
                }
                drop(strong);
                tokio::time::sleep(period).await;
            }
        });
        *slot = Some(task.abort_handle());
    }

    /// Joins a known call and tracks it until its actor stops.
    pub fn join(
        self: &Arc<Self>,
        call_id: &CallId,
        identity: LocalIdentity,
        microphone_on: bool,
        camera_on: bool,
    ) -> Result<SpawnedCall, CallError> {
        if self.active_call(call_id).is_some_and(|handle| handle.is_running()) {
            return Err(CallError::AlreadyActive(*call_id));
        }
        let (group, start) = self
            .known
            .get(call_id)
            .map(|call| (call.group.clone(), call.start.clone()))
            .ok_or(CallError::UnknownCall(*call_id))?;
        let spawned = actor::spawn(
            CallParams {
                group,
                start,
                identity,
                microphone_on,
                camera_on,
            },
            self.deps.clone(),
        );
        self.active.insert(*call_id, spawned.handle.clone());
        self.emit(RegistryEvent::CallJoined { call_id: *call_id });

        let registry = Arc::downgrade(self);
        let handle = spawned.handle.clone();
        let call_id = *call_id;
        tokio::spawn(async move {
            handle.closed().await;
            if let Some(registry) = registry.upgrade() {
                let removed = registry
                    .active
                    .remove_if(&call_id, |_, active| active.same_call(&handle));
                if removed.is_some() {
                    registry.emit(RegistryEvent::CallLeft { call_id });
                }
            }
        });
        Ok(spawned)
    }
}

impl GroupCallRegistry {
    /// Joins the group's running call, or creates one on `sfu_base_url`.
    ///
    /// Known calls are refreshed first so an ended call is not chosen. A new
    /// call is registered before joining, and its announcement is returned
    /// for the caller to send.
    pub async fn create_or_join(
        self: &Arc<Self>,
        group: GroupIdentity,
        sfu_base_url: SfuBaseUrl,
        identity: LocalIdentity,
        microphone_on: bool,
        camera_on: bool,
    ) -> Result<CreatedOrJoined, CallError> {
        self.refresh_group_calls().await?;
        if let Some(call_id) = self.chosen_call(&group) {
            info!(target: "GroupCall/Registry", "Joining running call {call_id}");
            let spawned = self.join(&call_id, identity, microphone_on, camera_on)?;
            return Ok(CreatedOrJoined {
                call_id,
                spawned,
                announcement: None,
            });
        }

        let announcement = GroupCallStartData::new_outgoing(sfu_base_url).to_wire();
        let call_id = self.register_call_start(group, &announcement, Utc::now())?;
        info!(target: "GroupCall/Registry", "Created call {call_id}");
        let spawned = self.join(&call_id, identity, microphone_on, camera_on)?;
        Ok(CreatedOrJoined {
            call_id,
            spawned,
            announcement: Some(announcement),
        })
    }
}

fn participant_count(start: &GroupCallStartData, sealed: &[u8]) -> Option<usize> {
    let keys = GroupCallKeys::derive(start.gck.clone()).ok()?;
    let plaintext = keys.open_call_state(sealed).ok()?;
    WireCallState::decode(plaintext.as_slice())
        .ok()
        .map(|state| state.participants.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::sfu::SfuClient;
    use crate::config::{GroupCallConfig, RetryPolicy};
    use crate::test_utils::{MockHttpClient, MockPeerConnectionFactory, StaticCredentialProvider};
    use gccore::start::SUPPORTED_PROTOCOL_VERSION;
    use gcproto::groupcall::CallStateParticipant;
    use std::collections::HashMap;
    use std::time::Duration;

    struct Fixture {
        http: Arc<MockHttpClient>,
        credentials: Arc<StaticCredentialProvider>,
        registry: Arc<GroupCallRegistry>,
        events: mpsc::UnboundedReceiver<RegistryEvent>,
    }

    fn fixture_with(config: GroupCallConfig) -> Fixture {
        let http = Arc::new(MockHttpClient::new());
        let credentials = Arc::new(StaticCredentialProvider::new());
        let deps = CallDependencies {
            sfu: SfuClient::new(http.clone(), config.sfu_retry.clone()),
            config: Arc::new(config),
            credentials: credentials.clone(),
            peer_connections: Arc::new(MockPeerConnectionFactory::new()),
        };
        let (registry, events) = GroupCallRegistry::new(deps);
        Fixture {
            http,
            credentials,
            registry,
            events,
        }
    }

    fn config() -> GroupCallConfig {
        GroupCallConfig {
            allowed_sfu_hostname_suffixes: vec!["sfu.example.org".to_string()],
            sfu_retry: RetryPolicy {
                max_attempts: 1,
                ..RetryPolicy::default()
            },
            ..GroupCallConfig::default()
        }
    }

    fn fixture() -> Fixture {
        fixture_with(config())
    }

    fn group() -> GroupIdentity {
        GroupIdentity {
            creator: "creator".to_string(),
            id: vec![9, 9, 9],
        }
    }

    fn announcement() -> GroupCallStart {
        let base = SfuBaseUrl::parse("https://eu.sfu.example.org", &["sfu.example.org"]).unwrap();
        GroupCallStartData::new_outgoing(base).to_wire()
    }

    fn peek_response(started_at: u64) -> PeekResponse {
        PeekResponse {
            started_at,
            max_participants: 16,
            encrypted_call_state: None,
        }
    }

    fn drain(events: &mut mpsc::UnboundedReceiver<RegistryEvent>) -> Vec<RegistryEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen
    }

    #[test]
    fn test_register_validates_announcement() {
        let mut fixture = fixture();
        let wire = announcement();
        let call_id = fixture
            .registry
            .register_call_start(group(), &wire, Utc::now())
            .unwrap();

        // A repeated announcement is not a new call.
        assert_eq!(
            fixture
                .registry
                .register_call_start(group(), &wire, Utc::now())
                .unwrap(),
            call_id
        );
        assert_eq!(
            drain(&mut fixture.events),
            vec![RegistryEvent::CallDiscovered { call_id }]
        );

        let mut foreign = announcement();
        foreign.sfu_base_url = "https://sfu.attacker.net".to_string();
        assert!(matches!(
            fixture
                .registry
                .register_call_start(group(), &foreign, Utc::now()),
            Err(CallError::Start(_))
        ));

        let mut future = announcement();
        future.protocol_version = SUPPORTED_PROTOCOL_VERSION + 1;
        assert!(
            fixture
                .registry
                .register_call_start(group(), &future, Utc::now())
                .is_err()
        );
        assert_eq!(fixture.registry.known_calls().len(), 1);
    }

    /// Test that the earliest SFU start time wins, and unpeeked calls come last.
    #[test]
    fn test_chosen_call_prefers_earliest_start() {
        let fixture = fixture();
        let registry = &fixture.registry;
        let now = Utc::now();
        let first = registry
            .register_call_start(group(), &announcement(), now)
            .unwrap();
        let second = registry
            .register_call_start(group(), &announcement(), now + chrono::Duration::seconds(1))
            .unwrap();
        assert_eq!(registry.chosen_call(&group()), Some(first));

        registry.apply_peek(second, Ok(peek_response(1_700_000_000_000)));
        assert_eq!(registry.chosen_call(&group()), Some(second));

        registry.apply_peek(first, Ok(peek_response(1_600_000_000_000)));
        assert_eq!(registry.chosen_call(&group()), Some(first));

        let other = GroupIdentity {
            creator: "someone".to_string(),
            id: vec![1],
        };
        assert_eq!(registry.chosen_call(&other), None);
    }

    #[tokio::test]
    async fn test_refresh_forgets_ended_calls() {
        let mut fixture = fixture();
        let call_id = fixture
            .registry
            .register_call_start(group(), &announcement(), Utc::now())
            .unwrap();
        fixture.http.push_response(404, Vec::new());

        assert_eq!(fixture.registry.refresh_group_calls().await.unwrap(), 0);
        assert!(fixture.registry.known_call(&call_id).is_none());
        assert_eq!(
            drain(&mut fixture.events),
            vec![
                RegistryEvent::CallDiscovered { call_id },
                RegistryEvent::CallRemoved {
                    call_id,
                    reason: RemovalReason::Ended
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_refresh_updates_call_state() {
        let fixture = fixture();
        let wire = announcement();
        let call_id = fixture
            .registry
            .register_call_start(group(), &wire, Utc::now())
            .unwrap();

        let start = fixture.registry.known_call(&call_id).unwrap().start;
        let keys = GroupCallKeys::derive(start.gck.clone()).unwrap();
        let state = WireCallState {
            state_created_at: 1,
            state_created_by: 1,
            participants: HashMap::from([
                (
                    1,
                    CallStateParticipant {
                        identity: "ALICE001".to_string(),
                        nickname: "alice".to_string(),
                    },
                ),
                (
                    2,
                    CallStateParticipant {
                        identity: "BOB00002".to_string(),
                        nickname: "bob".to_string(),
                    },
                ),
            ]),
            padding: Vec::new(),
        };
        let mut response = peek_response(1_700_000_000_000);
        response.encrypted_call_state = Some(keys.seal_call_state(&state.encode_to_vec()).unwrap());
        fixture.http.push_response(200, response.encode_to_vec());

        assert_eq!(fixture.registry.refresh_group_calls().await.unwrap(), 1);
        let known = fixture.registry.known_call(&call_id).unwrap();
        assert_eq!(known.max_participants, 16);
        assert_eq!(known.participant_count, Some(2));
        assert_eq!(
            known.started_at.map(|at| at.timestamp_millis()),
            Some(1_700_000_000_000)
        );
    }

    #[tokio::test]
    async fn test_refresh_retries_unauthorized_once() {
        let fixture = fixture();
        let call_id = fixture
            .registry
            .register_call_start(group(), &announcement(), Utc::now())
            .unwrap();
        fixture.http.push_response(401, Vec::new());
        fixture
            .http
            .push_response(200, peek_response(1_700_000_000_000).encode_to_vec());

        assert_eq!(fixture.registry.refresh_group_calls().await.unwrap(), 1);
        assert_eq!(fixture.credentials.calls(), 2);
        assert_eq!(fixture.credentials.forced_refreshes(), 1);
        assert_eq!(fixture.http.requests().len(), 2);
        assert!(
            fixture
                .registry
                .known_call(&call_id)
                .unwrap()
                .started_at
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_refresh_without_calls_skips_credentials() {
        let fixture = fixture();
        assert_eq!(fixture.registry.refresh_group_calls().await.unwrap(), 0);
        assert_eq!(fixture.credentials.calls(), 0);
    }

    /// Test that failing peeks only forget a call once it is old enough.
    #[tokio::test]
    async fn test_repeated_failures_forget_stale_calls() {
        let mut fixture = fixture_with(GroupCallConfig {
            max_failed_peeks: 2,
            stale_call_age: Duration::from_secs(60),
            ..config()
        });
        let fresh = fixture
            .registry
            .register_call_start(group(), &announcement(), Utc::now())
            .unwrap();
        let stale = fixture
            .registry
            .register_call_start(
                group(),
                &announcement(),
                Utc::now() - chrono::Duration::minutes(5),
            )
            .unwrap();

        for _ in 0..2 {
            fixture.http.push_response(500, Vec::new());
            fixture.http.push_response(500, Vec::new());
            fixture.registry.refresh_group_calls().await.unwrap();
        }

        assert!(fixture.registry.known_call(&fresh).is_some());
        assert!(fixture.registry.known_call(&stale).is_none());
        assert!(drain(&mut fixture.events).contains(&RegistryEvent::CallRemoved {
            call_id: stale,
            reason: RemovalReason::Stale
        }));
    }

    fn local_identity() -> LocalIdentity {
        LocalIdentity {
            identity: "ALICE001".to_string(),
            nickname: "alice".to_string(),
        }
    }

    fn base_url() -> SfuBaseUrl {
        SfuBaseUrl::parse("https://eu.sfu.example.org", &["sfu.example.org"]).unwrap()
    }

    /// Test that a group without a running call gets a new, registered one
    /// and an announcement to send.
    #[tokio::test]
    async fn test_create_or_join_creates_new_call() {
        let mut fixture = fixture();
        let created = fixture
            .registry
            .create_or_join(group(), base_url(), local_identity(), true, false)
            .await
            .unwrap();

        let announcement = created.announcement.expect("new call must be announced");
        assert_eq!(announcement.protocol_version, SUPPORTED_PROTOCOL_VERSION);
        assert_eq!(announcement.sfu_base_url, "https://eu.sfu.example.org");
        let start = GroupCallStartData::from_wire(&announcement, &["sfu.example.org"]).unwrap();
        assert_eq!(start.call_id(&group()), created.call_id);
        assert_eq!(fixture.registry.chosen_call(&group()), Some(created.call_id));
        assert!(fixture.registry.active_call(&created.call_id).is_some());
        // Nothing was known, so nothing was peeked.
        assert!(
            fixture
                .http
                .requests()
                .iter()
                .all(|request| !request.url.contains("/v1/peek/"))
        );

        let events = drain(&mut fixture.events);
        assert_eq!(
            events[..2],
            [
                RegistryEvent::CallDiscovered {
                    call_id: created.call_id
                },
                RegistryEvent::CallJoined {
                    call_id: created.call_id
                },
            ]
        );
        created.spawned.handle.leave().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_or_join_joins_running_call() {
        let fixture = fixture();
        let call_id = fixture
            .registry
            .register_call_start(group(), &announcement(), Utc::now())
            .unwrap();
        fixture
            .http
            .push_response(200, peek_response(1_700_000_000_000).encode_to_vec());

        let joined = fixture
            .registry
            .create_or_join(group(), base_url(), local_identity(), true, false)
            .await
            .unwrap();
        assert_eq!(joined.call_id, call_id);
        assert!(joined.announcement.is_none());
        assert_eq!(fixture.registry.known_calls().len(), 1);
        assert!(fixture.http.requests()[0].url.contains("/v1/peek/"));
        assert!(fixture.registry.active_call(&call_id).is_some());
    }

    #[tokio::test]
    async fn test_join_tracks_active_call() {
        let mut fixture = fixture();
        let identity = || LocalIdentity {
            identity: "ALICE001".to_string(),
            nickname: "alice".to_string(),
        };
        let unknown = CallId([3u8; 32]);
        assert!(matches!(
            fixture.registry.join(&unknown, identity(), true, false),
            Err(CallError::UnknownCall(id)) if id == unknown
        ));

        let call_id = fixture
            .registry
            .register_call_start(group(), &announcement(), Utc::now())
            .unwrap();
        // No scripted join response: the join request fails and the call ends.
        let spawned = fixture
            .registry
            .join(&call_id, identity(), true, false)
            .unwrap();
        assert!(fixture.registry.active_call(&call_id).is_some());
        assert!(matches!(
            fixture.registry.join(&call_id, identity(), true, false),
            Err(CallError::AlreadyActive(id)) if id == call_id
        ));

        assert!(spawned.joined.await.unwrap().is_err());
        spawned.handle.closed().await;
        loop {
            match fixture.events.recv().await {
                Some(RegistryEvent::CallLeft { call_id: left }) => {
                    assert_eq!(left, call_id);
                    break;
                }
                Some(_) => continue,
                None => panic!("registry event stream closed"),
            }
        }
        assert!(fixture.registry.active_call(&call_id).is_none());
    }
}
