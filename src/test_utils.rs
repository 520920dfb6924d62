use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use gccore::mids::Mid;
use gcproto::groupcall::{Address, DtlsParameters, IceParameters, JoinResponse};
use tokio::sync::mpsc;

use crate::calls::peer_connection::{
    IceCandidate, PeerConnection, PeerConnectionConfig, PeerConnectionError, PeerConnectionEvent,
    PeerConnectionFactory,
};
use crate::calls::sfu::{CredentialProvider, SfuError, SfuToken};
use crate::http::{HttpClient, HttpRequest, HttpResponse};

pub const MOCK_ANSWER: &str = "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\ns=-\r\nt=0 0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\na=fmtp:111 minptime=10;useinbandfec=1\r\n";

enum Scripted {
    Response(u16, Vec<u8>),
    Failure(String),
}

/// Replays queued responses in order and records every request.
#[derive(Default)]
pub struct MockHttpClient {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, status: u16, body: Vec<u8>) {
        self.lock_script().push_back(Scripted::Response(status, body));
    }

    pub fn push_failure(&self, message: &str) {
        self.lock_script()
            .push_back(Scripted::Failure(message.to_string()));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .expect("request log poisoned")
            .clone()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Scripted>> {
        self.script.lock().expect("script poisoned")
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, anyhow::Error> {
        self.requests
            .lock()
            .expect("request log poisoned")
            .push(request);
        match self.lock_script().pop_front() {
            Some(Scripted::Response(status_code, body)) => Ok(HttpResponse { status_code, body }),
            Some(Scripted::Failure(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("no scripted response left")),
        }
    }
}

pub fn test_token() -> SfuToken {
    SfuToken {
        token: "test-token".to_string(),
        allowed_hostname_suffixes: vec!["sfu.example.org".to_string()],
        expires_at: Utc::now() + ChronoDuration::hours(1),
    }
}

/// Hands out `test_token()` and counts how often it was asked.
#[derive(Default)]
pub struct StaticCredentialProvider {
    calls: AtomicUsize,
    forced: AtomicUsize,
}

impl StaticCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn forced_refreshes(&self) -> usize {
        self.forced.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn sfu_token(&self, force_refresh: bool) -> Result<SfuToken, SfuError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if force_refresh {
            self.forced.fetch_add(1, Ordering::SeqCst);
        }
        Ok(test_token())
    }
}

/// A successful join response for the given slot.
pub fn test_join_response(participant_id: u32) -> JoinResponse {
    JoinResponse {
        started_at: 1_700_000_000_000,
        max_participants: 32,
        participant_id,
        addresses: vec![Address {
            protocol: "udp".to_string(),
            port: 3478,
            ip: "203.0.113.10".to_string(),
        }],
        ice_parameters: Some(IceParameters {
            username_fragment: "sfuufrag".to_string(),
            password: "sfupassword".to_string(),
        }),
        dtls_parameters: Some(DtlsParameters {
            fingerprint: vec![0x5a; 32],
        }),
        header_extensions: Vec::new(),
    }
}

/// Records everything the engine asks the platform connection to do.
#[derive(Default)]
pub struct MockPeerConnection {
    remote_descriptions: Mutex<Vec<String>>,
    local_descriptions: Mutex<Vec<String>>,
    candidates: Mutex<Vec<IceCandidate>>,
    transceivers: Mutex<HashMap<String, bool>>,
    sent: Mutex<Vec<Bytes>>,
    closes: AtomicUsize,
}

impl MockPeerConnection {
    pub fn remote_descriptions(&self) -> Vec<String> {
        self.remote_descriptions.lock().expect("poisoned").clone()
    }

    pub fn local_descriptions(&self) -> Vec<String> {
        self.local_descriptions.lock().expect("poisoned").clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().expect("poisoned").clone()
    }

    /// Last state set on the transceiver for `mid`, if any.
    pub fn transceiver(&self, mid: &str) -> Option<bool> {
        self.transceivers.lock().expect("poisoned").get(mid).copied()
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.sent.lock().expect("poisoned").clone()
    }

    /// Drains the messages sent so far.
    pub fn take_sent(&self) -> Vec<Bytes> {
        std::mem::take(&mut *self.sent.lock().expect("poisoned"))
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerConnection for MockPeerConnection {
    fn dtls_fingerprint(&self) -> Vec<u8> {
        vec![0xc3; 32]
    }

    async fn set_remote_description(&self, sdp: &str) -> Result<(), PeerConnectionError> {
        self.remote_descriptions
            .lock()
            .expect("poisoned")
            .push(sdp.to_string());
        Ok(())
    }

    async fn create_answer(&self) -> Result<String, PeerConnectionError> {
        Ok(MOCK_ANSWER.to_string())
    }

    async fn set_local_description(&self, sdp: &str) -> Result<(), PeerConnectionError> {
        self.local_descriptions
            .lock()
            .expect("poisoned")
            .push(sdp.to_string());
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), PeerConnectionError> {
        self.candidates
            .lock()
            .expect("poisoned")
            .push(candidate.clone());
        Ok(())
    }

    async fn set_transceiver_active(
        &self,
        mid: &Mid,
        active: bool,
    ) -> Result<(), PeerConnectionError> {
        self.transceivers
            .lock()
            .expect("poisoned")
            .insert(mid.as_str().to_string(), active);
        Ok(())
    }

    async fn send_data(&self, data: Bytes) -> Result<(), PeerConnectionError> {
        self.sent.lock().expect("poisoned").push(data);
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Creates [`MockPeerConnection`]s and lets tests inject platform events.
#[derive(Default)]
pub struct MockPeerConnectionFactory {
    fail: bool,
    connection: Mutex<Option<Arc<MockPeerConnection>>>,
    events: Mutex<Option<mpsc::Sender<PeerConnectionEvent>>>,
}

impl MockPeerConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// The most recently created connection.
    pub fn connection(&self) -> Arc<MockPeerConnection> {
        self.try_connection().expect("no connection created yet")
    }

    pub fn try_connection(&self) -> Option<Arc<MockPeerConnection>> {
        self.connection.lock().expect("poisoned").clone()
    }

    pub async fn emit(&self, event: PeerConnectionEvent) {
        let sender = self.events.lock().expect("poisoned").clone();
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }

    /// Drops the platform side of the event stream.
    pub fn disconnect(&self) {
        self.events.lock().expect("poisoned").take();
    }
}

#[async_trait]
impl PeerConnectionFactory for MockPeerConnectionFactory {
    async fn create(
        &self,
        _config: &PeerConnectionConfig,
    ) -> Result<(Arc<dyn PeerConnection>, mpsc::Receiver<PeerConnectionEvent>), PeerConnectionError>
    {
        if self.fail {
            return Err(PeerConnectionError::CannotInitialize(
                "no WebRTC stack".to_string(),
            ));
        }
        let connection = Arc::new(MockPeerConnection::default());
        let (tx, rx) = mpsc::channel(32);
        *self.connection.lock().expect("poisoned") = Some(Arc::clone(&connection));
        *self.events.lock().expect("poisoned") = Some(tx);
        Ok((connection, rx))
    }
}
