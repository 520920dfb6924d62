//! WebRTC capability seam and the adapter the call context drives it through.
//!
//! The platform supplies a [`PeerConnectionFactory`]; the engine never talks
//! to a WebRTC stack directly. [`PeerConnectionAdapter`] merges the
//! connection's ICE and data-channel callbacks with local capture changes
//! into one ordered [`AdapterEvent`] stream and filters ICE state changes
//! through a small state machine so consumers only ever see legal
//! transitions.

use async_trait::async_trait;
use bytes::Bytes;
use gcproto::groupcall::CaptureDevice;
use gccore::mids::Mid;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// SCTP stream id of the pre-negotiated participant-to-SFU data channel.
pub const DATA_CHANNEL_ID: u16 = 0;
pub const DATA_CHANNEL_LABEL: &str = "p2s";

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeerConnectionError {
    #[error("cannot initialize peer connection: {0}")]
    CannotInitialize(String),
    #[error("session negotiation failed: {0}")]
    Negotiation(String),
    #[error("unknown transceiver {0}")]
    UnknownTransceiver(String),
    #[error("data channel send failed: {0}")]
    Send(String),
    #[error("peer connection is closed")]
    Closed,
}

/// ICE connection state as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl IceConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

/// Raw callbacks from the platform connection.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerConnectionEvent {
    IceConnectionStateChanged(IceConnectionState),
    DataChannelOpen,
    DataChannelMessage(Bytes),
    DataChannelClosed,
}

/// Events observed by the call context, in delivery order.
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    IceStateChanged(IceConnectionState),
    DataChannelOpen,
    Message(Bytes),
    DataChannelClosed,
    LocalCaptureChanged { device: CaptureDevice, on: bool },
}

/// ICE candidate for the SFU.
///
/// The format follows RFC 5245.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceCandidate {
    /// The candidate string (e.g., "candidate:0 1 udp 2130706431 203.0.113.7 443 typ host")
    pub candidate: String,
    /// SDP media stream identification
    pub sdp_mid: Option<String>,
    /// SDP media line index
    pub sdp_m_line_index: Option<u16>,
    /// Username fragment for ICE
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
            username_fragment: None,
        }
    }

    pub fn with_sdp_mid(mut self, sdp_mid: impl Into<String>) -> Self {
        self.sdp_mid = Some(sdp_mid.into());
        self
    }

    pub fn with_sdp_m_line_index(mut self, index: u16) -> Self {
        self.sdp_m_line_index = Some(index);
        self
    }

    pub fn with_username_fragment(mut self, ufrag: impl Into<String>) -> Self {
        self.username_fragment = Some(ufrag.into());
        self
    }
}

/// Settings the platform must apply when creating the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerConnectionConfig {
    pub data_channel_id: u16,
    pub data_channel_label: String,
    /// Every media line shares one transport.
    pub max_bundle: bool,
    pub require_rtcp_mux: bool,
    /// Restrict SRTP to AEAD-GCM profiles.
    pub require_gcm_srtp: bool,
    pub enable_ipv6: bool,
}

impl Default for PeerConnectionConfig {
    fn default() -> Self {
        Self {
            data_channel_id: DATA_CHANNEL_ID,
            data_channel_label: DATA_CHANNEL_LABEL.to_string(),
            max_bundle: true,
            require_rtcp_mux: true,
            require_gcm_srtp: true,
            enable_ipv6: true,
        }
    }
}

/// One platform peer connection with a single pre-negotiated data channel.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// SHA-256 fingerprint of the local DTLS certificate.
    fn dtls_fingerprint(&self) -> Vec<u8>;

    async fn set_remote_description(&self, sdp: &str) -> Result<(), PeerConnectionError>;

    async fn create_answer(&self) -> Result<String, PeerConnectionError>;

    async fn set_local_description(&self, sdp: &str) -> Result<(), PeerConnectionError>;

    async fn add_ice_candidate(&self, candidate: &IceCandidate) -> Result<(), PeerConnectionError>;

    /// Enables or disables media flow on the transceiver bound to `mid`.
    async fn set_transceiver_active(&self, mid: &Mid, active: bool)
    -> Result<(), PeerConnectionError>;

    async fn send_data(&self, data: Bytes) -> Result<(), PeerConnectionError>;

    async fn close(&self);
}

/// A factory responsible for creating new peer connections.
#[async_trait]
pub trait PeerConnectionFactory: Send + Sync {
    /// Creates a connection and returns it, along with a stream of its events.
    async fn create(
        &self,
        config: &PeerConnectionConfig,
    ) -> Result<(Arc<dyn PeerConnection>, mpsc::Receiver<PeerConnectionEvent>), PeerConnectionError>;
}

/// Filters raw ICE state reports down to legal transitions.
#[derive(Debug, Clone)]
pub struct IceStateTracker {
    state: IceConnectionState,
}

impl Default for IceStateTracker {
    fn default() -> Self {
        Self {
            state: IceConnectionState::New,
        }
    }
}

impl IceStateTracker {
    pub fn state(&self) -> IceConnectionState {
        self.state
    }

    /// Returns the new state if `next` is a legal transition from the current one.
    pub fn apply(&mut self, next: IceConnectionState) -> Option<IceConnectionState> {
        use IceConnectionState::*;
        let legal = match (self.state, next) {
            (current, next) if current == next => false,
            (Failed | Closed, _) => false,
            (_, Failed | Closed) => true,
            (New, Checking | Connected) => true,
            (Checking, Connected | Disconnected) => true,
            (Connected, Disconnected | Checking) => true,
            (Disconnected, Connected | Checking) => true,
            _ => false,
        };
        if legal {
            self.state = next;
            Some(next)
        } else {
            None
        }
    }
}

/// Owns one peer connection for the lifetime of a call session.
pub struct PeerConnectionAdapter {
    connection: Arc<dyn PeerConnection>,
    events: mpsc::Sender<AdapterEvent>,
    forwarder: AbortHandle,
    closed: AtomicBool,
}

impl PeerConnectionAdapter {
    pub async fn build(
        factory: &dyn PeerConnectionFactory,
        config: &PeerConnectionConfig,
    ) -> Result<(Self, mpsc::Receiver<AdapterEvent>), PeerConnectionError> {
        let (connection, raw_events) = factory.create(config).await.map_err(|e| match e {
            PeerConnectionError::CannotInitialize(_) => e,
            other => PeerConnectionError::CannotInitialize(other.to_string()),
        })?;
        let (events, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let forwarder = tokio::spawn(forward_events(raw_events, events.clone())).abort_handle();
        info!(target: "PeerConnection", "Peer connection created");
        Ok((
            Self {
                connection,
                events,
                forwarder,
                closed: AtomicBool::new(false),
            },
            receiver,
        ))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn dtls_fingerprint(&self) -> Vec<u8> {
        self.connection.dtls_fingerprint()
    }

    fn ensure_open(&self) -> Result<(), PeerConnectionError> {
        if self.is_closed() {
            Err(PeerConnectionError::Closed)
        } else {
            Ok(())
        }
    }

    /// Applies the locally generated remote offer and returns the local answer.
    pub async fn negotiate(
        &self,
        remote_offer: &str,
        patch_answer: impl FnOnce(&str) -> String + Send,
    ) -> Result<String, PeerConnectionError> {
        self.ensure_open()?;
        self.connection.set_remote_description(remote_offer).await?;
        let answer = patch_answer(&self.connection.create_answer().await?);
        self.connection.set_local_description(&answer).await?;
        Ok(answer)
    }

    pub async fn add_ice_candidate(
        &self,
        candidate: &IceCandidate,
    ) -> Result<(), PeerConnectionError> {
        self.ensure_open()?;
        self.connection.add_ice_candidate(candidate).await
    }

    pub async fn set_transceiver_active(
        &self,
        mid: &Mid,
        active: bool,
    ) -> Result<(), PeerConnectionError> {
        self.ensure_open()?;
        self.connection.set_transceiver_active(mid, active).await
    }

    /// Sends one message on the participant-to-SFU data channel.
    pub async fn send(&self, data: Bytes) -> Result<(), PeerConnectionError> {
        self.ensure_open()?;
        self.connection.send_data(data).await
    }

    /// Surfaces a local capture change on the event stream.
    pub fn notify_local_capture(&self, device: CaptureDevice, on: bool) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self
            .events
            .try_send(AdapterEvent::LocalCaptureChanged { device, on })
        {
            warn!(target: "PeerConnection", "Dropped local capture event: {e}");
        }
    }

    /// Closes the connection. Safe to call more than once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.forwarder.abort();
        self.connection.close().await;
        info!(target: "PeerConnection", "Peer connection closed");
    }
}

impl Drop for PeerConnectionAdapter {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

async fn forward_events(
    mut raw_events: mpsc::Receiver<PeerConnectionEvent>,
    events: mpsc::Sender<AdapterEvent>,
) {
    let mut ice = IceStateTracker::default();
    while let Some(event) = raw_events.recv().await {
        let forwarded = match event {
            PeerConnectionEvent::IceConnectionStateChanged(next) => match ice.apply(next) {
                Some(state) => AdapterEvent::IceStateChanged(state),
                None => {
                    debug!(
                        target: "PeerConnection",
                        "Ignoring ICE transition {:?} -> {next:?}",
                        ice.state()
                    );
                    continue;
                }
            },
            PeerConnectionEvent::DataChannelOpen => AdapterEvent::DataChannelOpen,
            PeerConnectionEvent::DataChannelMessage(data) => AdapterEvent::Message(data),
            PeerConnectionEvent::DataChannelClosed => AdapterEvent::DataChannelClosed,
        };
        let terminal = matches!(forwarded, AdapterEvent::IceStateChanged(s) if s.is_terminal());
        if events.send(forwarded).await.is_err() || terminal {
            return;
        }
    }
    if ice.apply(IceConnectionState::Closed).is_some() {
        let _ = events
            .send(AdapterEvent::IceStateChanged(IceConnectionState::Closed))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockPeerConnectionFactory;
    use IceConnectionState::*;

    #[test]
    fn test_ice_candidate_builder() {
        let candidate = IceCandidate::new("candidate:0 1 udp 2130706431 203.0.113.7 443 typ host")
            .with_sdp_mid("0")
            .with_sdp_m_line_index(0)
            .with_username_fragment("ufrag");
        assert_eq!(candidate.sdp_mid.as_deref(), Some("0"));
        assert_eq!(candidate.sdp_m_line_index, Some(0));
        assert_eq!(candidate.username_fragment.as_deref(), Some("ufrag"));
    }

    #[test]
    fn test_ice_tracker_transitions() {
        let mut tracker = IceStateTracker::default();
        assert_eq!(tracker.apply(Checking), Some(Checking));
        assert_eq!(tracker.apply(Checking), None);
        assert_eq!(tracker.apply(Connected), Some(Connected));
        assert_eq!(tracker.apply(New), None);
        assert_eq!(tracker.apply(Disconnected), Some(Disconnected));
        assert_eq!(tracker.apply(Connected), Some(Connected));
        assert_eq!(tracker.apply(Failed), Some(Failed));
        assert_eq!(tracker.apply(Connected), None);
        assert_eq!(tracker.state(), Failed);
    }

    /// Test that raw events are merged with local capture changes and filtered.
    #[tokio::test]
    async fn test_adapter_merges_and_filters_events() {
        let factory = MockPeerConnectionFactory::new();
        let (adapter, mut events) =
            PeerConnectionAdapter::build(&factory, &PeerConnectionConfig::default())
                .await
                .unwrap();

        factory.emit(PeerConnectionEvent::IceConnectionStateChanged(Checking)).await;
        factory.emit(PeerConnectionEvent::IceConnectionStateChanged(Checking)).await;
        factory.emit(PeerConnectionEvent::IceConnectionStateChanged(Connected)).await;
        factory
            .emit(PeerConnectionEvent::DataChannelMessage(Bytes::from_static(b"hi")))
            .await;

        assert_eq!(events.recv().await, Some(AdapterEvent::IceStateChanged(Checking)));
        assert_eq!(events.recv().await, Some(AdapterEvent::IceStateChanged(Connected)));
        assert_eq!(
            events.recv().await,
            Some(AdapterEvent::Message(Bytes::from_static(b"hi")))
        );

        adapter.notify_local_capture(CaptureDevice::Camera, true);
        assert_eq!(
            events.recv().await,
            Some(AdapterEvent::LocalCaptureChanged {
                device: CaptureDevice::Camera,
                on: true
            })
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let factory = MockPeerConnectionFactory::new();
        let (adapter, _events) =
            PeerConnectionAdapter::build(&factory, &PeerConnectionConfig::default())
                .await
                .unwrap();
        adapter.close().await;
        adapter.close().await;
        assert!(adapter.is_closed());
        assert_eq!(factory.connection().close_count(), 1);
        assert_eq!(
            adapter.send(Bytes::from_static(b"late")).await,
            Err(PeerConnectionError::Closed)
        );
    }

    #[tokio::test]
    async fn test_build_failure_maps_to_cannot_initialize() {
        let factory = MockPeerConnectionFactory::failing();
        let result = PeerConnectionAdapter::build(&factory, &PeerConnectionConfig::default()).await;
        assert!(matches!(
            result,
            Err(PeerConnectionError::CannotInitialize(_))
        ));
    }

    #[tokio::test]
    async fn test_stream_ends_with_closed_when_platform_drops() {
        let factory = MockPeerConnectionFactory::new();
        let (_adapter, mut events) =
            PeerConnectionAdapter::build(&factory, &PeerConnectionConfig::default())
                .await
                .unwrap();
        factory.emit(PeerConnectionEvent::IceConnectionStateChanged(Connected)).await;
        factory.disconnect();
        assert_eq!(events.recv().await, Some(AdapterEvent::IceStateChanged(Connected)));
        assert_eq!(events.recv().await, Some(AdapterEvent::IceStateChanged(Closed)));
    }
}
