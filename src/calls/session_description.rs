//! SDP generation for the SFU session.
//!
//! The SFU never sends SDP. The engine synthesizes the SFU's side as a remote
//! offer from the join response (ICE credentials, DTLS fingerprint, header
//! extension IDs) and the MIDs of every participant, then lets the platform
//! answer it. Media lines are only ever appended; a departed participant's
//! lines stay in place as `inactive`.

use gccore::gcproto::groupcall::{Address, JoinResponse};
use gccore::header_extensions::HeaderExtensionMap;
use gccore::mids::Mid;
use gccore::{HeaderExtensions, Mids, ParticipantId};
use std::fmt::Write;

use super::error::CallError;
use super::peer_connection::IceCandidate;

pub const OPUS_PAYLOAD_TYPE: u8 = 111;
pub const VP8_PAYLOAD_TYPE: u8 = 96;
pub const RTX_PAYLOAD_TYPE: u8 = 97;
pub const OPUS_FMTP: &str = "minptime=10;useinbandfec=1;usedtx=1";
/// Simulcast layers the local camera sends, lowest first.
pub const SIMULCAST_RIDS: [&str; 3] = ["l", "m", "h"];
const SCTP_PORT: u16 = 5000;
const MAX_MESSAGE_SIZE: u32 = 262_144;

/// SFU-side transport parameters from the join response.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSessionParameters {
    pub ice_username_fragment: String,
    pub ice_password: String,
    pub dtls_fingerprint: Vec<u8>,
    pub addresses: Vec<Address>,
}

impl RemoteSessionParameters {
    pub fn from_join_response(response: &JoinResponse) -> Result<Self, CallError> {
        let ice = response
            .ice_parameters
            .as_ref()
            .ok_or_else(|| CallError::protocol(None, "join response without ICE parameters"))?;
        let dtls = response
            .dtls_parameters
            .as_ref()
            .ok_or_else(|| CallError::protocol(None, "join response without DTLS parameters"))?;
        if ice.username_fragment.is_empty() || ice.password.is_empty() {
            return Err(CallError::protocol(None, "empty ICE credentials"));
        }
        if dtls.fingerprint.len() != 32 {
            return Err(CallError::protocol(
                None,
                format!("DTLS fingerprint of {} bytes", dtls.fingerprint.len()),
            ));
        }
        if response.addresses.is_empty() {
            return Err(CallError::protocol(None, "join response without addresses"));
        }
        Ok(Self {
            ice_username_fragment: ice.username_fragment.clone(),
            ice_password: ice.password.clone(),
            dtls_fingerprint: dtls.fingerprint.clone(),
            addresses: response.addresses.clone(),
        })
    }
}

/// Media lines of one remote participant in the offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLine {
    pub mids: Mids,
    /// False once the participant left; the lines remain but go inactive.
    pub active: bool,
}

impl RemoteLine {
    pub fn participant(&self) -> ParticipantId {
        self.mids.participant()
    }
}

#[derive(Clone, Copy)]
enum Direction {
    SendOnly,
    RecvOnly,
    Inactive,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Self::SendOnly => "sendonly",
            Self::RecvOnly => "recvonly",
            Self::Inactive => "inactive",
        }
    }
}

/// `AB:CD:...` form used by `a=fingerprint`.
pub fn format_fingerprint(fingerprint: &[u8]) -> String {
    fingerprint
        .iter()
        .map(|b| hex::encode_upper([*b]))
        .collect::<Vec<_>>()
        .join(":")
}

/// Builds the SFU's offer. Directions are from the SFU's point of view.
pub fn remote_offer(
    session_version: u64,
    params: &RemoteSessionParameters,
    local: &Mids,
    remotes: &[RemoteLine],
    extensions: &HeaderExtensions,
) -> String {
    let mut bundle = vec![local.microphone(), local.camera()];
    for remote in remotes {
        bundle.push(remote.mids.microphone());
        bundle.push(remote.mids.camera());
    }
    bundle.push(local.data());

    let mut sdp = String::new();
    line(&mut sdp, "v=0");
    line(&mut sdp, &format!("o=- 1 {session_version} IN IP4 127.0.0.1"));
    line(&mut sdp, "s=-");
    line(&mut sdp, "t=0 0");
    line(
        &mut sdp,
        &format!(
            "a=group:BUNDLE {}",
            bundle.iter().map(Mid::as_str).collect::<Vec<_>>().join(" ")
        ),
    );
    line(&mut sdp, "a=ice-lite");
    line(&mut sdp, "a=msid-semantic: WMS *");

    audio_section(
        &mut sdp,
        params,
        &local.microphone(),
        &extensions.microphone,
        Direction::RecvOnly,
    );
    video_section(
        &mut sdp,
        params,
        &local.camera(),
        &extensions.camera,
        Direction::RecvOnly,
        true,
    );
    for remote in remotes {
        let direction = if remote.active {
            Direction::SendOnly
        } else {
            Direction::Inactive
        };
        audio_section(
            &mut sdp,
            params,
            &remote.mids.microphone(),
            &extensions.microphone,
            direction,
        );
        video_section(
            &mut sdp,
            params,
            &remote.mids.camera(),
            &extensions.camera,
            direction,
            false,
        );
    }
    application_section(&mut sdp, params, &local.data());
    sdp
}

fn line(sdp: &mut String, value: &str) {
    sdp.push_str(value);
    sdp.push_str("\r\n");
}

fn transport_attributes(sdp: &mut String, params: &RemoteSessionParameters, mid: &Mid) {
    line(sdp, "c=IN IP4 0.0.0.0");
    line(sdp, &format!("a=mid:{mid}"));
    line(sdp, &format!("a=ice-ufrag:{}", params.ice_username_fragment));
    line(sdp, &format!("a=ice-pwd:{}", params.ice_password));
    line(
        sdp,
        &format!(
            "a=fingerprint:sha-256 {}",
            format_fingerprint(&params.dtls_fingerprint)
        ),
    );
    line(sdp, "a=setup:passive");
}

fn extmaps(sdp: &mut String, extensions: &HeaderExtensionMap) {
    for (id, uri) in extensions.iter() {
        line(sdp, &format!("a=extmap:{id} {uri}"));
    }
}

fn audio_section(
    sdp: &mut String,
    params: &RemoteSessionParameters,
    mid: &Mid,
    extensions: &HeaderExtensionMap,
    direction: Direction,
) {
    line(
        sdp,
        &format!("m=audio 9 UDP/TLS/RTP/SAVPF {OPUS_PAYLOAD_TYPE}"),
    );
    transport_attributes(sdp, params, mid);
    line(sdp, "a=rtcp-mux");
    line(sdp, &format!("a={}", direction.as_str()));
    extmaps(sdp, extensions);
    line(sdp, &format!("a=rtpmap:{OPUS_PAYLOAD_TYPE} opus/48000/2"));
    line(sdp, &format!("a=rtcp-fb:{OPUS_PAYLOAD_TYPE} transport-cc"));
    line(sdp, &format!("a=fmtp:{OPUS_PAYLOAD_TYPE} {OPUS_FMTP}"));
    if matches!(direction, Direction::SendOnly) {
        line(sdp, &format!("a=msid:{mid} {mid}"));
    }
}

fn video_section(
    sdp: &mut String,
    params: &RemoteSessionParameters,
    mid: &Mid,
    extensions: &HeaderExtensionMap,
    direction: Direction,
    simulcast: bool,
) {
    line(
        sdp,
        &format!("m=video 9 UDP/TLS/RTP/SAVPF {VP8_PAYLOAD_TYPE} {RTX_PAYLOAD_TYPE}"),
    );
    transport_attributes(sdp, params, mid);
    line(sdp, "a=rtcp-mux");
    line(sdp, "a=rtcp-rsize");
    line(sdp, &format!("a={}", direction.as_str()));
    extmaps(sdp, extensions);
    line(sdp, &format!("a=rtpmap:{VP8_PAYLOAD_TYPE} VP8/90000"));
    for feedback in ["transport-cc", "ccm fir", "nack", "nack pli"] {
        line(sdp, &format!("a=rtcp-fb:{VP8_PAYLOAD_TYPE} {feedback}"));
    }
    line(sdp, &format!("a=rtpmap:{RTX_PAYLOAD_TYPE} rtx/90000"));
    line(
        sdp,
        &format!("a=fmtp:{RTX_PAYLOAD_TYPE} apt={VP8_PAYLOAD_TYPE}"),
    );
    if simulcast {
        for rid in SIMULCAST_RIDS {
            line(sdp, &format!("a=rid:{rid} recv"));
        }
        line(sdp, &format!("a=simulcast:recv {}", SIMULCAST_RIDS.join(";")));
    }
    if matches!(direction, Direction::SendOnly) {
        line(sdp, &format!("a=msid:{mid} {mid}"));
    }
}

fn application_section(sdp: &mut String, params: &RemoteSessionParameters, mid: &Mid) {
    line(sdp, "m=application 9 UDP/DTLS/SCTP webrtc-datachannel");
    transport_attributes(sdp, params, mid);
    line(sdp, &format!("a=sctp-port:{SCTP_PORT}"));
    line(sdp, &format!("a=max-message-size:{MAX_MESSAGE_SIZE}"));
}

/// Forces the Opus parameters the SFU expects onto the platform's answer.
pub fn patch_local_answer(answer: &str) -> String {
    let prefix = format!("a=fmtp:{OPUS_PAYLOAD_TYPE} ");
    let mut out = String::with_capacity(answer.len());
    for raw in answer.split_inclusive('\n') {
        let content = raw.trim_end_matches(['\r', '\n']);
        if content.starts_with(&prefix) {
            let _ = write!(out, "{prefix}{OPUS_FMTP}\r\n");
        } else {
            out.push_str(content);
            out.push_str("\r\n");
        }
    }
    out
}

/// Host candidates for the SFU's announced addresses, all on the bundle's first line.
pub fn ice_candidates(
    params: &RemoteSessionParameters,
    first_mid: &Mid,
    allow_ipv6: bool,
) -> Vec<IceCandidate> {
    params
        .addresses
        .iter()
        .filter(|address| allow_ipv6 || !address.ip.contains(':'))
        .enumerate()
        .map(|(index, address)| {
            let priority = 2_130_706_431u32.saturating_sub(index as u32);
            IceCandidate::new(format!(
                "candidate:{index} 1 {} {priority} {} {} typ host",
                address.protocol.to_ascii_lowercase(),
                address.ip,
                address.port
            ))
            .with_sdp_mid(first_mid.as_str())
            .with_sdp_m_line_index(0)
            .with_username_fragment(params.ice_username_fragment.clone())
        })
        .collect()
}
