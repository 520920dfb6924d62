//! RTP header-extension ID negotiation.
//!
//! The SFU may announce the one-byte extension IDs it wants per purpose in its
//! join response. When it announces none, both sides use the fixed tables
//! below. Audio carries fewer extensions than camera/screen media since it
//! has no simulcast layers and no orientation.

use gcproto::groupcall::{HeaderExtension, HeaderExtensionPurpose, JoinResponse};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

pub const URI_MID: &str = "urn:ietf:params:rtp-hdrext:sdes:mid";
pub const URI_RTP_STREAM_ID: &str = "urn:ietf:params:rtp-hdrext:sdes:rtp-stream-id";
pub const URI_REPAIRED_RTP_STREAM_ID: &str =
    "urn:ietf:params:rtp-hdrext:sdes:repaired-rtp-stream-id";
pub const URI_ABS_SEND_TIME: &str = "http://www.webrtc.org/experiments/rtp-hdrext/abs-send-time";
pub const URI_TRANSPORT_WIDE_CC: &str =
    "http://www.ietf.org/id/draft-holmer-rmcat-transport-wide-cc-extensions-01";
pub const URI_VIDEO_ORIENTATION: &str = "urn:3gpp:video-orientation";
pub const URI_TOFFSET: &str = "urn:ietf:params:rtp-hdrext:toffset";

/// Valid one-byte RTP header-extension IDs (RFC 8285).
pub const VALID_ID_RANGE: std::ops::RangeInclusive<u32> = 1..=14;

const MICROPHONE_PURPOSES: [HeaderExtensionPurpose; 3] = [
    HeaderExtensionPurpose::Mid,
    HeaderExtensionPurpose::AbsSendTime,
    HeaderExtensionPurpose::TransportWideCc,
];

const CAMERA_PURPOSES: [HeaderExtensionPurpose; 7] = [
    HeaderExtensionPurpose::Mid,
    HeaderExtensionPurpose::RtpStreamId,
    HeaderExtensionPurpose::RepairedRtpStreamId,
    HeaderExtensionPurpose::AbsSendTime,
    HeaderExtensionPurpose::TransportWideCc,
    HeaderExtensionPurpose::VideoOrientation,
    HeaderExtensionPurpose::Toffset,
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeaderExtensionError {
    #[error("header extension id {id} for {purpose} is outside 1..=14")]
    IdOutOfRange { purpose: &'static str, id: u32 },
    #[error("unknown header extension purpose {0}")]
    UnknownPurpose(i32),
    #[error("header extension {0} announced more than once")]
    DuplicatePurpose(&'static str),
    #[error("header extension id {0} assigned to more than one purpose")]
    DuplicateId(u32),
    #[error("join response lacks header extension {0}")]
    Missing(&'static str),
}

/// The URI of an extension purpose.
pub fn uri_for(purpose: HeaderExtensionPurpose) -> &'static str {
    match purpose {
        HeaderExtensionPurpose::Mid => URI_MID,
        HeaderExtensionPurpose::RtpStreamId => URI_RTP_STREAM_ID,
        HeaderExtensionPurpose::RepairedRtpStreamId => URI_REPAIRED_RTP_STREAM_ID,
        HeaderExtensionPurpose::AbsSendTime => URI_ABS_SEND_TIME,
        HeaderExtensionPurpose::TransportWideCc => URI_TRANSPORT_WIDE_CC,
        HeaderExtensionPurpose::VideoOrientation => URI_VIDEO_ORIENTATION,
        HeaderExtensionPurpose::Toffset => URI_TOFFSET,
    }
}

fn fallback_id(purpose: HeaderExtensionPurpose) -> u8 {
    match purpose {
        HeaderExtensionPurpose::Mid => 1,
        HeaderExtensionPurpose::RtpStreamId => 2,
        HeaderExtensionPurpose::RepairedRtpStreamId => 3,
        HeaderExtensionPurpose::AbsSendTime => 4,
        HeaderExtensionPurpose::TransportWideCc => 5,
        HeaderExtensionPurpose::VideoOrientation => 11,
        HeaderExtensionPurpose::Toffset => 12,
    }
}

/// Extension ID to URI map for one class of media.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderExtensionMap(BTreeMap<u8, &'static str>);

impl HeaderExtensionMap {
    fn from_ids(
        purposes: &[HeaderExtensionPurpose],
        ids: &HashMap<HeaderExtensionPurpose, u8>,
    ) -> Result<Self, HeaderExtensionError> {
        let mut map = BTreeMap::new();
        for purpose in purposes {
            let id = ids
                .get(purpose)
                .copied()
                .ok_or(HeaderExtensionError::Missing(purpose.as_str_name()))?;
            map.insert(id, uri_for(*purpose));
        }
        Ok(Self(map))
    }

    pub fn get(&self, id: u8) -> Option<&'static str> {
        self.0.get(&id).copied()
    }

    pub fn id_of(&self, uri: &str) -> Option<u8> {
        self.0
            .iter()
            .find_map(|(id, u)| (*u == uri).then_some(*id))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in ascending ID order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &'static str)> + '_ {
        self.0.iter().map(|(id, uri)| (*id, *uri))
    }
}

/// Negotiated header-extension maps of a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderExtensions {
    pub microphone: HeaderExtensionMap,
    pub camera: HeaderExtensionMap,
    /// Whether the fallback table was used.
    pub is_fallback: bool,
}

impl HeaderExtensions {
    /// The fixed tables used when the SFU announces no IDs.
    pub fn fallback() -> Self {
        let ids: HashMap<_, _> = CAMERA_PURPOSES
            .iter()
            .map(|p| (*p, fallback_id(*p)))
            .collect();
        // Every purpose has a fallback id, so neither lookup can miss.
        let microphone = HeaderExtensionMap::from_ids(&MICROPHONE_PURPOSES, &ids)
            .unwrap_or_default();
        let camera = HeaderExtensionMap::from_ids(&CAMERA_PURPOSES, &ids).unwrap_or_default();
        Self {
            microphone,
            camera,
            is_fallback: true,
        }
    }

    /// Reads the IDs announced in a join response.
    ///
    /// An empty announcement selects the fallback tables. A non-empty one must
    /// be complete and valid; nothing falls back once the SFU has spoken.
    pub fn negotiate(response: &JoinResponse) -> Result<Self, HeaderExtensionError> {
        Self::from_announced(&response.header_extensions)
    }

    pub fn from_announced(announced: &[HeaderExtension]) -> Result<Self, HeaderExtensionError> {
        if announced.is_empty() {
            return Ok(Self::fallback());
        }

        let mut ids: HashMap<HeaderExtensionPurpose, u8> = HashMap::new();
        let mut seen_ids: HashMap<u8, HeaderExtensionPurpose> = HashMap::new();
        for extension in announced {
            let purpose = HeaderExtensionPurpose::try_from(extension.purpose)
                .map_err(|_| HeaderExtensionError::UnknownPurpose(extension.purpose))?;
            if !VALID_ID_RANGE.contains(&extension.id) {
                return Err(HeaderExtensionError::IdOutOfRange {
                    purpose: purpose.as_str_name(),
                    id: extension.id,
                });
            }
            let id = extension.id as u8;
            if ids.insert(purpose, id).is_some() {
                return Err(HeaderExtensionError::DuplicatePurpose(
                    purpose.as_str_name(),
                ));
            }
            if seen_ids.insert(id, purpose).is_some() {
                return Err(HeaderExtensionError::DuplicateId(extension.id));
            }
        }

        Ok(Self {
            microphone: HeaderExtensionMap::from_ids(&MICROPHONE_PURPOSES, &ids)?,
            camera: HeaderExtensionMap::from_ids(&CAMERA_PURPOSES, &ids)?,
            is_fallback: false,
        })
    }
}
