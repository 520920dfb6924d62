//! Call-start announcements.
//!
//! A call-start message carries the protocol version, the GCK and the SFU
//! base URL. The URL is attacker-influenced (any group member can send it),
//! so it must be `https` and its host must match an allow-listed suffix on a
//! label boundary before any request is made to it.

use crate::keys::{GroupCallKey, KeyError};
use crate::types::CallId;
use gcproto::groupcall::GroupCallStart;
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;
use url::{Host, Url};

/// Protocol version this engine speaks.
pub const SUPPORTED_PROTOCOL_VERSION: u32 = 1;

const CALL_ID_DOMAIN: &[u8] = b"groupcall/call-id";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StartMessageError {
    #[error("unsupported protocol version {0}")]
    UnsupportedProtocolVersion(u32),
    #[error("invalid group call key: {0}")]
    InvalidGck(#[from] KeyError),
    #[error("SFU base URL must use https")]
    InsecureScheme,
    #[error("malformed SFU base URL: {0}")]
    MalformedUrl(&'static str),
    #[error("unparsable SFU base URL: {0}")]
    UnparsableUrl(#[from] url::ParseError),
    #[error("SFU hostname {0} is not allowed")]
    HostnameNotAllowed(String),
}

/// A validated SFU base URL.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SfuBaseUrl {
    url: String,
    host: String,
}

impl fmt::Debug for SfuBaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SfuBaseUrl({})", self.url)
    }
}

impl fmt::Display for SfuBaseUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

impl SfuBaseUrl {
    /// Parses and checks `raw` against the allowed hostname suffixes.
    pub fn parse<S: AsRef<str>>(raw: &str, allowed_suffixes: &[S]) -> Result<Self, StartMessageError> {
        let url = Url::parse(raw.trim())?;
        if url.scheme() != "https" {
            return Err(StartMessageError::InsecureScheme);
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(StartMessageError::MalformedUrl("credentials in authority"));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(StartMessageError::MalformedUrl("query or fragment in base URL"));
        }
        let host = match url.host() {
            Some(Host::Domain(domain)) => domain.trim_end_matches('.').to_string(),
            Some(Host::Ipv4(_) | Host::Ipv6(_)) => {
                return Err(StartMessageError::MalformedUrl("IP literal host"));
            }
            None => return Err(StartMessageError::MalformedUrl("empty host")),
        };
        if host.is_empty() {
            return Err(StartMessageError::MalformedUrl("empty host"));
        }

        if !allowed_suffixes
            .iter()
            .any(|suffix| host_matches_suffix(&host, suffix.as_ref()))
        {
            return Err(StartMessageError::HostnameNotAllowed(host));
        }

        let port = url.port().map(|port| format!(":{port}")).unwrap_or_default();
        let path = url.path().trim_end_matches('/');
        Ok(Self {
            url: format!("https://{host}{port}{path}"),
            host,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Joins `path` onto the base URL.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.url, path.trim_start_matches('/'))
    }
}

fn host_matches_suffix(host: &str, suffix: &str) -> bool {
    let suffix = suffix.trim().trim_start_matches('.').to_ascii_lowercase();
    if suffix.is_empty() {
        return false;
    }
    host == suffix || host.ends_with(&format!(".{suffix}"))
}

/// Identity of the group a call belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupIdentity {
    pub creator: String,
    pub id: Vec<u8>,
}

/// A validated call-start message.
#[derive(Debug, Clone)]
pub struct GroupCallStartData {
    pub protocol_version: u32,
    pub gck: GroupCallKey,
    pub sfu_base_url: SfuBaseUrl,
}

impl GroupCallStartData {
    /// Validates a received call-start message.
    pub fn from_wire<S: AsRef<str>>(
        message: &GroupCallStart,
        allowed_suffixes: &[S],
    ) -> Result<Self, StartMessageError> {
        if message.protocol_version != SUPPORTED_PROTOCOL_VERSION {
            return Err(StartMessageError::UnsupportedProtocolVersion(
                message.protocol_version,
            ));
        }
        Ok(Self {
            protocol_version: message.protocol_version,
            gck: GroupCallKey::from_slice(&message.gck)?,
            sfu_base_url: SfuBaseUrl::parse(&message.sfu_base_url, allowed_suffixes)?,
        })
    }

    /// Builds the announcement for a call started locally.
    pub fn new_outgoing(sfu_base_url: SfuBaseUrl) -> Self {
        Self {
            protocol_version: SUPPORTED_PROTOCOL_VERSION,
            gck: GroupCallKey::generate(),
            sfu_base_url,
        }
    }

    pub fn to_wire(&self) -> GroupCallStart {
        GroupCallStart {
            protocol_version: self.protocol_version,
            gck: self.gck.as_bytes().to_vec(),
            sfu_base_url: self.sfu_base_url.as_str().to_string(),
        }
    }

    /// Derives the call ID every member of `group` computes for this call.
    pub fn call_id(&self, group: &GroupIdentity) -> CallId {
        let mut hasher = Sha256::new();
        hasher.update(CALL_ID_DOMAIN);
        hasher.update((group.creator.len() as u32).to_be_bytes());
        hasher.update(group.creator.as_bytes());
        hasher.update((group.id.len() as u32).to_be_bytes());
        hasher.update(&group.id);
        hasher.update(self.protocol_version.to_be_bytes());
        hasher.update(self.gck.as_bytes());
        hasher.update(self.sfu_base_url.as_str().as_bytes());
        CallId(hasher.finalize().into())
    }
}
