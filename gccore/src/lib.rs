//! Runtime-free building blocks of the group call engine.
//!
//! Everything in this crate is synchronous and deterministic given its
//! inputs (plus the OS RNG where fresh key material is required). The async
//! engine in the root crate drives these types from a single call actor.

pub use gcproto;

pub mod crypto;
pub mod header_extensions;
pub mod keys;
pub mod media_keys;
pub mod mids;
pub mod p2p;
pub mod start;
pub mod types;
pub mod vault;

pub use header_extensions::{HeaderExtensionError, HeaderExtensionMap, HeaderExtensions};
pub use keys::{GroupCallKey, GroupCallKeys, KeyError};
pub use media_keys::{FrameCrypto, MediaKeySet};
pub use mids::{MidError, Mids};
pub use start::{GroupCallStartData, StartMessageError};
pub use types::{CallId, MediaKind, ParticipantId};
pub use vault::{MediaKeyVault, VaultError};
