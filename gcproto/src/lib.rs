//! Wire messages for SFU-routed group calls.
//!
//! `groupcall.rs` is generated from `groupcall.proto` by `build.rs` when
//! `GENERATE_PROTO` is set.

pub mod groupcall {
    include!("groupcall.rs");
}
