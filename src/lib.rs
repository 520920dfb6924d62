// Core types and crypto live in gccore; the wire messages in gcproto.
pub use gccore;
pub use gcproto::groupcall as proto;

pub mod calls;
pub mod config;
pub mod http;

#[cfg(test)]
mod test_utils;
