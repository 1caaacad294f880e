//! Protocol engines for the browser/desktop bridge.
//!
//! - [`host`]: pulls one request at a time from the browser over native
//!   messaging and writes back exactly one response per request.
//! - [`client`]: drives a desktop IPC connection, tagging the first frame as
//!   a handshake, answering pings and detecting remote close.
//! - [`relay`]: forwards each host request through the client and returns
//!   the reply, and [`Bridge`] wires all three together on threads.

pub mod client;
pub mod error;
pub mod host;
pub mod relay;

pub use client::{Client, ClientHandle, ClientState};
pub use error::{EngineError, Result};
pub use host::{Host, HostCloser, HostHandle, Responder};
pub use relay::{error_payload, relay, Bridge};
