//! Chrome/Discord bridge.
//!
//! A Chrome native messaging host that relays each request from a browser
//! extension to the Discord desktop application's local IPC socket and
//! returns the reply.
//!
//! # Crate Structure
//!
//! - [`transport`]: Unix domain socket streams and desktop endpoint discovery
//! - [`frame`]: native messaging and desktop IPC wire framing
//! - [`engine`]: the host and client protocol engines and the relay loop

/// Re-export transport types.
pub mod transport {
    pub use cdbridge_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use cdbridge_frame::*;
}

/// Re-export engine types.
pub mod engine {
    pub use cdbridge_engine::*;
}
