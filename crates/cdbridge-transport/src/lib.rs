//! Local IPC transport for the desktop side of the bridge.
//!
//! - [`IpcStream`]: a connected full-duplex stream (Unix domain socket or
//!   Windows named pipe)
//! - [`Connection`]: what the protocol engines need from a stream (a second
//!   handle for the reader thread, and a way to unblock it on shutdown)
//! - [`discovery`]: the fixed set of well-known endpoint names the desktop
//!   application listens on, and [`dial`] to connect to the first live one
//!
//! On targets with neither backend [`dial`] fails with
//! [`TransportError::Unsupported`].

pub mod discovery;
pub mod error;
pub mod traits;

#[cfg(windows)]
pub mod pipe;
#[cfg(unix)]
pub mod uds;

pub use discovery::{candidates, dial, endpoint_path, probe, DialConfig, EndpointStatus};
pub use error::{Result, TransportError};
pub use traits::{Connection, IpcStream};

#[cfg(windows)]
pub use pipe::PipeStream;
#[cfg(all(unix, any(test, feature = "listener")))]
pub use uds::UnixDomainSocket;
