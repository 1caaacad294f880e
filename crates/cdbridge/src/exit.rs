use std::fmt;
use std::io;

use cdbridge_engine::EngineError;
use cdbridge_frame::FrameError;
use cdbridge_transport::TransportError;

// Exit codes follow the sysexits-style table used across the workspace.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const HEALTH_CHECK_FAILED: i32 = 30;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    if err.is_framing() {
        return CliError::new(DATA_INVALID, format!("{context}: {err}"));
    }
    match err {
        FrameError::Io(source) => io_error(context, source),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

pub fn engine_error(context: &str, err: EngineError) -> CliError {
    if err.is_protocol() {
        return CliError::new(DATA_INVALID, format!("{context}: {err}"));
    }
    match err {
        EngineError::Transport(err) => transport_error(context, err),
        EngineError::Frame(err) => frame_error(context, err),
        EngineError::Spawn { .. } => CliError::new(INTERNAL, format!("{context}: {err}")),
        other => CliError::new(FAILURE, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use cdbridge_frame::Opcode;

    use super::*;

    #[test]
    fn framing_violations_are_data_invalid() {
        let err = frame_error(
            "read",
            FrameError::PayloadTooLarge {
                size: 4097,
                max: 4096,
            },
        );
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("read: "));

        let err = engine_error(
            "relay",
            EngineError::UnexpectedOpcode {
                opcode: Opcode::Frame,
            },
        );
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn missing_desktop_is_transport_error() {
        let err = transport_error(
            "dial",
            TransportError::NoEndpoint {
                tried: 10,
                last: Box::new(TransportError::Unsupported),
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);

        let err = transport_error(
            "dial",
            TransportError::Connect {
                path: "/tmp/discord-ipc-0".into(),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            },
        );
        assert_eq!(err.code, PERMISSION_DENIED);
    }

    #[test]
    fn framing_inside_engine_error_is_data_invalid() {
        let err = engine_error("relay", EngineError::Frame(FrameError::UnknownOpcode(9)));
        assert_eq!(err.code, DATA_INVALID);

        let err = engine_error("relay", EngineError::Frame(FrameError::ConnectionClosed));
        assert_eq!(err.code, FAILURE);
    }

    #[test]
    fn remote_close_is_plain_failure() {
        let err = engine_error("relay", EngineError::RemoteClosed("bye".to_string()));
        assert_eq!(err.code, FAILURE);
        assert_eq!(err.to_string(), "relay: peer closed the connection: bye");
    }
}
