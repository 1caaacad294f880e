use cdbridge_frame::Opcode;

/// Errors that terminate an engine or fail a caller's exchange.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] cdbridge_transport::TransportError),

    /// Frame-level error (framing violation or I/O on the stream).
    #[error("frame error: {0}")]
    Frame(#[from] cdbridge_frame::FrameError),

    /// The peer sent a frame that no outstanding request was waiting for.
    #[error("unexpected {opcode} frame with no request outstanding")]
    UnexpectedOpcode { opcode: Opcode },

    /// The peer sent CLOSE.
    #[error("peer closed the connection: {0}")]
    RemoteClosed(String),

    /// The engine has stopped; no further exchanges are possible.
    #[error("engine closed: {0}")]
    Closed(String),

    /// A worker thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
}

impl EngineError {
    /// Whether a peer broke the wire protocol: a malformed frame or a frame
    /// nothing was waiting for. A remote CLOSE is not a violation.
    pub fn is_protocol(&self) -> bool {
        match self {
            Self::Frame(err) => err.is_framing(),
            Self::UnexpectedOpcode { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
