/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the maximum size for its protocol.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The stream ended part way through a frame header.
    #[error("wanted {expected}-byte header, read {read} bytes")]
    TruncatedHeader { expected: usize, read: usize },

    /// The stream ended before the declared payload length was read.
    #[error("wanted {expected}-byte payload, read {read} bytes")]
    TruncatedPayload { expected: usize, read: usize },

    /// An IPC header declared a negative payload length.
    #[error("negative payload length {0} in frame header")]
    NegativeLength(i32),

    /// An IPC header carried an opcode outside the known set.
    #[error("unknown opcode {0}")]
    UnknownOpcode(i32),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer is gone: the stream ended before a frame, or accepted no bytes on write.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// True for malformed or out-of-bounds frames, as opposed to transport failures.
    ///
    /// Neither kind can be recovered from: neither protocol has a way to
    /// resynchronise a stream once a frame boundary is lost.
    pub fn is_framing(&self) -> bool {
        !matches!(self, FrameError::Io(_) | FrameError::ConnectionClosed)
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
