use std::io::Read;

use bytes::Bytes;
use tracing::trace;

use crate::codec::{decode_header, IpcFrame, HEADER_SIZE};
use crate::error::{FrameError, Result};
use crate::io::fill;

/// Reads complete IPC frames from any `Read` stream.
///
/// Reads exactly one header and one payload per frame, so nothing past the
/// current frame is consumed from the stream.
#[derive(Debug)]
pub struct FrameReader<T> {
    inner: T,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Read the next complete frame (blocking).
    ///
    /// The IPC stream has no clean end: end-of-input before a header is
    /// `ConnectionClosed`, and inside a frame it is a truncation error.
    pub fn read_frame(&mut self) -> Result<IpcFrame> {
        let mut header = [0u8; HEADER_SIZE];
        match fill(&mut self.inner, &mut header)? {
            0 => return Err(FrameError::ConnectionClosed),
            HEADER_SIZE => {}
            read => {
                return Err(FrameError::TruncatedHeader {
                    expected: HEADER_SIZE,
                    read,
                })
            }
        }

        let (opcode, len) = decode_header(&header)?;

        let mut payload = vec![0u8; len];
        let read = fill(&mut self.inner, &mut payload)?;
        if read != len {
            return Err(FrameError::TruncatedPayload {
                expected: len,
                read,
            });
        }

        trace!(%opcode, len, "read ipc frame");
        Ok(IpcFrame {
            opcode,
            payload: Bytes::from(payload),
        })
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
