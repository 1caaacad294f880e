//! Extension-host (native messaging) framing.
//!
//! Wire format:
//! ```text
//! ┌────────────────────┬──────────────────┐
//! │ Length (4B native) │ Payload          │
//! │ u32, ≤ 4096        │ (Length bytes)   │
//! └────────────────────┴──────────────────┘
//! ```
//!
//! The browser writes the length in the host machine's byte order. Payloads
//! are conventionally UTF-8 JSON but are treated as opaque bytes here.

use std::io::{Read, Write};

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::error::{FrameError, Result};
use crate::io::{drain, fill};

/// Length prefix size.
pub const HEADER_SIZE: usize = 4;

/// Largest payload accepted from the browser.
pub const MAX_PAYLOAD: usize = 4096;

/// Encode a payload with its native-order length prefix.
///
/// No ceiling is applied beyond what fits the 32-bit length field; the
/// browser enforces its own limit on what it accepts from the host.
pub fn encode_message(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&len.to_ne_bytes());
    dst.put_slice(payload);
    Ok(())
}

/// Reads length-prefixed messages from the browser.
#[derive(Debug)]
pub struct NativeReader<R> {
    inner: R,
    max_payload: usize,
}

impl<R: Read> NativeReader<R> {
    /// Create a reader enforcing [`MAX_PAYLOAD`].
    pub fn new(inner: R) -> Self {
        Self::with_max_payload(inner, MAX_PAYLOAD)
    }

    /// Create a reader with an explicit payload ceiling.
    pub fn with_max_payload(inner: R, max_payload: usize) -> Self {
        Self { inner, max_payload }
    }

    /// Read the next message (blocking).
    ///
    /// Returns `Ok(None)` when the stream ends cleanly before any header byte,
    /// which is how the browser signals it has closed the port. An oversized
    /// length is rejected before any of the body is read.
    pub fn read_message(&mut self) -> Result<Option<Bytes>> {
        let mut header = [0u8; HEADER_SIZE];
        match fill(&mut self.inner, &mut header)? {
            0 => return Ok(None),
            HEADER_SIZE => {}
            read => {
                return Err(FrameError::TruncatedHeader {
                    expected: HEADER_SIZE,
                    read,
                })
            }
        }

        let len = u32::from_ne_bytes(header) as usize;
        if len > self.max_payload {
            return Err(FrameError::PayloadTooLarge {
                size: len,
                max: self.max_payload,
            });
        }

        let mut payload = vec![0u8; len];
        let read = fill(&mut self.inner, &mut payload)?;
        if read != len {
            return Err(FrameError::TruncatedPayload {
                expected: len,
                read,
            });
        }

        trace!(len, "read native message");
        Ok(Some(Bytes::from(payload)))
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Writes length-prefixed messages to the browser.
#[derive(Debug)]
pub struct NativeWriter<W> {
    inner: W,
    buf: BytesMut,
}

impl<W: Write> NativeWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(HEADER_SIZE + MAX_PAYLOAD),
        }
    }

    /// Encode and write one message in full, then flush.
    pub fn write_message(&mut self, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_message(payload, &mut self.buf)?;
        drain(&mut self.inner, &self.buf)?;
        trace!(len = payload.len(), "wrote native message");
        Ok(())
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }
}
