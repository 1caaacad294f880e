use std::io::Write;

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_frame, IpcFrame};
use crate::error::Result;
use crate::io::drain;
use crate::opcode::Opcode;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete IPC frames to any `Write` stream.
#[derive(Debug)]
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> FrameWriter<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &IpcFrame) -> Result<()> {
        self.send(frame.opcode, frame.payload.as_ref())
    }

    /// Encode and send a payload tagged with `opcode`, then flush.
    pub fn send(&mut self, opcode: Opcode, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_frame(opcode, payload, &mut self.buf)?;
        drain(&mut self.inner, &self.buf)?;
        trace!(%opcode, len = payload.len(), "wrote ipc frame");
        Ok(())
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, ErrorKind};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::error::FrameError;
    use crate::reader::FrameReader;

    fn written(writer: FrameWriter<Cursor<Vec<u8>>>) -> FrameReader<Cursor<Vec<u8>>> {
        FrameReader::new(Cursor::new(writer.into_inner().into_inner()))
    }

    #[test]
    fn write_multiple_frames() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        writer.send(Opcode::Handshake, b"one").unwrap();
        writer.send(Opcode::Frame, b"two").unwrap();
        writer.write_frame(&IpcFrame::new(Opcode::Pong, "three")).unwrap();

        let mut wire = written(writer);
        assert_eq!(wire.read_frame().unwrap(), IpcFrame::new(Opcode::Handshake, "one"));
        assert_eq!(wire.read_frame().unwrap(), IpcFrame::new(Opcode::Frame, "two"));
        assert_eq!(wire.read_frame().unwrap(), IpcFrame::new(Opcode::Pong, "three"));
        assert!(matches!(wire.read_frame(), Err(FrameError::ConnectionClosed)));
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = FrameWriter::new(sink);

        writer.send(Opcode::Frame, b"x").unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    /// Accepts at most three bytes per call, failing every other call with
    /// `Interrupted`.
    struct StutteringWriter {
        interrupt_next: bool,
        data: Vec<u8>,
    }

    impl Write for StutteringWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.interrupt_next = !self.interrupt_next;
            if !self.interrupt_next {
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            let n = buf.len().min(3);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn partial_and_interrupted_writes_complete() {
        let mut writer = FrameWriter::new(StutteringWriter {
            interrupt_next: false,
            data: Vec::new(),
        });
        writer.send(Opcode::Frame, b"split into pieces").unwrap();

        let mut wire = FrameReader::new(Cursor::new(writer.into_inner().data));
        let frame = wire.read_frame().unwrap();
        assert_eq!(frame, IpcFrame::new(Opcode::Frame, "split into pieces"));
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send(Opcode::Frame, b"x").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn broken_pipe_propagates() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::from(ErrorKind::BrokenPipe))
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let err = FrameWriter::new(Broken).send(Opcode::Frame, b"x").unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }
}
