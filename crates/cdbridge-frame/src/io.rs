use std::io::{ErrorKind, Read, Write};

use crate::error::{FrameError, Result};

/// Read until `buf` is full or the stream ends.
///
/// Returns how many bytes were read; less than `buf.len()` means the stream
/// hit end-of-input first.
pub(crate) fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

/// Write all of `buf`, then flush.
///
/// A write that accepts zero bytes means the peer is gone.
pub(crate) fn drain<W: Write>(writer: &mut W, buf: &[u8]) -> Result<()> {
    let mut offset = 0usize;
    while offset < buf.len() {
        match writer.write(&buf[offset..]) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }

    loop {
        match writer.flush() {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    struct TwoBytesAtATime<'a>(&'a [u8]);

    impl Read for TwoBytesAtATime<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.0.len().min(buf.len()).min(2);
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    #[test]
    fn fill_loops_over_short_reads() {
        let mut reader = TwoBytesAtATime(b"abcdefg");
        let mut buf = [0u8; 5];
        assert_eq!(fill(&mut reader, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"abcde");
    }

    #[test]
    fn fill_reports_short_count_at_eof() {
        let mut reader = Cursor::new(b"ab".to_vec());
        let mut buf = [0u8; 4];
        assert_eq!(fill(&mut reader, &mut buf).unwrap(), 2);
    }

    struct OneByteWriter(Vec<u8>);

    impl Write for OneByteWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.push(buf[0]);
            Ok(1)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn drain_loops_over_partial_writes() {
        let mut writer = OneByteWriter(Vec::new());
        drain(&mut writer, b"partial").unwrap();
        assert_eq!(writer.0, b"partial");
    }
}
