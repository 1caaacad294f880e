use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::opcode::Opcode;

/// IPC frame header: opcode (4) + length (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// One desktop IPC message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpcFrame {
    pub opcode: Opcode,
    pub payload: Bytes,
}

impl IpcFrame {
    /// Create a new frame.
    pub fn new(opcode: Opcode, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬─────────────────┐
/// │ Opcode       │ Length    │ Payload         │
/// │ (4B LE i32)  │ (4B LE)   │ (Length bytes)  │
/// └──────────────┴───────────┴─────────────────┘
/// ```
pub fn encode_frame(opcode: Opcode, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = i32::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: i32::MAX as usize,
    })?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_i32_le(opcode.as_i32());
    dst.put_i32_le(len);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a header into its opcode and payload length.
///
/// No upper bound is applied to the length; the desktop peer is local and
/// trusted. Negative lengths are rejected.
pub fn decode_header(header: &[u8; HEADER_SIZE]) -> Result<(Opcode, usize)> {
    let mut src = &header[..];
    let raw_opcode = src.get_i32_le();
    let raw_len = src.get_i32_le();

    let opcode = Opcode::try_from(raw_opcode)?;
    let len = usize::try_from(raw_len).map_err(|_| FrameError::NegativeLength(raw_len))?;
    Ok((opcode, len))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::reader::FrameReader;

    fn header(buf: &BytesMut) -> [u8; HEADER_SIZE] {
        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&buf[..HEADER_SIZE]);
        header
    }

    #[test]
    fn handshake_wire_bytes() {
        let mut buf = BytesMut::new();
        encode_frame(Opcode::Handshake, br#"{"cmd":"PING"}"#, &mut buf).unwrap();

        assert_eq!(&buf[..4], &[0x00, 0x00, 0x00, 0x00]);
        assert_eq!(&buf[4..8], &[0x0E, 0x00, 0x00, 0x00]);
        assert_eq!(&buf[8..], br#"{"cmd":"PING"}"#);
    }

    #[test]
    fn encode_decode_every_opcode() {
        let opcodes = [
            Opcode::Handshake,
            Opcode::Frame,
            Opcode::Close,
            Opcode::Ping,
            Opcode::Pong,
        ];
        let mut buf = BytesMut::new();
        for opcode in opcodes {
            encode_frame(opcode, opcode.name().as_bytes(), &mut buf).unwrap();
        }

        let mut reader = FrameReader::new(Cursor::new(buf.to_vec()));
        for opcode in opcodes {
            let frame = reader.read_frame().unwrap();
            assert_eq!(frame, IpcFrame::new(opcode, opcode.name().as_bytes().to_vec()));
        }
    }

    #[test]
    fn header_decodes_opcode_and_length() {
        let mut buf = BytesMut::new();
        encode_frame(Opcode::Frame, b"hello", &mut buf).unwrap();
        assert_eq!(decode_header(&header(&buf)).unwrap(), (Opcode::Frame, 5));
    }

    #[test]
    fn decode_unknown_opcode() {
        let mut buf = BytesMut::new();
        buf.put_i32_le(9);
        buf.put_i32_le(0);
        assert!(matches!(
            decode_header(&header(&buf)),
            Err(FrameError::UnknownOpcode(9))
        ));
    }

    #[test]
    fn decode_negative_length() {
        let mut header = [0u8; HEADER_SIZE];
        header[..4].copy_from_slice(&1i32.to_le_bytes());
        header[4..].copy_from_slice(&(-2i32).to_le_bytes());
        assert!(matches!(
            decode_header(&header),
            Err(FrameError::NegativeLength(-2))
        ));
    }

    #[test]
    fn empty_payload() {
        let mut buf = BytesMut::new();
        encode_frame(Opcode::Pong, b"", &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);

        let frame = FrameReader::new(Cursor::new(buf.to_vec())).read_frame().unwrap();
        assert_eq!(frame.opcode, Opcode::Pong);
        assert!(frame.payload.is_empty());
    }
}
