//! Desktop IPC opcodes.
//!
//! The first frame a client sends is a [`Opcode::Handshake`]; every later one
//! is a [`Opcode::Frame`]. The desktop side may at any time send a
//! [`Opcode::Ping`] (answered with a [`Opcode::Pong`] echoing its payload)
//! or a [`Opcode::Close`] ending the connection.

use std::fmt;

use crate::error::FrameError;

/// Opcode carried in the first four bytes of every IPC frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Opcode {
    Handshake = 0,
    Frame = 1,
    Close = 2,
    Ping = 3,
    Pong = 4,
}

impl Opcode {
    /// The wire value.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Upper-case name as used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Handshake => "HANDSHAKE",
            Opcode::Frame => "FRAME",
            Opcode::Close => "CLOSE",
            Opcode::Ping => "PING",
            Opcode::Pong => "PONG",
        }
    }
}

impl TryFrom<i32> for Opcode {
    type Error = FrameError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Opcode::Handshake),
            1 => Ok(Opcode::Frame),
            2 => Ok(Opcode::Close),
            3 => Ok(Opcode::Ping),
            4 => Ok(Opcode::Pong),
            other => Err(FrameError::UnknownOpcode(other)),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_match_protocol() {
        let all = [
            (Opcode::Handshake, 0),
            (Opcode::Frame, 1),
            (Opcode::Close, 2),
            (Opcode::Ping, 3),
            (Opcode::Pong, 4),
        ];
        for (opcode, value) in all {
            assert_eq!(opcode.as_i32(), value);
            assert_eq!(Opcode::try_from(value).unwrap(), opcode);
        }
    }

    #[test]
    fn unknown_values_rejected() {
        assert!(matches!(Opcode::try_from(5), Err(FrameError::UnknownOpcode(5))));
        assert!(matches!(Opcode::try_from(-1), Err(FrameError::UnknownOpcode(-1))));
    }

    #[test]
    fn display_includes_name_and_value() {
        assert_eq!(Opcode::Ping.to_string(), "PING(3)");
    }
}
