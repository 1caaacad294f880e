//! Wire framing for both sides of the bridge.
//!
//! Extension host (native messaging), see [`native`]:
//! - A 4-byte payload length in the machine's native byte order
//! - At most [`MAX_PAYLOAD`] bytes of payload
//!
//! Desktop IPC, see [`codec`]:
//! - A 4-byte little-endian [`Opcode`]
//! - A 4-byte little-endian payload length
//!
//! Readers and writers loop over short reads and writes; callers always see
//! whole frames.

mod io;

pub mod codec;
pub mod error;
pub mod native;
pub mod opcode;
pub mod reader;
pub mod writer;

pub use codec::{decode_header, encode_frame, IpcFrame, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use native::{NativeReader, NativeWriter, MAX_PAYLOAD};
pub use opcode::Opcode;
pub use reader::FrameReader;
pub use writer::FrameWriter;
