//! MSP v1 frame codec.
//!
//! This is the byte-level core of msplink. Every message is framed with:
//! - A "$M" preamble for stream synchronization
//! - A direction marker ('<' host-to-firmware, '>' firmware-to-host)
//! - A 1-byte payload length and 1-byte command code
//! - An XOR checksum over length, command, and payload
//!
//! The [`Decoder`] consumes one byte at a time and is indifferent to how
//! the transport chunks the stream; [`encode_frame`] and the decoder are
//! exact inverses. No partial reads, no buffer management in user code.

pub mod codec;
pub mod command;
pub mod decoder;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    checksum, encode_frame, encode_frame_with_direction, Direction, Frame, HEADER_SIZE,
    MARKER_REQUEST, MARKER_RESPONSE, MAX_PAYLOAD, PREAMBLE, TRAILER_SIZE,
};
pub use command::command_name;
pub use decoder::{DecodeOutcome, Decoder};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
