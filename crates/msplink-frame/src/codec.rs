use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Preamble bytes: "$M" (0x24 0x4D).
pub const PREAMBLE: [u8; 2] = [0x24, 0x4D];

/// Direction marker for request frames ('<'): host to firmware.
pub const MARKER_REQUEST: u8 = 0x3C;

/// Direction marker for response frames ('>'): firmware to host.
pub const MARKER_RESPONSE: u8 = 0x3E;

/// Maximum payload size, bounded by the one-byte length field.
pub const MAX_PAYLOAD: usize = 255;

/// Frame header: "$M" (2) + direction (1) + length (1) + command (1).
pub const HEADER_SIZE: usize = 5;

/// Frame trailer: checksum (1).
pub const TRAILER_SIZE: usize = 1;

/// Which party a frame travels toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to firmware ('<').
    Request,
    /// Firmware to host ('>').
    Response,
}

impl Direction {
    /// The on-wire marker byte for this direction.
    pub const fn marker(self) -> u8 {
        match self {
            Direction::Request => MARKER_REQUEST,
            Direction::Response => MARKER_RESPONSE,
        }
    }

    /// Parse a marker byte. Returns `None` for anything but '<' or '>'.
    pub fn from_marker(byte: u8) -> Option<Self> {
        match byte {
            MARKER_REQUEST => Some(Direction::Request),
            MARKER_RESPONSE => Some(Direction::Response),
            _ => None,
        }
    }
}

/// A complete MSP frame.
///
/// The payload is opaque at this layer; interpreting it is the business of
/// command-specific parsers above the codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Which way the frame travels.
    pub direction: Direction,
    /// MSP command code.
    pub command: u8,
    /// The opaque payload (0–255 bytes).
    pub payload: Bytes,
}

impl Frame {
    /// Create a request frame.
    pub fn request(command: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            direction: Direction::Request,
            command,
            payload: payload.into(),
        }
    }

    /// Create a response frame.
    pub fn response(command: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            direction: Direction::Response,
            command,
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload + checksum).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len() + TRAILER_SIZE
    }
}

/// MSP v1 checksum: XOR of the length byte, the command byte, and every
/// payload byte.
pub fn checksum(command: u8, payload: &[u8]) -> u8 {
    payload
        .iter()
        .fold(payload.len() as u8 ^ command, |acc, b| acc ^ b)
}

/// Encode a request frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬────────────┬───────────┬─────────────────┬──────────────┐
/// │ Preamble (2B)│ Direction │ Length (1B)│ Command   │ Payload          │ Checksum (1B)│
/// │ 0x24 0x4D    │ '<' / '>' │ 0-255      │ (1B)      │ (Length bytes)   │ XOR(L,C,P..) │
/// │ "$M"         │           │            │           │                  │              │
/// └──────────────┴───────────┴────────────┴───────────┴─────────────────┴──────────────┘
/// ```
///
/// The host is always the requesting party, so this emits the '<' marker.
pub fn encode_frame(command: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    encode_frame_with_direction(Direction::Request, command, payload, dst)
}

/// Encode a frame with an explicit direction marker.
///
/// The checksum rule is identical in both directions; this exists so test
/// doubles and bridges can emit firmware-side ('>') frames.
pub fn encode_frame_with_direction(
    direction: Direction,
    command: u8,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len() + TRAILER_SIZE);
    dst.put_slice(&PREAMBLE);
    dst.put_u8(direction.marker());
    dst.put_u8(payload.len() as u8);
    dst.put_u8(command);
    dst.put_slice(payload);
    dst.put_u8(checksum(command, payload));
    Ok(())
}
