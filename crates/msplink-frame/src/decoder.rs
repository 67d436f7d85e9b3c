use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::codec::{checksum, Direction, Frame};

/// Result of feeding one byte that completed a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// A complete frame with a valid checksum.
    Frame(Frame),
    /// A structurally complete frame whose checksum did not match.
    ///
    /// The payload is what was accumulated before the mismatch was
    /// detected; the decoder has already resynchronized.
    BadChecksum { command: u8, payload: Bytes },
}

enum State {
    /// Scanning for '$'. Anything else is inter-frame noise.
    Idle,
    GotDollar,
    GotM,
    /// Direction seen; next byte is the payload length.
    GotDirection { direction: Direction },
    /// Length seen; next byte is the command code.
    GotLength { direction: Direction, len: u8 },
    Collecting {
        direction: Direction,
        len: u8,
        command: u8,
        payload: BytesMut,
    },
    AwaitingChecksum {
        direction: Direction,
        len: u8,
        command: u8,
        payload: BytesMut,
    },
}

/// Incremental MSP frame decoder.
///
/// Consumes exactly one byte per [`push`](Decoder::push) call and emits a
/// [`DecodeOutcome`] whenever a frame completes, regardless of how the
/// transport chunks the stream. Bytes preceding a valid "$M" preamble are
/// silently discarded, which is how the decoder recovers from line noise
/// or a peer reset mid-frame. A '$' seen where 'M' or a direction marker
/// was expected restarts preamble detection instead of being discarded, so
/// a frame following a stray '$' still decodes.
///
/// Both outcomes return the decoder to the idle state; the next preamble
/// resynchronizes the stream whether or not the checksum matched.
pub struct Decoder {
    state: State,
}

impl Decoder {
    pub fn new() -> Self {
        Self { state: State::Idle }
    }

    /// Drop any partial frame and return to the idle state.
    pub fn reset(&mut self) {
        self.state = State::Idle;
    }

    /// True when no partial frame is buffered.
    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    /// Consume one byte. Returns an outcome only when a frame completes.
    pub fn push(&mut self, byte: u8) -> Option<DecodeOutcome> {
        self.state = match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => {
                if byte == b'$' {
                    State::GotDollar
                } else {
                    State::Idle
                }
            }
            State::GotDollar => {
                if byte == b'M' {
                    State::GotM
                } else {
                    trace!(byte, "expected 'M', resynchronizing");
                    Self::resync(byte)
                }
            }
            State::GotM => match Direction::from_marker(byte) {
                Some(direction) => State::GotDirection { direction },
                None => {
                    trace!(byte, "expected direction marker, resynchronizing");
                    Self::resync(byte)
                }
            },
            State::GotDirection { direction } => State::GotLength {
                direction,
                len: byte,
            },
            State::GotLength { direction, len } => {
                let command = byte;
                if len == 0 {
                    // No payload bytes to collect; checksum comes next.
                    State::AwaitingChecksum {
                        direction,
                        len,
                        command,
                        payload: BytesMut::new(),
                    }
                } else {
                    State::Collecting {
                        direction,
                        len,
                        command,
                        payload: BytesMut::with_capacity(len as usize),
                    }
                }
            }
            State::Collecting {
                direction,
                len,
                command,
                mut payload,
            } => {
                payload.extend_from_slice(&[byte]);
                if payload.len() == len as usize {
                    State::AwaitingChecksum {
                        direction,
                        len,
                        command,
                        payload,
                    }
                } else {
                    State::Collecting {
                        direction,
                        len,
                        command,
                        payload,
                    }
                }
            }
            State::AwaitingChecksum {
                direction,
                command,
                payload,
                ..
            } => {
                let payload = payload.freeze();
                let expected = checksum(command, &payload);
                let outcome = if byte == expected {
                    DecodeOutcome::Frame(Frame {
                        direction,
                        command,
                        payload,
                    })
                } else {
                    trace!(command, expected, actual = byte, "checksum mismatch");
                    DecodeOutcome::BadChecksum { command, payload }
                };
                self.state = State::Idle;
                return Some(outcome);
            }
        };
        None
    }

    fn resync(byte: u8) -> State {
        if byte == b'$' {
            State::GotDollar
        } else {
            State::Idle
        }
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_frame;

    fn decode_all(decoder: &mut Decoder, bytes: &[u8]) -> Vec<DecodeOutcome> {
        bytes.iter().filter_map(|&b| decoder.push(b)).collect()
    }

    fn encoded(command: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_frame(command, payload, &mut buf).unwrap();
        buf.to_vec()
    }

    #[test]
    fn roundtrip_all_commands() {
        let mut decoder = Decoder::new();
        for command in 0u8..=255 {
            for len in [0usize, 1, 2, 127, 254, 255] {
                let payload: Vec<u8> = (0..len).map(|i| (i as u8).wrapping_add(command)).collect();
                let outcomes = decode_all(&mut decoder, &encoded(command, &payload));

                assert_eq!(outcomes.len(), 1);
                match &outcomes[0] {
                    DecodeOutcome::Frame(frame) => {
                        assert_eq!(frame.command, command);
                        assert_eq!(frame.payload.as_ref(), payload.as_slice());
                        assert_eq!(frame.direction, Direction::Request);
                    }
                    other => panic!("expected frame, got {other:?}"),
                }
                assert!(decoder.is_idle());
            }
        }
    }

    #[test]
    fn roundtrip_all_lengths() {
        let mut decoder = Decoder::new();
        for len in 0usize..=255 {
            let payload: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let outcomes = decode_all(&mut decoder, &encoded(77, &payload));

            assert_eq!(outcomes.len(), 1);
            assert!(matches!(
                &outcomes[0],
                DecodeOutcome::Frame(frame) if frame.payload.len() == len
            ));
        }
    }

    #[test]
    fn corrupting_any_body_byte_fails_checksum() {
        let payload = [0x11, 0x22, 0x33, 0x44];
        let wire = encoded(66, &payload);

        // Byte 4 is the command, bytes 5..9 the payload. Leave the length
        // byte alone so the frame stays structurally complete.
        for index in 4..wire.len() - 1 {
            let mut corrupted = wire.clone();
            corrupted[index] ^= 0x01;

            let mut decoder = Decoder::new();
            let outcomes = decode_all(&mut decoder, &corrupted);

            assert_eq!(outcomes.len(), 1, "corrupting byte {index}");
            assert!(
                matches!(outcomes[0], DecodeOutcome::BadChecksum { .. }),
                "corrupting byte {index} should fail the checksum"
            );
            assert!(decoder.is_idle());
        }
    }

    #[test]
    fn bad_checksum_reports_command_and_payload() {
        let mut wire = encoded(105, &[7, 8]);
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;

        let mut decoder = Decoder::new();
        let outcomes = decode_all(&mut decoder, &wire);

        assert_eq!(
            outcomes,
            vec![DecodeOutcome::BadChecksum {
                command: 105,
                payload: Bytes::from_static(&[7, 8]),
            }]
        );
    }

    #[test]
    fn resynchronizes_after_leading_noise() {
        let mut stream = vec![0xFF, 0x00, 0x24];
        stream.extend_from_slice(&encoded(5, &[1, 2, 3]));

        let mut decoder = Decoder::new();
        let outcomes = decode_all(&mut decoder, &stream);

        assert_eq!(outcomes.len(), 1, "noise must not produce a result");
        match &outcomes[0] {
            DecodeOutcome::Frame(frame) => {
                assert_eq!(frame.command, 5);
                assert_eq!(frame.payload.as_ref(), &[1, 2, 3]);
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn recovers_after_bad_checksum() {
        let mut wire = encoded(101, &[1]);
        let last = wire.len() - 1;
        wire[last] ^= 0x40;
        wire.extend_from_slice(&encoded(102, &[9, 9]));

        let mut decoder = Decoder::new();
        let outcomes = decode_all(&mut decoder, &wire);

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(
            outcomes[0],
            DecodeOutcome::BadChecksum { command: 101, .. }
        ));
        assert!(matches!(
            &outcomes[1],
            DecodeOutcome::Frame(frame) if frame.command == 102
        ));
    }

    #[test]
    fn truncated_frame_then_new_preamble() {
        // A preamble cut short by a byte that is not a direction marker
        // must not poison the frame that follows it.
        let mut stream = vec![b'$', b'M'];
        stream.push(0xFF); // not a direction marker, forces resync
        stream.extend_from_slice(&encoded(3, &[]));

        let mut decoder = Decoder::new();
        let outcomes = decode_all(&mut decoder, &stream);

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            &outcomes[0],
            DecodeOutcome::Frame(frame) if frame.command == 3 && frame.payload.is_empty()
        ));
    }

    #[test]
    fn dollar_during_preamble_restarts_detection() {
        // "$$M<..." — the second '$' must restart preamble matching, not
        // get thrown away.
        let mut stream = vec![b'$'];
        stream.extend_from_slice(&encoded(42, &[0xAA]));

        let mut decoder = Decoder::new();
        let outcomes = decode_all(&mut decoder, &stream);

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            &outcomes[0],
            DecodeOutcome::Frame(frame) if frame.command == 42
        ));
    }

    #[test]
    fn response_direction_decodes() {
        let mut buf = BytesMut::new();
        crate::codec::encode_frame_with_direction(Direction::Response, 110, &[5, 0], &mut buf)
            .unwrap();

        let mut decoder = Decoder::new();
        let outcomes = decode_all(&mut decoder, &buf);

        assert_eq!(outcomes.len(), 1);
        match &outcomes[0] {
            DecodeOutcome::Frame(frame) => {
                assert_eq!(frame.direction, Direction::Response);
                assert_eq!(frame.command, 110);
            }
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn back_to_back_frames() {
        let mut stream = encoded(101, &[]);
        stream.extend_from_slice(&encoded(108, &[1, 2]));
        stream.extend_from_slice(&encoded(110, &[3]));

        let mut decoder = Decoder::new();
        let outcomes = decode_all(&mut decoder, &stream);

        let commands: Vec<u8> = outcomes
            .iter()
            .map(|o| match o {
                DecodeOutcome::Frame(f) => f.command,
                other => panic!("unexpected outcome {other:?}"),
            })
            .collect();
        assert_eq!(commands, vec![101, 108, 110]);
    }

    #[test]
    fn reset_discards_partial_frame() {
        let wire = encoded(50, &[1, 2, 3]);

        let mut decoder = Decoder::new();
        for &b in &wire[..6] {
            assert!(decoder.push(b).is_none());
        }
        assert!(!decoder.is_idle());

        decoder.reset();
        assert!(decoder.is_idle());

        // A fresh frame decodes cleanly after the reset.
        let outcomes = decode_all(&mut decoder, &wire);
        assert_eq!(outcomes.len(), 1);
    }

    #[test]
    fn payload_may_contain_preamble_bytes() {
        let payload = [b'$', b'M', b'<', b'$'];
        let mut decoder = Decoder::new();
        let outcomes = decode_all(&mut decoder, &encoded(99, &payload));

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            &outcomes[0],
            DecodeOutcome::Frame(frame) if frame.payload.as_ref() == payload
        ));
    }
}
