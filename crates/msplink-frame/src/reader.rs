use std::io::{ErrorKind, Read};

use bytes::{Buf, BytesMut};

use crate::codec::Frame;
use crate::decoder::{DecodeOutcome, Decoder};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally — callers always get complete frames.
/// A checksum failure surfaces as [`FrameError::ChecksumMismatch`]; the
/// reader stays usable and the next call picks up at the following
/// preamble.
pub struct FrameReader<T> {
    inner: T,
    decoder: Decoder,
    pending: BytesMut,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            decoder: Decoder::new(),
            pending: BytesMut::new(),
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            while self.pending.has_remaining() {
                let byte = self.pending.get_u8();
                match self.decoder.push(byte) {
                    Some(DecodeOutcome::Frame(frame)) => return Ok(frame),
                    Some(DecodeOutcome::BadChecksum { command, payload }) => {
                        let expected = crate::codec::checksum(command, &payload);
                        return Err(FrameError::ChecksumMismatch {
                            command,
                            expected,
                            actual: byte,
                        });
                    }
                    None => {}
                }
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.pending.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}
