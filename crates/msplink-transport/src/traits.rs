use std::io::{ErrorKind, Write};

use crate::error::Result;

/// Outbound byte capability of a flight-controller link.
///
/// This is the only thing the command dispatcher needs from a transport:
/// write a block of bytes, and optionally push it out immediately. The
/// inbound direction is not part of this trait — whoever owns the
/// transport reads bytes on its own thread and feeds them to the
/// dispatcher's byte-arrival entry point.
///
/// TCP sockets, serial adapters, and in-memory test sinks all qualify via
/// the blanket implementation over `io::Write`.
pub trait Transport: Send {
    /// Write an entire block of bytes to the link.
    fn send_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    /// Push buffered bytes out now, bypassing any write coalescing.
    fn flush(&mut self) -> Result<()>;
}

impl<T: Write + Send> Transport for T {
    fn send_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.write(&bytes[offset..]) {
                Ok(0) => return Err(crate::error::TransportError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        loop {
            match Write::flush(self) {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;

    #[test]
    fn vec_is_a_transport() {
        let mut sink = Vec::new();
        sink.send_bytes(b"$M<").unwrap();
        sink.send_bytes(&[0, 1, 1]).unwrap();
        Transport::flush(&mut sink).unwrap();
        assert_eq!(sink, b"$M<\x00\x01\x01");
    }

    #[test]
    fn zero_write_maps_to_closed() {
        struct ZeroWriter;
        impl Write for ZeroWriter {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let err = ZeroWriter.send_bytes(b"x").unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[test]
    fn interrupted_write_retries() {
        struct InterruptedOnce {
            interrupted: bool,
            data: Vec<u8>,
        }
        impl Write for InterruptedOnce {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                if !self.interrupted {
                    self.interrupted = true;
                    return Err(std::io::Error::from(ErrorKind::Interrupted));
                }
                self.data.extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut sink = InterruptedOnce {
            interrupted: false,
            data: Vec::new(),
        };
        sink.send_bytes(b"retry").unwrap();
        assert_eq!(sink.data, b"retry");
    }

    #[test]
    fn partial_writes_complete() {
        struct OneBytePerWrite {
            data: Vec<u8>,
        }
        impl Write for OneBytePerWrite {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.data.push(buf[0]);
                Ok(1)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut sink = OneBytePerWrite { data: Vec::new() };
        sink.send_bytes(b"abcdef").unwrap();
        assert_eq!(sink.data, b"abcdef");
    }
}
