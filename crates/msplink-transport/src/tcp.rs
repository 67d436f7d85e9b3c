use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};

/// Client-side TCP link to a flight controller.
///
/// Wraps a connected `TcpStream` with Nagle disabled, so that a flushed
/// frame goes onto the wire immediately. The firmware side (or a
/// serial-to-TCP bridge such as `ser2net` or a SITL simulator) is the
/// listening party; this type only ever connects.
pub struct TcpLink {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpLink {
    /// Default connect timeout.
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Connect to a flight controller endpoint (blocking, default timeout).
    pub fn connect(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<Self> {
        Self::connect_timeout(addr, Self::DEFAULT_CONNECT_TIMEOUT)
    }

    /// Connect with an explicit timeout.
    ///
    /// Resolution may yield several addresses; each is tried in turn and
    /// the last error is reported if none succeeds.
    pub fn connect_timeout(
        addr: impl ToSocketAddrs + std::fmt::Debug,
        timeout: Duration,
    ) -> Result<Self> {
        let addr_repr = format!("{addr:?}");
        let addrs: Vec<SocketAddr> = addr
            .to_socket_addrs()
            .map_err(|source| TransportError::Connect {
                addr: addr_repr.clone(),
                source,
            })?
            .collect();

        let mut last_err = std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            "address resolved to nothing",
        );
        for candidate in addrs {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => {
                    stream
                        .set_nodelay(true)
                        .map_err(|source| TransportError::Connect {
                            addr: addr_repr.clone(),
                            source,
                        })?;
                    info!(peer = %candidate, "connected to flight controller");
                    return Ok(Self {
                        stream,
                        peer: candidate,
                    });
                }
                Err(err) => last_err = err,
            }
        }

        Err(TransportError::Connect {
            addr: addr_repr,
            source: last_err,
        })
    }

    /// Clone the link (new file descriptor for the same connection).
    ///
    /// The usual split: one handle writes frames, the clone feeds a
    /// dedicated reader thread.
    pub fn try_clone(&self) -> Result<Self> {
        let stream = self.stream.try_clone()?;
        Ok(Self {
            stream,
            peer: self.peer,
        })
    }

    /// Set the read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Shut down both directions of the connection.
    ///
    /// Unblocks a reader thread parked in `read`.
    pub fn shutdown(&self) -> Result<()> {
        debug!(peer = %self.peer, "shutting down link");
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // Already torn down by the peer; nothing left to do.
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// The remote endpoint this link is connected to.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

impl Read for TcpLink {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpLink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}

impl std::fmt::Debug for TcpLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpLink").field("peer", &self.peer).finish()
    }
}
