use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use msplink_transport::TcpLink;
use tracing::{debug, info};

use crate::dispatcher::{Dispatcher, ResponseSink, SendOptions};
use crate::error::{LinkError, Result};

const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Connection-level configuration.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Default per-request options for [`FcConnection::request`].
    pub send_options: SendOptions,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            connect_timeout: TcpLink::DEFAULT_CONNECT_TIMEOUT,
            send_options: SendOptions::default(),
        }
    }
}

/// A live flight-controller connection.
///
/// Owns the dispatcher, the socket, and the reader thread pumping inbound
/// bytes into the dispatcher. Dropping the connection (or calling
/// [`close`](FcConnection::close)) fails every pending request and joins
/// the reader.
pub struct FcConnection {
    dispatcher: Arc<Dispatcher<TcpLink>>,
    link: TcpLink,
    reader: Option<JoinHandle<()>>,
    defaults: SendOptions,
}

/// Connect to a flight controller with default configuration.
pub fn connect(addr: impl ToSocketAddrs + std::fmt::Debug) -> Result<FcConnection> {
    connect_with_config(addr, &ConnectConfig::default())
}

/// Connect with explicit configuration.
pub fn connect_with_config(
    addr: impl ToSocketAddrs + std::fmt::Debug,
    config: &ConnectConfig,
) -> Result<FcConnection> {
    let link = TcpLink::connect_timeout(addr, config.connect_timeout)?;
    let write_half = link.try_clone()?;
    let mut read_half = link.try_clone()?;

    let dispatcher = Arc::new(Dispatcher::new(write_half));

    let reader_dispatcher = Arc::clone(&dispatcher);
    let reader = std::thread::Builder::new()
        .name("msplink-reader".into())
        .spawn(move || {
            use std::io::Read;

            let mut buf = [0u8; READ_CHUNK_SIZE];
            loop {
                match read_half.read(&mut buf) {
                    Ok(0) => {
                        info!("flight controller closed the connection");
                        break;
                    }
                    Ok(n) => reader_dispatcher.on_bytes(&buf[..n]),
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        debug!(%err, "link read failed");
                        break;
                    }
                }
            }
            // Whatever ended the stream, every outstanding request is now
            // unanswerable.
            reader_dispatcher.close();
        })
        .map_err(|err| LinkError::Transport(err.into()))?;

    Ok(FcConnection {
        dispatcher,
        link,
        reader: Some(reader),
        defaults: config.send_options.clone(),
    })
}

impl FcConnection {
    /// The dispatcher driving this connection.
    pub fn dispatcher(&self) -> &Arc<Dispatcher<TcpLink>> {
        &self.dispatcher
    }

    /// Register the payload-parsing collaborator.
    pub fn set_response_sink(&self, sink: Arc<dyn ResponseSink>) {
        self.dispatcher.set_response_sink(sink);
    }

    /// Enqueue a request (see [`Dispatcher::send`]).
    pub fn send(
        &self,
        command: u8,
        payload: impl Into<Bytes>,
        options: SendOptions,
        callback: impl FnOnce(bool) + Send + 'static,
    ) {
        self.dispatcher.send(command, payload, options, callback)
    }

    /// Issue a request with the connection's default options and block
    /// until it resolves.
    pub fn request(&self, command: u8, payload: impl Into<Bytes>) -> Result<()> {
        if self.dispatcher.is_closed() {
            return Err(LinkError::Closed);
        }
        if self
            .dispatcher
            .send_blocking(command, payload, self.defaults.clone())
        {
            Ok(())
        } else {
            Err(LinkError::RequestFailed { command })
        }
    }

    /// True once the connection has been torn down.
    pub fn is_closed(&self) -> bool {
        self.dispatcher.is_closed()
    }

    /// Tear the connection down: every queued and in-flight request fails,
    /// the socket shuts down, and the reader thread is joined.
    pub fn close(&mut self) {
        self.dispatcher.close();
        let _ = self.link.shutdown();
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

impl Drop for FcConnection {
    fn drop(&mut self) {
        self.close();
    }
}
