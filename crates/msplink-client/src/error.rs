/// Errors that can occur on a flight-controller link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] msplink_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] msplink_frame::FrameError),

    /// A request did not complete (timed out after retries, desynced, or
    /// the connection went away before the response).
    #[error("command {command} did not complete")]
    RequestFailed { command: u8 },

    /// The link has been closed.
    #[error("link closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, LinkError>;
