//! Client engine for MultiWii Serial Protocol flight controllers.
//!
//! msplink speaks MSP v1 — the compact binary request/response protocol of
//! MultiWii-descended firmwares — over any byte transport, with ordered
//! dispatch against firmware that services one request at a time.
//!
//! # Crate Structure
//!
//! - [`transport`] — Byte transport abstraction (TCP reference link)
//! - [`frame`] — MSP frame codec: encoder, incremental decoder, command codes
//! - [`client`] — Command dispatcher, chain executor, connector (behind the
//!   `client` feature)

/// Re-export transport types.
pub mod transport {
    pub use msplink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use msplink_frame::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use msplink_client::*;
}
