//! High-level command dispatch for MSP flight-controller links.
//!
//! This is the "just works" layer. Connect to a flight controller, issue
//! commands with retry and timeout, and sequence dependent operations —
//! against firmware that services exactly one request at a time.
//!
//! - [`Dispatcher`] — FIFO request queue with at-most-one-in-flight,
//!   retry/timeout, and asynchronous callback delivery
//! - [`Chain`] — strictly sequential steps with short-circuit on failure
//! - [`connect`] — TCP connection wiring (link + dispatcher + reader)

pub mod chain;
pub mod connector;
pub mod dispatcher;
pub mod error;

pub use chain::{run_chain, Chain, Step, StepHandle};
pub use connector::{connect, connect_with_config, ConnectConfig, FcConnection};
pub use dispatcher::{
    Callback, Dispatcher, ResponseSink, SendOptions, DEFAULT_RETRIES, DEFAULT_TIMEOUT,
};
pub use error::{LinkError, Result};
