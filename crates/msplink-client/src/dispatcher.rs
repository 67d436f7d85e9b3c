use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use msplink_frame::codec::encode_frame;
use msplink_frame::command::command_name;
use msplink_frame::decoder::{DecodeOutcome, Decoder};
use msplink_transport::Transport;
use tracing::{debug, error, trace, warn};

/// Default number of retransmissions after the first attempt.
pub const DEFAULT_RETRIES: u32 = 2;

/// Default per-attempt response timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Terminal completion callback: `true` on a matched response (or a
/// completed fire-and-forget write), `false` on timeout, desync, or
/// connection loss. Fired exactly once per request, always from the
/// dispatcher's delivery thread.
pub type Callback = Box<dyn FnOnce(bool) + Send + 'static>;

/// Collaborator that parses response payloads.
///
/// The dispatcher correlates frames with requests but never interprets
/// payloads; every decoded frame's payload is handed here. Invoked on the
/// dispatcher's delivery thread, always before the matching request's
/// completion callback.
pub trait ResponseSink: Send + Sync {
    fn on_response(&self, command: u8, payload: &Bytes);
}

/// Per-request knobs for [`Dispatcher::send`].
#[derive(Debug, Clone)]
pub struct SendOptions {
    /// Retransmissions allowed after the first attempt.
    pub retries: u32,
    /// Response deadline per attempt; the clock restarts on each
    /// retransmission.
    pub timeout: Duration,
    /// Ask the transport to push the frame out immediately.
    pub flush: bool,
    /// When false, the request resolves `true` as soon as the bytes are
    /// written and consumes no inbound frame.
    pub expects_response: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            flush: false,
            expects_response: true,
        }
    }
}

struct PendingRequest {
    command: u8,
    payload: Bytes,
    retries_remaining: u32,
    timeout: Duration,
    flush: bool,
    expects_response: bool,
    callback: Option<Callback>,
}

enum Delivery {
    Response {
        sink: Arc<dyn ResponseSink>,
        command: u8,
        payload: Bytes,
    },
    Completion {
        callback: Callback,
        success: bool,
    },
}

struct State<T> {
    queue: VecDeque<PendingRequest>,
    /// True while the head of the queue has been transmitted and is
    /// awaiting its matching frame or timeout.
    in_flight: bool,
    /// Deadline of the in-flight request. `None` exactly when nothing is
    /// in flight.
    deadline: Option<Instant>,
    transport: T,
    decoder: Decoder,
    sink: Option<Arc<dyn ResponseSink>>,
    deliveries: Option<mpsc::Sender<Delivery>>,
    encode_buf: BytesMut,
    /// Connection torn down; every send fails immediately.
    closed: bool,
    /// Dispatcher dropping; worker threads must exit.
    shutdown: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    timer: Condvar,
}

/// Ordered request/response engine for one flight-controller connection.
///
/// The firmware services a single outstanding request at a time, so the
/// dispatcher keeps a FIFO of pending requests and transmits at most one.
/// `send` may be called from any thread; inbound bytes arrive via
/// [`on_bytes`](Dispatcher::on_bytes) from whatever thread owns the
/// transport's read half. Completion callbacks are never invoked
/// synchronously inside `send` — they are queued to a dedicated delivery
/// thread, which also guarantees they fire in resolution order.
///
/// Do not block the delivery thread on the dispatcher (e.g. by calling
/// [`send_blocking`](Dispatcher::send_blocking) from inside a callback).
pub struct Dispatcher<T: Transport + 'static> {
    shared: Arc<Shared<T>>,
    timer_thread: Option<JoinHandle<()>>,
    delivery_thread: Option<JoinHandle<()>>,
}

impl<T: Transport + 'static> Dispatcher<T> {
    /// Create a dispatcher owning the outbound half of a transport.
    pub fn new(transport: T) -> Self {
        let (tx, rx) = mpsc::channel::<Delivery>();

        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                in_flight: false,
                deadline: None,
                transport,
                decoder: Decoder::new(),
                sink: None,
                deliveries: Some(tx),
                encode_buf: BytesMut::new(),
                closed: false,
                shutdown: false,
            }),
            timer: Condvar::new(),
        });

        let delivery_thread = std::thread::Builder::new()
            .name("msplink-delivery".into())
            .spawn(move || {
                while let Ok(delivery) = rx.recv() {
                    match delivery {
                        Delivery::Response {
                            sink,
                            command,
                            payload,
                        } => sink.on_response(command, &payload),
                        Delivery::Completion { callback, success } => callback(success),
                    }
                }
            })
            .expect("failed to spawn delivery thread");

        let timer_shared = Arc::clone(&shared);
        let timer_thread = std::thread::Builder::new()
            .name("msplink-timer".into())
            .spawn(move || Self::timer_loop(timer_shared))
            .expect("failed to spawn timer thread");

        Self {
            shared,
            timer_thread: Some(timer_thread),
            delivery_thread: Some(delivery_thread),
        }
    }

    /// Register the payload-parsing collaborator.
    pub fn set_response_sink(&self, sink: Arc<dyn ResponseSink>) {
        self.shared.state.lock().unwrap().sink = Some(sink);
    }

    /// Enqueue a request.
    ///
    /// If the queue is idle the frame is transmitted immediately and its
    /// timeout clock starts; otherwise it waits in FIFO order behind every
    /// earlier unresolved request. The callback fires exactly once,
    /// asynchronously.
    pub fn send(
        &self,
        command: u8,
        payload: impl Into<Bytes>,
        options: SendOptions,
        callback: impl FnOnce(bool) + Send + 'static,
    ) {
        let callback: Callback = Box::new(callback);
        let mut state = self.shared.state.lock().unwrap();

        if state.closed {
            debug!(command, "send on closed dispatcher");
            Self::complete(&state, Some(callback), false);
            return;
        }

        state.queue.push_back(PendingRequest {
            command,
            payload: payload.into(),
            retries_remaining: options.retries,
            timeout: options.timeout,
            flush: options.flush,
            expects_response: options.expects_response,
            callback: Some(callback),
        });
        trace!(
            command,
            name = command_name(command),
            depth = state.queue.len(),
            "request queued"
        );

        if !state.in_flight {
            Self::transmit_head(&mut state);
            self.shared.timer.notify_all();
        }
    }

    /// Send and block the calling thread until the terminal callback.
    ///
    /// Returns the callback's boolean. Must not be called from a
    /// dispatcher callback.
    pub fn send_blocking(&self, command: u8, payload: impl Into<Bytes>, options: SendOptions) -> bool {
        let (tx, rx) = mpsc::channel();
        self.send(command, payload, options, move |success| {
            let _ = tx.send(success);
        });
        rx.recv().unwrap_or(false)
    }

    /// Feed bytes received from the transport.
    ///
    /// Called from the transport owner's reader thread. Checksum failures
    /// are recovered locally by decoder resynchronization and never fail a
    /// request directly.
    pub fn on_bytes(&self, bytes: &[u8]) {
        let mut state = self.shared.state.lock().unwrap();
        if state.closed {
            return;
        }

        for &byte in bytes {
            match state.decoder.push(byte) {
                None => {}
                Some(DecodeOutcome::BadChecksum { command, .. }) => {
                    debug!(command, "discarding frame with bad checksum");
                }
                Some(DecodeOutcome::Frame(frame)) => {
                    // Queue the payload for the sink ahead of the
                    // completion so parsers always run first.
                    if let (Some(sink), Some(tx)) = (&state.sink, &state.deliveries) {
                        let _ = tx.send(Delivery::Response {
                            sink: Arc::clone(sink),
                            command: frame.command,
                            payload: frame.payload.clone(),
                        });
                    }
                    self.correlate(&mut state, frame.command);
                }
            }
        }
    }

    /// Tear the connection down: every queued and in-flight request fails
    /// with `callback(false)` and the decoder is reset. Subsequent sends
    /// fail immediately. There is no per-request cancellation.
    pub fn close(&self) {
        let mut state = self.shared.state.lock().unwrap();
        if state.closed {
            return;
        }
        debug!(pending = state.queue.len(), "closing dispatcher");
        Self::fail_all(&mut state);
        self.shared.timer.notify_all();
    }

    /// True once the dispatcher has been closed (teardown or transport
    /// failure).
    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().unwrap().closed
    }

    /// Number of unresolved requests, including the in-flight one.
    pub fn pending_requests(&self) -> usize {
        self.shared.state.lock().unwrap().queue.len()
    }

    /// Match an inbound frame against the in-flight request and advance
    /// the queue.
    fn correlate(&self, state: &mut State<T>, command: u8) {
        if !state.in_flight {
            debug!(
                command,
                name = command_name(command),
                "frame with nothing in flight"
            );
            return;
        }

        let expected = state
            .queue
            .front()
            .map(|head| head.command)
            .expect("in-flight flag implies a queued head");

        if command == expected {
            trace!(command, "response matched in-flight request");
            Self::resolve_head(state, true);
        } else {
            // Protocol desync. The firmware answers one request at a time
            // and in order, so a mismatch means we and the peer disagree
            // about what is outstanding. Fail the in-flight request and
            // keep the queue moving rather than stalling until timeout.
            warn!(
                got = command,
                expected,
                "protocol desync; failing in-flight request"
            );
            Self::resolve_head(state, false);
        }

        Self::transmit_head(state);
        self.shared.timer.notify_all();
    }

    /// Complete the head request and clear the in-flight marker.
    fn resolve_head(state: &mut State<T>, success: bool) {
        state.in_flight = false;
        state.deadline = None;
        if let Some(mut head) = state.queue.pop_front() {
            Self::complete(state, head.callback.take(), success);
        }
    }

    /// Transmit queued requests until one is awaiting a response or the
    /// queue drains. Fire-and-forget requests resolve as soon as their
    /// bytes are written.
    fn transmit_head(state: &mut State<T>) {
        while let Some(head) = state.queue.front_mut() {
            state.encode_buf.clear();
            if let Err(err) =
                encode_frame(head.command, &head.payload, &mut state.encode_buf)
            {
                warn!(command = head.command, %err, "cannot encode request");
                let callback = head.callback.take();
                state.queue.pop_front();
                Self::complete(state, callback, false);
                continue;
            }

            if let Err(err) = Self::write_encoded(state) {
                error!(%err, "transport write failed; failing all requests");
                Self::fail_all(state);
                return;
            }

            let head = state.queue.front_mut().expect("head still queued");
            trace!(
                command = head.command,
                name = command_name(head.command),
                "request transmitted"
            );
            if head.expects_response {
                state.in_flight = true;
                state.deadline = Some(Instant::now() + head.timeout);
                return;
            }

            let callback = head.callback.take();
            state.queue.pop_front();
            Self::complete(state, callback, true);
        }

        state.in_flight = false;
        state.deadline = None;
    }

    /// Write the encode buffer, flushing when the head asks for it.
    fn write_encoded(state: &mut State<T>) -> msplink_transport::Result<()> {
        let flush = state.queue.front().map(|head| head.flush).unwrap_or(false);
        let buf = std::mem::take(&mut state.encode_buf);
        let result = state.transport.send_bytes(&buf);
        state.encode_buf = buf;
        result?;
        if flush {
            state.transport.flush()?;
        }
        Ok(())
    }

    /// Fail every queued request and mark the connection lost.
    fn fail_all(state: &mut State<T>) {
        state.closed = true;
        state.in_flight = false;
        state.deadline = None;
        state.decoder.reset();
        while let Some(mut request) = state.queue.pop_front() {
            Self::complete(state, request.callback.take(), false);
        }
    }

    fn complete(state: &State<T>, callback: Option<Callback>, success: bool) {
        if let Some(callback) = callback {
            if let Some(tx) = &state.deliveries {
                let _ = tx.send(Delivery::Completion { callback, success });
            }
        }
    }

    fn timer_loop(shared: Arc<Shared<T>>) {
        let mut state = shared.state.lock().unwrap();
        loop {
            if state.shutdown {
                return;
            }
            match state.deadline {
                None => {
                    state = shared.timer.wait(state).unwrap();
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now < deadline {
                        let (guard, _) = shared.timer.wait_timeout(state, deadline - now).unwrap();
                        state = guard;
                        continue;
                    }
                    Self::handle_timeout(&mut state);
                }
            }
        }
    }

    /// The in-flight request's deadline passed: retransmit if retries
    /// remain, otherwise fail it and advance.
    fn handle_timeout(state: &mut State<T>) {
        if !state.in_flight {
            state.deadline = None;
            return;
        }

        let head = state.queue.front_mut().expect("in-flight implies head");
        if head.retries_remaining > 0 {
            head.retries_remaining -= 1;
            debug!(
                command = head.command,
                remaining = head.retries_remaining,
                "response timeout; retransmitting"
            );
            state.encode_buf.clear();
            // Encoding succeeded on the first attempt; the payload is
            // unchanged.
            if encode_frame(head.command, &head.payload, &mut state.encode_buf).is_err() {
                Self::resolve_head(state, false);
                Self::transmit_head(state);
                return;
            }
            if let Err(err) = Self::write_encoded(state) {
                error!(%err, "retransmit failed; failing all requests");
                Self::fail_all(state);
                return;
            }
            let head = state.queue.front_mut().expect("head still queued");
            state.deadline = Some(Instant::now() + head.timeout);
        } else {
            warn!(
                command = head.command,
                name = command_name(head.command),
                "response timeout; retries exhausted"
            );
            Self::resolve_head(state, false);
            Self::transmit_head(state);
        }
    }
}

impl<T: Transport + 'static> Drop for Dispatcher<T> {
    fn drop(&mut self) {
        self.close();
        {
            let mut state = self.shared.state.lock().unwrap();
            state.shutdown = true;
            // Dropping the sender lets the delivery thread drain remaining
            // deliveries and exit.
            state.deliveries = None;
        }
        self.shared.timer.notify_all();
        let current = std::thread::current().id();
        if let Some(handle) = self.timer_thread.take() {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
        if let Some(handle) = self.delivery_thread.take() {
            // A callback can own the last handle to this dispatcher, in
            // which case this drop runs on the delivery thread itself;
            // never self-join.
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
    }
}
