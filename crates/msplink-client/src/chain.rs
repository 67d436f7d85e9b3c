use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tracing::trace;

/// A single asynchronous step in a [`Chain`].
pub type Step = Box<dyn FnOnce(StepHandle) + Send + 'static>;

type DoneFn = Box<dyn FnOnce(bool) + Send + 'static>;

struct ChainState {
    remaining: VecDeque<Step>,
    done: Option<DoneFn>,
    completed: bool,
}

/// Single-shot continuation handed to each chain step.
///
/// Call [`resolve`](StepHandle::resolve) exactly once when the step's work
/// finishes. Dropping the handle without resolving it (for example when a
/// dispatcher discards the callback holding it) counts as failure, so a
/// chain can never stall silently.
pub struct StepHandle {
    state: Arc<Mutex<ChainState>>,
    resolved: bool,
}

impl StepHandle {
    /// Report this step's outcome and hand control to the next step.
    ///
    /// `false` short-circuits: no further step runs and the chain's final
    /// callback fires with `false`.
    pub fn resolve(mut self, success: bool) {
        self.resolved = true;
        if success {
            advance(&self.state);
        } else {
            finish(&self.state, false);
        }
    }
}

impl Drop for StepHandle {
    fn drop(&mut self) {
        if !self.resolved {
            finish(&self.state, false);
        }
    }
}

/// An ordered list of asynchronous steps executed strictly one at a time.
///
/// Each step typically issues one or more dispatcher calls and resolves
/// its handle from the completion callback. The aggregate callback fires
/// exactly once: `true` after the last step succeeds, `false` as soon as
/// any step fails.
///
/// ```no_run
/// # use msplink_client::chain::Chain;
/// Chain::new()
///     .step(|handle| {
///         // kick off async work, then:
///         handle.resolve(true);
///     })
///     .step(|handle| handle.resolve(true))
///     .run(|success| println!("chain finished: {success}"));
/// ```
#[derive(Default)]
pub struct Chain {
    steps: Vec<Step>,
}

impl Chain {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a step.
    pub fn step(mut self, step: impl FnOnce(StepHandle) + Send + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Number of queued steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Execute the steps sequentially.
    ///
    /// An empty chain calls `done(true)` immediately on the current
    /// thread; otherwise `done` fires on whichever thread resolves the
    /// final step.
    pub fn run(self, done: impl FnOnce(bool) + Send + 'static) {
        run_chain(self.steps, done)
    }
}

/// Execute `steps` strictly one at a time, short-circuiting on failure.
pub fn run_chain(steps: Vec<Step>, done: impl FnOnce(bool) + Send + 'static) {
    if steps.is_empty() {
        done(true);
        return;
    }

    let state = Arc::new(Mutex::new(ChainState {
        remaining: steps.into(),
        done: Some(Box::new(done)),
        completed: false,
    }));
    advance(&state);
}

fn advance(state: &Arc<Mutex<ChainState>>) {
    let next = {
        let mut guard = state.lock().unwrap();
        if guard.completed {
            return;
        }
        guard.remaining.pop_front()
    };

    match next {
        Some(step) => {
            trace!("running next chain step");
            step(StepHandle {
                state: Arc::clone(state),
                resolved: false,
            });
        }
        None => finish(state, true),
    }
}

fn finish(state: &Arc<Mutex<ChainState>>, success: bool) {
    let done = {
        let mut guard = state.lock().unwrap();
        if guard.completed {
            return;
        }
        guard.completed = true;
        guard.remaining.clear();
        guard.done.take()
    };

    if let Some(done) = done {
        done(success);
    }
}
