//! Trailing-edge debounce.
//!
//! Every [`Debouncer::call`] cancels the pending run and schedules a new one
//! `wait` later, so a burst of calls produces one execution `wait` after the
//! last call of the burst. The deferred run happens on its own tokio task.

use crate::error::{ConfigError, ConfigResult};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

type Action = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct DebounceState {
    pending: Option<JoinHandle<()>>,
    // Bumped on every call and cancel; a timer only fires if it is still current.
    generation: u64,
    last_run: Option<Instant>,
}

/// Coalesces bursts of calls into one delayed execution of an action.
pub struct Debouncer {
    wait: Duration,
    action: Action,
    handle: Handle,
    state: Arc<Mutex<DebounceState>>,
}

impl Debouncer {
    /// Creates a debouncer on the current tokio runtime.
    pub fn new<F>(wait: Duration, action: F) -> ConfigResult<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let handle = Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;
        Ok(Self::with_handle(handle, wait, action))
    }

    /// Creates a debouncer that schedules its timers on `handle`.
    pub fn with_handle<F>(handle: Handle, wait: Duration, action: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            wait,
            action: Arc::new(action),
            handle,
            state: Arc::new(Mutex::new(DebounceState::default())),
        }
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Schedules the action `wait` from now, replacing any pending run.
    pub fn call(&self) {
        let mut state = self.state.lock();
        if let Some(previous) = state.pending.take() {
            previous.abort();
        }
        state.generation += 1;

        let generation = state.generation;
        let shared = Arc::clone(&self.state);
        let action = Arc::clone(&self.action);
        let wait = self.wait;

        state.pending = Some(self.handle.spawn(async move {
            tokio::time::sleep(wait).await;
            {
                let mut state = shared.lock();
                if state.generation != generation {
                    return;
                }
                state.pending = None;
                state.last_run = Some(Instant::now());
            }
            action();
        }));
    }

    /// Drops the pending run, if any. Returns true if one was cancelled.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        state.generation += 1;
        match state.pending.take() {
            Some(pending) => {
                pending.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state
            .lock()
            .pending
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// When the action last started running.
    pub fn last_run(&self) -> Option<Instant> {
        self.state.lock().last_run
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("wait", &self.wait)
            .field("pending", &self.is_pending())
            .finish()
    }
}
