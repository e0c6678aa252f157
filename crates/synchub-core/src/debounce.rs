//! Refresh-request debouncer
//!
//! Coalesces bursts of "refresh now" requests into single executions.
//!
//! ## Policies
//!
//! - **Immediate** (default): the first call runs the target right away and
//!   then opens a cooldown window. Calls during the window collapse into one
//!   trailing run when the window closes, which opens a new window.
//! - **Delayed**: the first call opens the window; the target runs once when
//!   it closes.
//!
//! Calls that arrive while the target is executing are absorbed: the
//! execution in progress already satisfies them.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::sync::lock;

type DebouncedFn = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Coalesces calls to a target function behind a cooldown window
///
/// Cheap to clone; clones share the same window.
#[derive(Clone)]
pub struct Debouncer {
    shared: Arc<Shared>,
}

struct Shared {
    name: String,
    cooldown: Duration,
    immediate: bool,
    function: DebouncedFn,
    runtime: Handle,
    state: Mutex<DebounceState>,
}

#[derive(Default)]
struct DebounceState {
    /// Cooldown timer; `Some` while a window is open
    timer: Option<JoinHandle<()>>,
    /// Identifies the current timer so a superseded one never fires
    epoch: u64,
    execute_at_end: bool,
    executing: bool,
    shutdown: bool,
}

impl Debouncer {
    /// Create a debouncer around `function`
    ///
    /// Timers are spawned on `runtime`, so `call()` may be driven from any
    /// task on any runtime worker.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        cooldown: Duration,
        immediate: bool,
        runtime: Handle,
        function: F,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let function: DebouncedFn =
            Arc::new(move || -> Pin<Box<dyn Future<Output = ()> + Send>> { Box::pin(function()) });
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                cooldown,
                immediate,
                function,
                runtime,
                state: Mutex::new(DebounceState::default()),
            }),
        }
    }

    /// Request that the target run soon
    ///
    /// With the immediate policy and no open window this awaits the target
    /// itself; otherwise it returns right away.
    pub async fn call(&self) {
        {
            let mut state = lock(&self.shared.state);
            if state.shutdown {
                warn!(
                    "Debouncer call for {} ignored as shutdown has been requested",
                    self.shared.name
                );
                return;
            }
            if state.timer.is_some() {
                state.execute_at_end = true;
                return;
            }
            if state.executing {
                debug!("{}: call absorbed by running execution", self.shared.name);
                return;
            }
            if !self.shared.immediate {
                state.execute_at_end = true;
                self.shared.schedule_timer(&mut state);
                return;
            }
            state.executing = true;
        }

        let _execution = Execution(&self.shared);
        (self.shared.function)().await;
    }

    /// Drop any pending trailing execution and close the window
    pub fn cancel(&self) {
        let mut state = lock(&self.shared.state);
        state.cancel();
    }

    /// Cancel and refuse all further calls
    pub fn shutdown(&self) {
        let mut state = lock(&self.shared.state);
        state.shutdown = true;
        state.cancel();
    }

    /// Whether a cooldown window is open
    pub fn is_pending(&self) -> bool {
        lock(&self.shared.state).timer.is_some()
    }

    /// Whether a trailing execution will run when the window closes
    pub fn has_trailing_call(&self) -> bool {
        lock(&self.shared.state).execute_at_end
    }
}

impl DebounceState {
    fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.epoch += 1;
        self.execute_at_end = false;
    }
}

impl Shared {
    fn schedule_timer(self: &Arc<Self>, state: &mut DebounceState) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.epoch += 1;
        let epoch = state.epoch;
        let shared = Arc::clone(self);
        let cooldown = self.cooldown;
        state.timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(cooldown).await;
            shared.on_timer(epoch).await;
        }));
    }

    async fn on_timer(self: Arc<Self>, epoch: u64) {
        {
            let mut state = lock(&self.state);
            if state.epoch != epoch || state.timer.is_none() {
                return;
            }
            // Detach our own handle; a cancel() from the target must not abort us.
            state.timer = None;
            if !state.execute_at_end || state.executing || state.shutdown {
                return;
            }
            state.execute_at_end = false;
            state.executing = true;
        }

        let _execution = Execution(&self);
        (self.function)().await;
    }
}

/// Marks the end of an execution, even when the caller's future is dropped
struct Execution<'a>(&'a Arc<Shared>);

impl Drop for Execution<'_> {
    fn drop(&mut self) {
        let mut state = lock(&self.0.state);
        state.executing = false;
        if !state.shutdown {
            self.0.schedule_timer(&mut state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(immediate: bool) -> (Debouncer, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let debouncer = Debouncer::new(
            "test",
            Duration::from_secs(10),
            immediate,
            Handle::current(),
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            },
        );
        (debouncer, runs)
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_runs_once_then_trails() {
        let (debouncer, runs) = counting(true);

        for _ in 0..5 {
            debouncer.call().await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(debouncer.is_pending());
        assert!(debouncer.has_trailing_call());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // The trailing run opened a fresh window with nothing queued behind it.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_runs_after_cooldown() {
        let (debouncer, runs) = counting(false);

        debouncer.call().await;
        debouncer.call().await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_trailing_call() {
        let (debouncer, runs) = counting(false);

        debouncer.call().await;
        debouncer.cancel();
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_ignores_calls() {
        let (debouncer, runs) = counting(true);

        debouncer.shutdown();
        debouncer.call().await;
        tokio::time::sleep(Duration::from_secs(11)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
