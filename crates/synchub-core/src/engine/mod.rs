//! Update coordinator
//!
//! A [`Coordinator`] keeps one data source fresh for any number of listeners:
//! - Fetches on a schedule, on debounced request, or on demand
//! - Runs at most one fetch at a time
//! - Records success/failure with hysteresis
//! - Notifies every listener exactly once per completed cycle
//! - Re-arms its timer only while someone is listening
//!
//! ## Architecture
//!
//! ```text
//!  ┌───────────┐   ┌───────────┐   ┌────────────┐
//!  │ Scheduler │   │ Debouncer │   │ refresh()  │
//!  └─────┬─────┘   └─────┬─────┘   └─────┬──────┘
//!        └───────────────┼───────────────┘
//!                        ▼
//!                ┌──────────────┐      ┌─────────┐
//!                │  run_cycle   │─────▶│ Fetcher │ (behind FetchGate, if any)
//!                └──────┬───────┘      └─────────┘
//!                       │
//!        ┌──────────────┼──────────────┐
//!        ▼              ▼              ▼
//!  ┌───────────┐  ┌───────────┐  ┌────────────┐
//!  │ DataState │  │ Listeners │  │   Events   │
//!  │ (record)  │  │ (notify)  │  │ (edges)    │
//!  └───────────┘  └───────────┘  └────────────┘
//! ```
//!
//! ## Cycle
//!
//! 1. Take the single-flight lock (or join the cycle that holds it)
//! 2. Disarm the scheduler and cancel any pending debounce
//! 3. Fetch under the gate and the configured timeout
//! 4. Record the outcome unless a push superseded it
//! 5. Notify listeners in registration order
//! 6. Re-arm from the cycle's start instant

mod reconnect;
mod state;

pub use state::CoordinatorStatus;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::CoordinatorConfig;
use crate::debounce::Debouncer;
use crate::error::{Error, ErrorKind, Result, UpdateError};
use crate::listeners::{Listener, ListenerRegistry, ListenerToken, UpdateStream, notify_all};
use crate::scheduler::Scheduler;
use crate::sync::{lock, read, write};
use crate::traits::{Fetched, Fetcher, Reconnect};
use reconnect::Backoff;
use state::{DataState, FailureTransition};

/// Events emitted by a coordinator
///
/// Only edges are reported; repeated failures while already unavailable
/// produce no event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorEvent {
    /// Success → failure edge
    Unavailable {
        name: String,
        kind: ErrorKind,
        error: String,
    },

    /// Failure → success edge
    Recovered { name: String },

    /// Permanently rejected; no further scheduled refreshes
    Disabled { name: String, reason: String },

    /// Reconnect loop started after a connection failure
    ReconnectStarted { name: String },

    /// Reconnect loop succeeded
    Reconnected { name: String, attempts: u32 },

    /// Coordinator shut down
    Stopped { name: String },
}

/// Result of a refresh request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Fetched and stored a new value
    Succeeded,
    /// Fetch failed; the cached value is still served
    Tolerated(UpdateError),
    /// Fetch failed and was recorded
    Failed(UpdateError),
    /// A push landed during the fetch; the fetched value was discarded
    Superseded,
    /// Another cycle completed while this request waited; its result stands
    Joined,
    /// Not run (shut down, disabled, or nobody listening)
    Skipped,
}

/// What started a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Scheduled,
    Debounced,
    Refresh,
    FirstRefresh,
    Reconnected,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scheduled => "scheduled",
            Self::Debounced => "debounced",
            Self::Refresh => "refresh",
            Self::FirstRefresh => "first refresh",
            Self::Reconnected => "reconnect",
        };
        f.write_str(name)
    }
}

/// Update coordinator for one data source
///
/// Cheap to clone; clones share the same state, schedule and listeners.
///
/// ## Lifecycle
///
/// 1. Create with [`Coordinator::new()`] inside a tokio runtime
/// 2. Optionally await [`Coordinator::first_refresh()`]
/// 3. Listeners come and go; the timer runs while at least one is registered
/// 4. [`Coordinator::shutdown()`] cancels everything
///
/// ## Threading
///
/// Background work runs on the runtime captured at construction, so
/// [`Coordinator::publish()`] and listener management may be called from any
/// thread.
pub struct Coordinator<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Coordinator<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ScheduleState {
    scheduler: Scheduler,
    update_interval: Option<Duration>,
    /// Clamped interval suggested by the last successful fetch
    suggested: Option<Duration>,
    disabled: bool,
}

impl ScheduleState {
    fn effective_interval(&self) -> Option<Duration> {
        self.update_interval
            .map(|base| self.suggested.unwrap_or(base))
    }
}

struct Inner<T> {
    name: String,
    config: CoordinatorConfig,
    fetcher: Box<dyn Fetcher<T>>,
    reconnector: Option<Arc<dyn Reconnect>>,
    runtime: Handle,
    weak_self: Weak<Inner<T>>,

    /// Single-flight lock; held for a whole cycle
    flight: tokio::sync::Mutex<()>,
    /// Completed cycles, used to detect that a waiter can join
    cycles: AtomicU64,
    shutdown: AtomicBool,

    state: RwLock<DataState<T>>,
    // Lock order: schedule, then listeners.
    schedule: Mutex<ScheduleState>,
    listeners: Mutex<ListenerRegistry>,
    debouncer: Debouncer,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,

    event_tx: mpsc::Sender<CoordinatorEvent>,
}

impl<T> Coordinator<T>
where
    T: Send + Sync + 'static,
{
    /// Create a new coordinator
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Returns
    ///
    /// A tuple of (coordinator, event_receiver) where event_receiver yields
    /// coordinator events
    pub fn new<F>(
        config: CoordinatorConfig,
        fetcher: F,
    ) -> Result<(Self, mpsc::Receiver<CoordinatorEvent>)>
    where
        F: Fetcher<T> + 'static,
    {
        Self::build(config, Box::new(fetcher), None)
    }

    /// Create a coordinator whose connection failures start a reconnect loop
    pub fn with_reconnect<F, R>(
        config: CoordinatorConfig,
        fetcher: F,
        reconnector: R,
    ) -> Result<(Self, mpsc::Receiver<CoordinatorEvent>)>
    where
        F: Fetcher<T> + 'static,
        R: Reconnect + 'static,
    {
        Self::build(config, Box::new(fetcher), Some(Arc::new(reconnector)))
    }

    fn build(
        config: CoordinatorConfig,
        fetcher: Box<dyn Fetcher<T>>,
        reconnector: Option<Arc<dyn Reconnect>>,
    ) -> Result<(Self, mpsc::Receiver<CoordinatorEvent>)> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|_| Error::config("Coordinator must be created inside a tokio runtime"))?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let inner = Arc::new_cyclic(|weak: &Weak<Inner<T>>| {
            let debouncer = {
                let weak = weak.clone();
                Debouncer::new(
                    config.name.clone(),
                    config.debounce.cooldown(),
                    config.debounce.immediate,
                    runtime.clone(),
                    move || {
                        let weak = weak.clone();
                        async move {
                            if let Some(inner) = weak.upgrade() {
                                inner.run_logged(Trigger::Debounced).await;
                            }
                        }
                    },
                )
            };

            Inner {
                name: config.name.clone(),
                fetcher,
                reconnector,
                runtime,
                weak_self: weak.clone(),
                flight: tokio::sync::Mutex::new(()),
                cycles: AtomicU64::new(0),
                shutdown: AtomicBool::new(false),
                state: RwLock::new(DataState::new()),
                schedule: Mutex::new(ScheduleState {
                    scheduler: Scheduler::new(config.schedule_phase()),
                    update_interval: config.update_interval(),
                    suggested: None,
                    disabled: false,
                }),
                listeners: Mutex::new(ListenerRegistry::default()),
                debouncer,
                reconnect_task: Mutex::new(None),
                event_tx: tx,
                config,
            }
        });

        Ok((Self { inner }, rx))
    }

    /// Coordinator name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Configuration this coordinator was built with
    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Most recent successfully stored value
    pub fn data(&self) -> Option<Arc<T>> {
        read(&self.inner.state).data.clone()
    }

    /// Whether the source is currently considered available
    pub fn last_update_success(&self) -> bool {
        read(&self.inner.state).last_update_success
    }

    /// Most recent error since the last success
    pub fn last_error(&self) -> Option<UpdateError> {
        read(&self.inner.state).last_error.clone()
    }

    /// When data was last stored successfully
    pub fn last_update_success_time(&self) -> Option<DateTime<Utc>> {
        read(&self.inner.state).last_update_success_time
    }

    /// Failures since the last success
    pub fn consecutive_failures(&self) -> u32 {
        read(&self.inner.state).consecutive_failures
    }

    /// Data generation; bumped on every recorded change
    pub fn generation(&self) -> u64 {
        read(&self.inner.state).generation
    }

    /// Whether a permanent rejection disabled scheduling
    pub fn is_disabled(&self) -> bool {
        lock(&self.inner.schedule).disabled
    }

    /// Whether [`Coordinator::shutdown()`] was called
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    /// Number of registered listeners
    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }

    /// Effective polling interval, including any fetcher suggestion
    pub fn update_interval(&self) -> Option<Duration> {
        lock(&self.inner.schedule).effective_interval()
    }

    /// Instant of the next scheduled refresh, if armed
    pub fn next_refresh(&self) -> Option<Instant> {
        lock(&self.inner.schedule).scheduler.deadline()
    }

    /// Point-in-time status snapshot
    pub fn status(&self) -> CoordinatorStatus {
        self.inner.status()
    }

    /// Register a listener
    ///
    /// The first listener arms the scheduler.
    pub fn add_listener<F>(&self, listener: F) -> ListenerToken
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.add_listener(Arc::new(listener))
    }

    /// Remove a listener; idempotent
    ///
    /// Removing the last listener disarms the scheduler.
    pub fn remove_listener(&self, token: ListenerToken) -> bool {
        self.inner.remove_listener(token)
    }

    /// Subscribe as a stream; the listener is removed when the stream drops
    pub fn updates(&self) -> UpdateStream {
        let (listener, rx) = UpdateStream::channel();
        let token = self.inner.add_listener(listener);
        let weak = Arc::downgrade(&self.inner);
        UpdateStream::new(rx, move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove_listener(token);
            }
        })
    }

    /// Run the first refresh
    ///
    /// Authentication failures and permanent rejections are returned to the
    /// caller (and listeners are not notified); every other failure is
    /// recorded as usual and the call succeeds. When it joins a cycle that
    /// was already in flight, that cycle's recorded failure is reported.
    pub async fn first_refresh(&self) -> Result<()> {
        let failure = match self.inner.run_cycle(Trigger::FirstRefresh).await? {
            CycleOutcome::Failed(err) => Some(err),
            CycleOutcome::Joined => {
                let state = read(&self.inner.state);
                if state.last_update_success {
                    None
                } else {
                    state.last_error.clone()
                }
            }
            _ => None,
        };

        match failure {
            Some(UpdateError::Authentication(msg)) => Err(Error::Authentication(msg)),
            Some(UpdateError::Rejected(msg)) => Err(Error::Rejected(msg)),
            _ => Ok(()),
        }
    }

    /// Force a refresh now
    ///
    /// Cancels any pending scheduled or debounced refresh. Only programming
    /// errors are returned as `Err`; everything else is recorded.
    pub async fn refresh(&self) -> Result<CycleOutcome> {
        self.inner.run_cycle(Trigger::Refresh).await
    }

    /// Request a refresh through the debouncer
    pub async fn request_refresh(&self) {
        self.inner.debouncer.call().await;
    }

    /// Store pushed data without fetching
    ///
    /// Supersedes any fetch in flight, notifies listeners and restarts the
    /// polling interval. Safe from any thread.
    pub fn publish(&self, data: T) {
        self.inner.publish(data);
    }

    /// Record a pushed failure (for example a dropped subscription)
    ///
    /// [`UpdateError::Misconfigured`] is a programming error: it is logged
    /// and dropped without touching state or listeners.
    pub fn publish_error(&self, err: UpdateError) {
        self.inner.publish_error(err);
    }

    /// Notify every listener without fetching
    pub fn notify_listeners(&self) {
        self.inner.notify();
    }

    /// Change the polling interval; `None` switches to push-only
    ///
    /// Clears any fetcher-suggested interval and re-arms immediately.
    pub fn set_update_interval(&self, interval: Option<Duration>) -> Result<()> {
        if interval == Some(Duration::ZERO) {
            return Err(Error::config(format!(
                "{}: update interval must be > 0 (use None for push-only)",
                self.inner.name
            )));
        }

        let mut schedule = lock(&self.inner.schedule);
        schedule.update_interval = interval;
        schedule.suggested = None;
        if schedule.effective_interval().is_some() {
            self.inner.arm_locked(&mut schedule, Instant::now());
        } else {
            schedule.scheduler.disarm();
        }
        Ok(())
    }

    /// Stop the coordinator
    ///
    /// Cancels the timer, the debouncer and any reconnect loop, then waits
    /// for an in-flight cycle to finish. Later refreshes are skipped.
    pub async fn shutdown(&self) {
        self.inner.shutdown().await;
    }
}

impl<T> Inner<T>
where
    T: Send + Sync + 'static,
{
    async fn run_cycle(&self, trigger: Trigger) -> Result<CycleOutcome> {
        if self.shutdown.load(Ordering::SeqCst) {
            debug!("{}: {} refresh skipped after shutdown", self.name, trigger);
            return Ok(CycleOutcome::Skipped);
        }

        let observed = self.cycles.load(Ordering::SeqCst);
        let _flight = self.flight.lock().await;
        if self.shutdown.load(Ordering::SeqCst) {
            return Ok(CycleOutcome::Skipped);
        }
        if self.cycles.load(Ordering::SeqCst) != observed {
            debug!("{}: {} refresh joined the cycle that just completed", self.name, trigger);
            return Ok(CycleOutcome::Joined);
        }

        lock(&self.schedule).scheduler.disarm();
        self.debouncer.cancel();

        if let Some(reason) = self.skip_reason(trigger) {
            debug!("{}: {} refresh skipped ({})", self.name, trigger, reason);
            return Ok(CycleOutcome::Skipped);
        }

        let started = Instant::now();
        let generation = read(&self.state).generation;
        let result = self.fetch_once().await;

        if let Err(UpdateError::Misconfigured(msg)) = &result {
            return Err(Error::programming(&self.name, msg.clone()));
        }

        let outcome = self.record(result, generation);
        self.cycles.fetch_add(1, Ordering::SeqCst);

        debug!(
            "Finished fetching {} data in {:.3} seconds ({}: {:?})",
            self.name,
            started.elapsed().as_secs_f64(),
            trigger,
            outcome
        );

        if trigger == Trigger::FirstRefresh
            && let CycleOutcome::Failed(UpdateError::Authentication(_) | UpdateError::Rejected(_)) =
                &outcome
        {
            return Ok(outcome);
        }

        if outcome != CycleOutcome::Superseded {
            self.notify();
        }
        self.schedule_next(started);
        Ok(outcome)
    }

    /// Run a cycle nobody awaits; errors can only be logged
    async fn run_logged(&self, trigger: Trigger) {
        if let Err(e) = self.run_cycle(trigger).await {
            error!("{}: {} refresh aborted: {}", self.name, trigger, e);
        }
    }

    fn skip_reason(&self, trigger: Trigger) -> Option<&'static str> {
        let schedule = lock(&self.schedule);
        match trigger {
            Trigger::Scheduled | Trigger::Debounced if schedule.disabled => Some("disabled"),
            Trigger::Scheduled if lock(&self.listeners).is_empty() => Some("no listeners"),
            _ => None,
        }
    }

    async fn fetch_once(&self) -> std::result::Result<Fetched<T>, UpdateError> {
        let _permit = match self.fetcher.gate() {
            Some(gate) => Some(gate.acquire().await?),
            None => None,
        };

        let timeout = self.config.fetch_timeout();
        match tokio::time::timeout(timeout, self.fetcher.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(UpdateError::Timeout(timeout)),
        }
    }

    fn record(
        &self,
        result: std::result::Result<Fetched<T>, UpdateError>,
        generation: u64,
    ) -> CycleOutcome {
        let mut state = write(&self.state);
        if state.generation != generation {
            debug!("{}: discarding fetch result superseded by a push", self.name);
            return CycleOutcome::Superseded;
        }

        match result {
            Ok(fetched) => {
                let suggested = fetched
                    .next_interval
                    .map(|next| self.config.clamp_interval(next));
                self.record_success(&mut state, fetched.data);
                drop(state);
                lock(&self.schedule).suggested = suggested;
                CycleOutcome::Succeeded
            }
            Err(err) => {
                let tolerated = self.record_failure(&mut state, err.clone());
                drop(state);
                // Failures retry on the configured cadence.
                lock(&self.schedule).suggested = None;
                self.after_failure(&err, tolerated);
                if tolerated {
                    CycleOutcome::Tolerated(err)
                } else {
                    CycleOutcome::Failed(err)
                }
            }
        }
    }

    fn record_success(&self, state: &mut DataState<T>, data: T) {
        if state.record_success(data) {
            info!("Fetching {} data recovered", self.name);
            self.emit_event(CoordinatorEvent::Recovered {
                name: self.name.clone(),
            });
        }
    }

    /// Returns `true` when the failure was tolerated
    fn record_failure(&self, state: &mut DataState<T>, err: UpdateError) -> bool {
        let kind = err.kind();
        let message = err.to_string();
        match state.record_failure(err, self.config.failure_tolerance) {
            FailureTransition::Tolerated => {
                warn!(
                    "Error fetching {} data ({}/{} tolerated): {}",
                    self.name, state.consecutive_failures, self.config.failure_tolerance, message
                );
                true
            }
            FailureTransition::BecameUnavailable => {
                error!("Error fetching {} data: {}", self.name, message);
                self.emit_event(CoordinatorEvent::Unavailable {
                    name: self.name.clone(),
                    kind,
                    error: message,
                });
                false
            }
            FailureTransition::StillUnavailable => {
                debug!("Error fetching {} data: {}", self.name, message);
                false
            }
        }
    }

    /// Variant reactions to a recorded failure
    ///
    /// A tolerated failure leaves the source available, so it never starts
    /// the reconnect loop.
    fn after_failure(&self, err: &UpdateError, tolerated: bool) {
        match err {
            UpdateError::Rejected(reason) => self.disable(reason),
            UpdateError::Connection(_) if !tolerated => self.start_reconnect_loop(),
            _ => {}
        }
    }

    fn disable(&self, reason: &str) {
        let mut schedule = lock(&self.schedule);
        schedule.scheduler.disarm();
        if schedule.disabled {
            return;
        }
        schedule.disabled = true;
        drop(schedule);

        error!("{}: disabled after permanent rejection: {}", self.name, reason);
        self.emit_event(CoordinatorEvent::Disabled {
            name: self.name.clone(),
            reason: reason.to_string(),
        });
    }

    fn notify(&self) {
        let listeners = lock(&self.listeners).snapshot();
        notify_all(&self.name, &listeners);
    }

    fn schedule_next(&self, base: Instant) {
        let mut schedule = lock(&self.schedule);
        self.arm_locked(&mut schedule, base);
    }

    /// Arm the scheduler if the coordinator should be polling
    fn arm_locked(&self, schedule: &mut ScheduleState, base: Instant) {
        if self.shutdown.load(Ordering::SeqCst) || schedule.disabled {
            return;
        }
        let Some(interval) = schedule.effective_interval() else {
            return;
        };
        if lock(&self.listeners).is_empty() {
            schedule.scheduler.disarm();
            return;
        }

        let weak = self.weak_self.clone();
        schedule
            .scheduler
            .arm(&self.runtime, base, interval, move |epoch| async move {
                if let Some(inner) = weak.upgrade() {
                    inner.on_tick(epoch).await;
                }
            });
    }

    async fn on_tick(self: Arc<Self>, epoch: u64) {
        if !lock(&self.schedule).scheduler.claim(epoch) {
            return;
        }
        self.run_logged(Trigger::Scheduled).await;
    }

    fn add_listener(&self, listener: Listener) -> ListenerToken {
        let mut schedule = lock(&self.schedule);
        let (token, first) = {
            let mut listeners = lock(&self.listeners);
            let first = listeners.is_empty();
            (listeners.add(listener), first)
        };
        if first && !schedule.scheduler.is_armed() {
            self.arm_locked(&mut schedule, Instant::now());
        }
        token
    }

    fn remove_listener(&self, token: ListenerToken) -> bool {
        let mut schedule = lock(&self.schedule);
        let (removed, empty) = {
            let mut listeners = lock(&self.listeners);
            (listeners.remove(token), listeners.is_empty())
        };
        if removed && empty {
            schedule.scheduler.disarm();
        }
        removed
    }

    fn publish(&self, data: T) {
        self.debouncer.cancel();
        lock(&self.schedule).scheduler.disarm();

        {
            let mut state = write(&self.state);
            self.record_success(&mut state, data);
        }
        debug!("Manually updated {} data", self.name);

        self.notify();
        self.schedule_next(Instant::now());
    }

    fn publish_error(&self, err: UpdateError) {
        if let UpdateError::Misconfigured(msg) = &err {
            error!("{}: ignoring pushed programming error: {}", self.name, msg);
            return;
        }

        let tolerated = {
            let mut state = write(&self.state);
            self.record_failure(&mut state, err.clone())
        };
        self.after_failure(&err, tolerated);
        self.notify();
    }

    fn start_reconnect_loop(&self) {
        let Some(reconnector) = self.reconnector.clone() else {
            return;
        };

        let mut slot = lock(&self.reconnect_task);
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }
        if slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }

        info!("{}: connection lost, starting reconnect loop", self.name);
        self.emit_event(CoordinatorEvent::ReconnectStarted {
            name: self.name.clone(),
        });
        *slot = Some(self.runtime.spawn(reconnect::run(
            self.weak_self.clone(),
            reconnector,
            Backoff::new(&self.config.reconnect),
        )));
    }

    /// Called by the reconnect loop once the connection is back
    async fn reconnected(&self, attempts: u32) {
        // Free the slot first so a failing forced refresh can start a new loop.
        lock(&self.reconnect_task).take();
        if self.shutdown.load(Ordering::SeqCst) {
            return;
        }

        info!("{}: reconnected after {} attempt(s)", self.name, attempts);
        self.emit_event(CoordinatorEvent::Reconnected {
            name: self.name.clone(),
            attempts,
        });
        self.run_logged(Trigger::Reconnected).await;
    }

    async fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }

        self.debouncer.shutdown();
        lock(&self.schedule).scheduler.disarm();
        if let Some(task) = lock(&self.reconnect_task).take() {
            task.abort();
        }

        // Wait out a cycle in flight; it sees the flag and does not re-arm.
        drop(self.flight.lock().await);

        info!("{}: coordinator stopped", self.name);
        self.emit_event(CoordinatorEvent::Stopped {
            name: self.name.clone(),
        });
    }

    fn status(&self) -> CoordinatorStatus {
        let (disabled, update_interval) = {
            let schedule = lock(&self.schedule);
            (schedule.disabled, schedule.effective_interval())
        };
        let listeners = lock(&self.listeners).len();
        let state = read(&self.state);

        CoordinatorStatus {
            name: self.name.clone(),
            last_update_success: state.last_update_success,
            last_error: state.last_error.as_ref().map(ToString::to_string),
            last_error_kind: state.last_error.as_ref().map(UpdateError::kind),
            consecutive_failures: state.consecutive_failures,
            last_update_success_time: state.last_update_success_time,
            disabled,
            listeners,
            update_interval_secs: update_interval.map(|d| d.as_secs()),
            generation: state.generation,
        }
    }

    /// Emit a coordinator event
    fn emit_event(&self, event: CoordinatorEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                warn!(
                    "{}: event channel full, dropping event. Consider increasing event_channel_capacity.",
                    self.name
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::fetch_fn;
    use std::sync::atomic::AtomicUsize;

    fn counting_fetcher(
        calls: &Arc<AtomicUsize>,
    ) -> impl Fetcher<usize> + 'static {
        let calls = Arc::clone(calls);
        fetch_fn(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move { Ok::<_, UpdateError>(Fetched::new(n)) }
        })
    }

    #[tokio::test]
    async fn test_new_outside_runtime_is_config_error() {
        let result = std::thread::spawn(|| {
            let calls = Arc::new(AtomicUsize::new(0));
            Coordinator::new(CoordinatorConfig::new("x"), counting_fetcher(&calls)).map(|_| ())
        })
        .join()
        .unwrap();

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = Coordinator::new(
            CoordinatorConfig::new("x").with_interval_secs(0),
            counting_fetcher(&calls),
        );
        assert!(result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_stores_data_and_bumps_generation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (coordinator, _events) =
            Coordinator::new(CoordinatorConfig::new("x"), counting_fetcher(&calls)).unwrap();

        assert_eq!(coordinator.refresh().await.unwrap(), CycleOutcome::Succeeded);
        assert_eq!(coordinator.data().as_deref(), Some(&1));
        assert_eq!(coordinator.generation(), 1);
        assert!(coordinator.last_update_success_time().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_programming_error_is_returned_not_recorded() {
        let fetcher = fetch_fn(|| async { Err::<Fetched<u8>, _>(UpdateError::misconfigured("no hook")) });
        let (coordinator, _events) = Coordinator::new(CoordinatorConfig::new("x"), fetcher).unwrap();

        let err = coordinator.refresh().await.unwrap_err();
        assert!(matches!(err, Error::Programming { .. }));
        assert!(coordinator.last_update_success());
        assert!(coordinator.last_error().is_none());
        assert_eq!(coordinator.generation(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_update_interval_arms_and_disarms() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (coordinator, _events) =
            Coordinator::new(CoordinatorConfig::new("x"), counting_fetcher(&calls)).unwrap();
        coordinator.add_listener(|| {});
        assert!(coordinator.next_refresh().is_none(), "push-only never arms");

        coordinator.set_update_interval(Some(Duration::from_secs(60))).unwrap();
        assert!(coordinator.next_refresh().is_some());
        assert_eq!(coordinator.update_interval(), Some(Duration::from_secs(60)));

        coordinator.set_update_interval(None).unwrap();
        assert!(coordinator.next_refresh().is_none());
        assert!(coordinator.set_update_interval(Some(Duration::ZERO)).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_snapshot_serializes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (coordinator, _events) = Coordinator::new(
            CoordinatorConfig::new("meter").with_interval_secs(30),
            counting_fetcher(&calls),
        )
        .unwrap();
        coordinator.add_listener(|| {});
        coordinator.publish_error(UpdateError::connection("socket closed"));

        let status = coordinator.status();
        assert!(!status.last_update_success);
        assert_eq!(status.last_error_kind, Some(ErrorKind::Connection));
        assert_eq!(status.listeners, 1);
        assert_eq!(status.update_interval_secs, Some(30));

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["name"], "meter");
        assert_eq!(json["last_error_kind"], "connection");
    }
}
