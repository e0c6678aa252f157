//! Test doubles and common utilities for architecture contract tests
//!
//! This module provides minimal test doubles that verify architectural
//! constraints without talking to any real data source.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use synchub_core::traits::{Fetched, Fetcher, Reconnect};
use synchub_core::{CoordinatorConfig, CoordinatorEvent, FetchGate, UpdateError};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// One scripted fetch: how long it takes and what it returns
#[derive(Clone)]
pub struct Step {
    pub delay: Duration,
    pub result: Result<Fetched<u32>, UpdateError>,
}

impl Step {
    pub fn ok(value: u32) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Ok(Fetched::new(value)),
        }
    }

    pub fn err(err: UpdateError) -> Self {
        Self {
            delay: Duration::ZERO,
            result: Err(err),
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn next_interval(mut self, next: Duration) -> Self {
        self.result = self.result.map(|fetched| fetched.with_next_interval(next));
        self
    }
}

/// Tracks how many fetches run at once, across any number of fetchers
#[derive(Clone, Default)]
pub struct ConcurrencyTracker {
    current: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
}

impl ConcurrencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// Highest number of fetches observed in flight together
    pub fn max_concurrent(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// A fetcher that plays back a script, then keeps succeeding
///
/// Clones share the script and counters, so a test keeps one clone and
/// hands another to the coordinator.
#[derive(Clone)]
pub struct ScriptedFetcher {
    script: Arc<Mutex<VecDeque<Step>>>,
    /// Step used once the script is exhausted
    fallback: Step,
    call_count: Arc<AtomicUsize>,
    fetch_times: Arc<Mutex<Vec<Instant>>>,
    tracker: ConcurrencyTracker,
    gate: Option<FetchGate>,
}

impl ScriptedFetcher {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Arc::new(Mutex::new(steps.into_iter().collect())),
            fallback: Step::ok(0),
            call_count: Arc::new(AtomicUsize::new(0)),
            fetch_times: Arc::new(Mutex::new(Vec::new())),
            tracker: ConcurrencyTracker::new(),
            gate: None,
        }
    }

    /// A fetcher that always returns `value` after `delay`
    pub fn steady(value: u32, delay: Duration) -> Self {
        let mut fetcher = Self::new(Vec::new());
        fetcher.fallback = Step::ok(value).after(delay);
        fetcher
    }

    /// Report concurrency into a shared tracker
    pub fn with_tracker(mut self, tracker: &ConcurrencyTracker) -> Self {
        self.tracker = tracker.clone();
        self
    }

    /// Fetch behind a shared gate
    pub fn with_gate(mut self, gate: &FetchGate) -> Self {
        self.gate = Some(gate.clone());
        self
    }

    /// Get the number of times fetch() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Instants at which fetch() was entered
    pub fn fetch_times(&self) -> Vec<Instant> {
        self.fetch_times.lock().unwrap().clone()
    }

    pub fn max_concurrent(&self) -> usize {
        self.tracker.max_concurrent()
    }

    /// Append more steps to the script
    pub fn push(&self, step: Step) {
        self.script.lock().unwrap().push_back(step);
    }
}

#[async_trait::async_trait]
impl Fetcher<u32> for ScriptedFetcher {
    async fn fetch(&self) -> Result<Fetched<u32>, UpdateError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.fetch_times.lock().unwrap().push(Instant::now());

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        self.tracker.enter();
        tokio::time::sleep(step.delay).await;
        self.tracker.exit();

        step.result
    }

    fn gate(&self) -> Option<&FetchGate> {
        self.gate.as_ref()
    }
}

/// A reconnect hook that fails a fixed number of times, then succeeds
#[derive(Clone)]
pub struct ScriptedReconnector {
    failures_left: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
    attempt_times: Arc<Mutex<Vec<Instant>>>,
}

impl ScriptedReconnector {
    pub fn failing(times: usize) -> Self {
        Self {
            failures_left: Arc::new(AtomicUsize::new(times)),
            attempts: Arc::new(AtomicUsize::new(0)),
            attempt_times: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Get the number of times reconnect() was called
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempt_times.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Reconnect for ScriptedReconnector {
    async fn reconnect(&self) -> Result<(), UpdateError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.attempt_times.lock().unwrap().push(Instant::now());

        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(UpdateError::connection("still unreachable"));
        }
        Ok(())
    }
}

/// A listener callback that counts its invocations
pub fn counting_listener() -> (impl Fn() + Send + Sync + 'static, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    (
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        count,
    )
}

/// Helper to create a polling config with a pinned schedule phase
pub fn polling_config(name: &str, interval_secs: u64) -> CoordinatorConfig {
    CoordinatorConfig::new(name)
        .with_interval_secs(interval_secs)
        .with_schedule_phase_ms(0)
}

/// Collect every event currently buffered in the channel
pub fn drain_events(rx: &mut mpsc::Receiver<CoordinatorEvent>) -> Vec<CoordinatorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Count buffered events matching a predicate
pub fn count_events(
    events: &[CoordinatorEvent],
    predicate: impl Fn(&CoordinatorEvent) -> bool,
) -> usize {
    events.iter().filter(|e| predicate(e)).count()
}
