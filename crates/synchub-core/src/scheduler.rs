//! Periodic refresh scheduler
//!
//! Owns the single outstanding timer of a coordinator.
//!
//! Deadlines are computed by flooring the base instant to a whole second
//! (counted from the scheduler's anchor), adding a fixed sub-second phase and
//! then the interval. When the coordinator arms from the start of the cycle
//! that a tick triggered, the phase cancels out and ticks land exactly one
//! interval apart no matter how long the fetch took.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Single-timer scheduler with a constant-phase cadence
#[derive(Debug)]
pub struct Scheduler {
    anchor: Instant,
    phase: Duration,
    timer: Option<JoinHandle<()>>,
    deadline: Option<Instant>,
    epoch: u64,
}

impl Scheduler {
    /// Create a disarmed scheduler anchored at the current instant
    pub fn new(phase: Duration) -> Self {
        Self {
            anchor: Instant::now(),
            phase,
            timer: None,
            deadline: None,
            epoch: 0,
        }
    }

    /// Deadline for a tick `interval` after `base`
    pub fn next_deadline(&self, base: Instant, interval: Duration) -> Instant {
        let elapsed = base.saturating_duration_since(self.anchor);
        self.anchor + Duration::from_secs(elapsed.as_secs()) + self.phase + interval
    }

    /// Arm the timer for one tick `interval` after `base`
    ///
    /// Any pending tick is cancelled first. `on_fire` receives the epoch of
    /// this arming; the fired future must pass it to [`Scheduler::claim`]
    /// before doing any work. A deadline that is already in the past
    /// (the fetch outlasted the interval) is recomputed from now.
    pub fn arm<F, Fut>(
        &mut self,
        runtime: &Handle,
        base: Instant,
        interval: Duration,
        on_fire: F,
    ) -> Instant
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.disarm();

        let now = Instant::now();
        let mut deadline = self.next_deadline(base, interval);
        if deadline <= now {
            deadline = self.next_deadline(now, interval);
        }

        self.epoch += 1;
        let fire = on_fire(self.epoch);
        self.timer = Some(runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            fire.await;
        }));
        self.deadline = Some(deadline);
        deadline
    }

    /// Cancel the pending tick, if any
    pub fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.deadline = None;
    }

    /// Claim a fired tick
    ///
    /// Returns `false` when the tick was disarmed or superseded after its
    /// timer elapsed; the caller must then do nothing.
    pub fn claim(&mut self, epoch: u64) -> bool {
        if self.epoch != epoch || self.timer.is_none() {
            return false;
        }
        // Detach rather than abort: the claiming task is the timer itself.
        self.timer = None;
        self.deadline = None;
        true
    }

    /// Whether a tick is pending
    pub fn is_armed(&self) -> bool {
        self.timer.is_some()
    }

    /// Instant of the pending tick
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Sub-second phase of every tick
    pub fn phase(&self) -> Duration {
        self.phase
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}
