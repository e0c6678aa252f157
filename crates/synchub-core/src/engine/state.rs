//! Coordinator data state and the status snapshot

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::error::{ErrorKind, UpdateError};

/// What a recorded failure did to `last_update_success`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailureTransition {
    /// Served from cache; success flag unchanged
    Tolerated,
    /// Success → failure edge
    BecameUnavailable,
    /// Already failed
    StillUnavailable,
}

/// Most recent value and success/failure bookkeeping
pub(crate) struct DataState<T> {
    pub(crate) data: Option<Arc<T>>,
    pub(crate) last_error: Option<UpdateError>,
    pub(crate) last_update_success: bool,
    pub(crate) last_update_success_time: Option<DateTime<Utc>>,
    pub(crate) consecutive_failures: u32,
    /// Bumped on every recorded change; a fetch whose starting generation
    /// no longer matches lost a race with a push
    pub(crate) generation: u64,
}

impl<T> DataState<T> {
    pub(crate) fn new() -> Self {
        Self {
            data: None,
            last_error: None,
            last_update_success: true,
            last_update_success_time: None,
            consecutive_failures: 0,
            generation: 0,
        }
    }

    /// Store a fresh value; returns `true` on the failure → success edge
    pub(crate) fn record_success(&mut self, data: T) -> bool {
        let recovered = !self.last_update_success;
        self.data = Some(Arc::new(data));
        self.last_error = None;
        self.last_update_success = true;
        self.last_update_success_time = Some(Utc::now());
        self.consecutive_failures = 0;
        self.generation += 1;
        recovered
    }

    /// Record a failure
    ///
    /// Transient failures are tolerated while a cached value exists, the
    /// source is currently healthy and the streak is within `tolerance`.
    pub(crate) fn record_failure(&mut self, err: UpdateError, tolerance: u32) -> FailureTransition {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.generation += 1;

        let tolerated = err.is_transient()
            && self.last_update_success
            && self.data.is_some()
            && self.consecutive_failures <= tolerance;
        self.last_error = Some(err);

        if tolerated {
            FailureTransition::Tolerated
        } else if self.last_update_success {
            self.last_update_success = false;
            FailureTransition::BecameUnavailable
        } else {
            FailureTransition::StillUnavailable
        }
    }
}

/// Serializable point-in-time view of a coordinator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinatorStatus {
    /// Coordinator name
    pub name: String,
    /// Whether the most recent refresh (or tolerated streak) succeeded
    pub last_update_success: bool,
    /// Message of the most recent error, if any since the last success
    pub last_error: Option<String>,
    /// Kind of the most recent error
    pub last_error_kind: Option<ErrorKind>,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// When data was last stored successfully
    pub last_update_success_time: Option<DateTime<Utc>>,
    /// Permanently disabled after a rejection
    pub disabled: bool,
    /// Registered listeners
    pub listeners: usize,
    /// Effective polling interval (None when push-only)
    pub update_interval_secs: Option<u64>,
    /// Data generation
    pub generation: u64,
}
