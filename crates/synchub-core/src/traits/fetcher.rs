// # Fetcher Trait
//
// Defines the fetch hook a data source hands to its coordinator.
//
// ## Implementations
//
// - HTTP/JSON: `synchub-source-http` crate
// - Closures: [`fetch_fn`]
// - Shared transports: wrap any fetcher in [`Gated`]
//
// ## Usage
//
// ```rust,ignore
// use synchub_core::{Coordinator, CoordinatorConfig, Fetched, fetch_fn};
//
// let fetcher = fetch_fn(|| async { Ok(Fetched::new(read_meter().await?)) });
// let (coordinator, _events) = Coordinator::new(
//     CoordinatorConfig::new("meter").with_interval_secs(30),
//     fetcher,
// )?;
// ```

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::UpdateError;
use crate::gate::FetchGate;

/// Value returned by a successful fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched<T> {
    /// The fetched data
    pub data: T,
    /// Suggested delay before the next scheduled fetch (adaptive sources)
    pub next_interval: Option<Duration>,
}

impl<T> Fetched<T> {
    /// Wrap data without an interval suggestion
    pub fn new(data: T) -> Self {
        Self {
            data,
            next_interval: None,
        }
    }

    /// Suggest the delay before the next scheduled fetch
    ///
    /// The coordinator clamps it into its configured bounds.
    pub fn with_next_interval(mut self, next: Duration) -> Self {
        self.next_interval = Some(next);
        self
    }
}

/// Fetch hook for one coordinator
///
/// # Contract
///
/// - `fetch()` must be idempotent; the coordinator calls it on every cycle
/// - Implementations should bound their own I/O; the coordinator enforces
///   its configured timeout as a backstop and classifies an overrun as
///   [`UpdateError::Timeout`]
/// - Returning [`UpdateError::Misconfigured`] aborts the cycle and surfaces
///   to the caller instead of being recorded
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Forbidden
///
/// - Spawning polling loops (the coordinator owns scheduling)
/// - Retrying internally on a timer (use failure tolerance or the reconnect loop)
/// - Calling back into the coordinator that owns this fetcher
#[async_trait]
pub trait Fetcher<T: Send + 'static>: Send + Sync {
    /// Fetch the current value
    async fn fetch(&self) -> Result<Fetched<T>, UpdateError>;

    /// Gate shared with sibling coordinators, if any
    ///
    /// When present, the coordinator holds the gate for the duration of
    /// `fetch()` only.
    fn gate(&self) -> Option<&FetchGate> {
        None
    }
}

#[async_trait]
impl<T, F> Fetcher<T> for Arc<F>
where
    T: Send + 'static,
    F: Fetcher<T> + ?Sized,
{
    async fn fetch(&self) -> Result<Fetched<T>, UpdateError> {
        (**self).fetch().await
    }

    fn gate(&self) -> Option<&FetchGate> {
        (**self).gate()
    }
}

/// Fetcher backed by an async closure
pub struct FnFetcher<F> {
    f: F,
}

/// Build a fetcher from an async closure
pub fn fetch_fn<T, F, Fut>(f: F) -> FnFetcher<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Fetched<T>, UpdateError>> + Send + 'static,
{
    FnFetcher { f }
}

#[async_trait]
impl<T, F, Fut> Fetcher<T> for FnFetcher<F>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Fetched<T>, UpdateError>> + Send + 'static,
{
    async fn fetch(&self) -> Result<Fetched<T>, UpdateError> {
        (self.f)().await
    }
}

/// Serializes a fetcher with its siblings through a shared [`FetchGate`]
pub struct Gated<F> {
    inner: F,
    gate: FetchGate,
}

impl<F> Gated<F> {
    /// Wrap `inner` so that it only fetches while holding `gate`
    pub fn new(inner: F, gate: FetchGate) -> Self {
        Self { inner, gate }
    }

    /// The wrapped fetcher
    pub fn inner(&self) -> &F {
        &self.inner
    }
}

#[async_trait]
impl<T, F> Fetcher<T> for Gated<F>
where
    T: Send + 'static,
    F: Fetcher<T>,
{
    async fn fetch(&self) -> Result<Fetched<T>, UpdateError> {
        self.inner.fetch().await
    }

    fn gate(&self) -> Option<&FetchGate> {
        Some(&self.gate)
    }
}
