//! Background reconnect loop
//!
//! Started by a connection failure when the coordinator was built with a
//! [`Reconnect`] hook. The loop owns its own backoff and never touches the
//! refresh schedule; on success it hands control back to the coordinator,
//! which forces one refresh.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::debug;

use super::Inner;
use crate::config::ReconnectConfig;
use crate::traits::Reconnect;

/// Exponential backoff capped at a maximum delay
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: u32,
}

impl Backoff {
    pub(crate) fn new(config: &ReconnectConfig) -> Self {
        Self {
            next: Duration::from_secs(config.initial_delay_secs),
            max: Duration::from_secs(config.max_delay_secs),
            multiplier: config.multiplier,
        }
    }

    /// Delay before the next attempt
    pub(crate) fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self
            .next
            .checked_mul(self.multiplier)
            .map_or(self.max, |grown| grown.min(self.max));
        delay
    }
}

/// Retry `reconnector` until it succeeds or the coordinator goes away
pub(crate) async fn run<T>(
    coordinator: Weak<Inner<T>>,
    reconnector: Arc<dyn Reconnect>,
    mut backoff: Backoff,
) where
    T: Send + Sync + 'static,
{
    let mut attempts = 0u32;
    loop {
        tokio::time::sleep(backoff.next_delay()).await;
        if coordinator.strong_count() == 0 {
            return;
        }

        attempts += 1;
        match reconnector.reconnect().await {
            Ok(()) => break,
            Err(e) => debug!("Reconnect attempt {} failed: {}", attempts, e),
        }
    }

    if let Some(inner) = coordinator.upgrade() {
        inner.reconnected(attempts).await;
    }
}
