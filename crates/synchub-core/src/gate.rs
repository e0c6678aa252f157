//! Cross-coordinator fetch gate
//!
//! Several coordinators that talk to one physical gateway share a
//! [`FetchGate`]. The gate has capacity 1: the coordinator acquires it right
//! before calling the fetch hook and releases it as soon as the hook returns,
//! so the shared transport never sees concurrent requests and listener
//! notification never runs while the gate is held.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::UpdateError;

/// Capacity-1 mutual exclusion shared between sibling coordinators
///
/// Cheap to clone; clones share the same permit.
#[derive(Debug, Clone)]
pub struct FetchGate {
    name: Arc<str>,
    semaphore: Arc<Semaphore>,
}

impl FetchGate {
    /// Create a new gate
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            semaphore: Arc::new(Semaphore::new(1)),
        }
    }

    /// Gate name (for logs)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for exclusive use of the shared transport
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, UpdateError> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| UpdateError::connection(format!("gate {} is closed", self.name)))
    }

    /// Whether a fetch currently holds the gate
    pub fn is_held(&self) -> bool {
        self.semaphore.available_permits() == 0
    }

    /// Close the gate; pending and future acquisitions fail
    pub fn close(&self) {
        self.semaphore.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_gate_is_exclusive() {
        let gate = FetchGate::new("bridge");
        let sibling = gate.clone();

        let permit = gate.acquire().await.unwrap();
        assert!(sibling.is_held());

        let waiter = tokio::spawn(async move { sibling.acquire().await.map(|_| ()) });
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        drop(permit);
        waiter.await.unwrap().unwrap();
        assert!(!gate.is_held());
    }

    #[tokio::test]
    async fn test_closed_gate_reports_connection_error() {
        let gate = FetchGate::new("bridge");
        gate.close();
        let err = gate.acquire().await.unwrap_err();
        assert!(matches!(err, UpdateError::Connection(_)));
    }
}
