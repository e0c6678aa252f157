//! Coordinator registry
//!
//! The application owns one registry and registers every coordinator it
//! creates, whatever its data type. The registry is the handle used for
//! status pages and for tearing everything down on exit.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use synchub_core::{Coordinator, CoordinatorConfig, CoordinatorRegistry};
//!
//! let registry = CoordinatorRegistry::new();
//! let (meter, _events) = Coordinator::new(CoordinatorConfig::new("meter"), meter_fetcher)?;
//! registry.register(meter.clone())?;
//!
//! for status in registry.statuses() {
//!     println!("{}: {}", status.name, status.last_update_success);
//! }
//!
//! registry.shutdown_all().await;
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::engine::{Coordinator, CoordinatorStatus, CycleOutcome};
use crate::error::{Error, Result};
use crate::sync::{read, write};

/// Type-erased view of a coordinator
///
/// Implemented for every [`Coordinator<T>`]; lets one registry hold
/// coordinators of different data types.
#[async_trait]
pub trait ManagedCoordinator: Send + Sync {
    /// Coordinator name (registry key)
    fn name(&self) -> &str;

    /// Point-in-time status
    fn status(&self) -> CoordinatorStatus;

    /// Force a refresh
    async fn refresh(&self) -> Result<CycleOutcome>;

    /// Request a debounced refresh
    async fn request_refresh(&self);

    /// Stop the coordinator
    async fn shutdown(&self);
}

#[async_trait]
impl<T> ManagedCoordinator for Coordinator<T>
where
    T: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        Coordinator::name(self)
    }

    fn status(&self) -> CoordinatorStatus {
        Coordinator::status(self)
    }

    async fn refresh(&self) -> Result<CycleOutcome> {
        Coordinator::refresh(self).await
    }

    async fn request_refresh(&self) {
        Coordinator::request_refresh(self).await
    }

    async fn shutdown(&self) {
        Coordinator::shutdown(self).await
    }
}

/// Registry of the coordinators owned by one application
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct CoordinatorRegistry {
    coordinators: RwLock<HashMap<String, Arc<dyn ManagedCoordinator>>>,
}

impl CoordinatorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a coordinator under its name
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Registered
    /// - `Err(Error::Config)`: A coordinator with this name already exists
    pub fn register<C>(&self, coordinator: C) -> Result<()>
    where
        C: ManagedCoordinator + 'static,
    {
        let name = coordinator.name().to_string();
        let mut coordinators = write(&self.coordinators);
        if coordinators.contains_key(&name) {
            return Err(Error::config(format!(
                "Coordinator already registered: {}",
                name
            )));
        }
        coordinators.insert(name, Arc::new(coordinator));
        Ok(())
    }

    /// Remove a coordinator without shutting it down
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn ManagedCoordinator>> {
        write(&self.coordinators).remove(name)
    }

    /// Look up a coordinator by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn ManagedCoordinator>> {
        read(&self.coordinators).get(name).cloned()
    }

    /// Check if a coordinator is registered
    pub fn contains(&self, name: &str) -> bool {
        read(&self.coordinators).contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.coordinators).keys().cloned().collect();
        names.sort();
        names
    }

    /// Status of every coordinator, sorted by name
    pub fn statuses(&self) -> Vec<CoordinatorStatus> {
        let mut statuses: Vec<CoordinatorStatus> = read(&self.coordinators)
            .values()
            .map(|c| c.status())
            .collect();
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        statuses
    }

    /// Number of registered coordinators
    pub fn len(&self) -> usize {
        read(&self.coordinators).len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        read(&self.coordinators).is_empty()
    }

    /// Shut down every registered coordinator
    ///
    /// Coordinators stay registered so their final status remains readable.
    pub async fn shutdown_all(&self) {
        let coordinators: Vec<Arc<dyn ManagedCoordinator>> =
            read(&self.coordinators).values().cloned().collect();

        for coordinator in coordinators {
            coordinator.shutdown().await;
        }
    }
}
