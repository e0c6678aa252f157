// # synchub-core
//
// Core library for keeping polled and push-fed data sources fresh.
//
// ## Architecture Overview
//
// - **Fetcher**: Trait a data source implements to retrieve its value
// - **Coordinator**: Per-source engine that schedules, debounces,
//   single-flights and fans results out to listeners
// - **Debouncer**: Coalesces bursts of refresh requests
// - **Scheduler**: Constant-phase periodic timer
// - **FetchGate**: Serializes fetches of sources sharing one transport
// - **CoordinatorRegistry**: Application-owned set of coordinators
//
// ## Design Principles
//
// 1. **One engine, many strategies**: polling, adaptive, push-only, gated,
//    failure-tolerant and reconnecting sources share the same coordinator
// 2. **Single-flight**: a coordinator never runs two fetches at once
// 3. **Edges, not levels**: only availability transitions are reported
// 4. **Library-First**: no global state; the application owns everything

pub mod config;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod gate;
pub mod listeners;
pub mod registry;
pub mod scheduler;
pub mod traits;

mod sync;

// Re-export core types for convenience
pub use config::{CoordinatorConfig, DebounceConfig, HubConfig, ReconnectConfig};
pub use engine::{Coordinator, CoordinatorEvent, CoordinatorStatus, CycleOutcome};
pub use error::{Error, ErrorKind, Result, UpdateError};
pub use gate::FetchGate;
pub use listeners::{ListenerToken, UpdateStream};
pub use registry::{CoordinatorRegistry, ManagedCoordinator};
pub use traits::{Fetched, Fetcher, FnFetcher, Gated, Reconnect, fetch_fn};
