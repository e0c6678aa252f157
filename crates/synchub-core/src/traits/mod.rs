//! Collaborator traits for the synchub engine
//!
//! - [`Fetcher`]: retrieve data for one coordinator (the fetch hook)
//! - [`Reconnect`]: re-establish a dropped connection for the reconnect loop

pub mod fetcher;
pub mod reconnect;

pub use fetcher::{Fetched, Fetcher, FnFetcher, Gated, fetch_fn};
pub use reconnect::Reconnect;
