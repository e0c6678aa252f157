// # Reconnect Trait
//
// Implemented by sources that hold a long-lived connection (device sockets,
// websocket sessions). After a connection failure the coordinator runs a
// background loop that calls `reconnect()` on its own backoff schedule until it
// succeeds, then forces one refresh.

use async_trait::async_trait;

use crate::error::UpdateError;

/// Re-establishes the underlying connection of a data source
///
/// # Contract
///
/// - Called only from the coordinator's reconnect loop, never concurrently
///   with itself
/// - Must not fetch data; the coordinator forces a refresh on success
/// - Should bound its own I/O; a hanging attempt stalls the loop
#[async_trait]
pub trait Reconnect: Send + Sync {
    /// Attempt to re-establish the connection
    async fn reconnect(&self) -> Result<(), UpdateError>;
}
