//! Minimal embedding example for synchub-core
//!
//! One push-only source fed from a foreign thread, plus two polling sources
//! that share one bridge and must never fetch at the same time. The
//! application owns every coordinator and shuts them down explicitly.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use synchub_core::{
    Coordinator, CoordinatorConfig, CoordinatorRegistry, FetchGate, Fetched, Fetcher, Result,
    UpdateError, fetch_fn,
};
use tokio_stream::StreamExt;

/// Simulated bridge endpoint shared by several coordinators
struct BridgeEndpoint {
    path: &'static str,
    gate: FetchGate,
    polls: AtomicU32,
}

impl BridgeEndpoint {
    fn new(path: &'static str, gate: FetchGate) -> Self {
        Self {
            path,
            gate,
            polls: AtomicU32::new(0),
        }
    }
}

#[async_trait::async_trait]
impl Fetcher<u32> for BridgeEndpoint {
    async fn fetch(&self) -> std::result::Result<Fetched<u32>, UpdateError> {
        // The bridge handles one request at a time
        tokio::time::sleep(Duration::from_millis(200)).await;
        let poll = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        println!("[Bridge] GET {} (poll #{})", self.path, poll);
        Ok(Fetched::new(poll))
    }

    fn gate(&self) -> Option<&FetchGate> {
        Some(&self.gate)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    println!("=== Embedded synchub-core Example ===\n");
    let registry = CoordinatorRegistry::new();

    // Push-only: no interval, data arrives through publish()
    println!("1. Creating push-only doorbell coordinator...");
    let (doorbell, _doorbell_events) = Coordinator::new(
        CoordinatorConfig::new("doorbell"),
        fetch_fn(|| async { Ok::<_, UpdateError>(Fetched::new("idle".to_string())) }),
    )?;
    let mut rings = doorbell.updates();
    {
        let doorbell = doorbell.clone();
        tokio::spawn(async move {
            while rings.next().await.is_some() {
                if let Some(state) = doorbell.data() {
                    println!("[Listener] doorbell -> {}", state);
                }
            }
        });
    }
    registry.register(doorbell.clone())?;

    // Two pollers behind one gate
    println!("2. Creating gated lights/sensors coordinators...");
    let gate = FetchGate::new("bridge");
    let mut pollers = Vec::new();
    for (name, path) in [("lights", "/api/lights"), ("sensors", "/api/sensors")] {
        let endpoint = BridgeEndpoint::new(path, gate.clone());
        let (coordinator, mut events) =
            Coordinator::new(CoordinatorConfig::new(name).with_interval_secs(1), endpoint)?;
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                println!("[Event] {:?}", event);
            }
        });

        let listener = Arc::new(AtomicU32::new(0));
        {
            let seen = Arc::clone(&listener);
            let name = name.to_string();
            coordinator.add_listener(move || {
                let count = seen.fetch_add(1, Ordering::SeqCst) + 1;
                println!("[Listener] {} updated ({} so far)", name, count);
            });
        }

        coordinator.first_refresh().await?;
        registry.register(coordinator.clone())?;
        pollers.push(coordinator);
    }

    // A device callback arriving on a thread the runtime does not own
    println!("3. Ringing the doorbell from a foreign thread...");
    let pusher = doorbell.clone();
    let ringer = std::thread::spawn(move || {
        pusher.publish("ringing".to_string());
        std::thread::sleep(Duration::from_millis(300));
        pusher.publish("idle".to_string());
    });

    tokio::time::sleep(Duration::from_millis(3500)).await;
    if ringer.join().is_err() {
        println!("doorbell thread panicked");
    }

    println!("\n4. Statuses:");
    for status in registry.statuses() {
        println!(
            "   {:<8} ok={} generation={} interval={:?}",
            status.name, status.last_update_success, status.generation, status.update_interval_secs
        );
    }

    println!("\n5. Shutting down...");
    registry.shutdown_all().await;
    for poller in &pollers {
        println!("   {} stopped: {}", poller.name(), poller.is_shutdown());
    }

    println!("\n=== Embedding Successful ===");
    println!("Key Points:");
    println!("- Coordinators are owned and stopped by the application");
    println!("- publish() works from threads outside the runtime");
    println!("- Gated sources never hit the bridge concurrently");

    Ok(())
}
