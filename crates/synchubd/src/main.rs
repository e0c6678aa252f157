// # synchubd - Synchub Daemon
//
// Thin integration layer: reads configuration from the environment, builds
// one coordinator per HTTP/JSON source, and runs until SIGTERM/SIGINT.
// Refresh, scheduling and availability logic all live in synchub-core.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Sources
// - `SYNCHUB_SOURCES`: Comma-separated `name=url` pairs (required)
//
// ### Coordinators
// - `SYNCHUB_INTERVAL_SECS`: Polling interval in seconds (default 60)
// - `SYNCHUB_TIMEOUT_SECS`: Request and fetch timeout in seconds (default 10)
// - `SYNCHUB_COOLDOWN_SECS`: Refresh-request debounce cooldown (default 10)
// - `SYNCHUB_CONFIG`: Optional JSON file with per-coordinator settings
//   (`{"coordinators": [{"name": "...", ...}]}`); an entry replaces the
//   defaults above for the source of the same name
//
// ### Logging
// - `SYNCHUB_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export SYNCHUB_SOURCES=weather=https://api.example.com/weather,meter=http://10.0.0.7/api
// export SYNCHUB_INTERVAL_SECS=30
//
// synchubd
// ```

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use synchub_core::{
    Coordinator, CoordinatorConfig, CoordinatorEvent, CoordinatorRegistry, DebounceConfig,
    HubConfig, UpdateStream,
};
use synchub_source_http::{HttpJsonSource, HttpSourceConfig};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Upper bound on draining coordinators after a shutdown signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum SynchubExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<SynchubExitCode> for ExitCode {
    fn from(code: SynchubExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// One `name=url` entry of `SYNCHUB_SOURCES`
#[derive(Debug, Clone, PartialEq, Eq)]
struct Source {
    name: String,
    url: String,
}

/// Application configuration
#[derive(Debug)]
struct Config {
    sources: Vec<Source>,
    interval_secs: u64,
    timeout_secs: u64,
    cooldown_secs: u64,
    config_path: Option<PathBuf>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let sources = lookup("SYNCHUB_SOURCES").unwrap_or_default();

        Ok(Self {
            sources: parse_sources(&sources)?,
            interval_secs: parse_secs(&lookup, "SYNCHUB_INTERVAL_SECS", 60)?,
            timeout_secs: parse_secs(&lookup, "SYNCHUB_TIMEOUT_SECS", 10)?,
            cooldown_secs: parse_secs(&lookup, "SYNCHUB_COOLDOWN_SECS", 10)?,
            config_path: lookup("SYNCHUB_CONFIG")
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
            log_level: lookup("SYNCHUB_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            anyhow::bail!(
                "SYNCHUB_SOURCES must contain at least one source. \
                Set it via: export SYNCHUB_SOURCES=weather=https://api.example.com/weather"
            );
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.name.as_str()) {
                anyhow::bail!("SYNCHUB_SOURCES contains duplicate name '{}'", source.name);
            }
            if !source.url.starts_with("https://") && !source.url.starts_with("http://") {
                anyhow::bail!(
                    "Source '{}' must use an HTTP or HTTPS URL. Got: {}",
                    source.name,
                    source.url
                );
            }
        }

        if !(1..=86_400).contains(&self.interval_secs) {
            anyhow::bail!(
                "SYNCHUB_INTERVAL_SECS must be between 1 and 86400 seconds. Got: {}",
                self.interval_secs
            );
        }

        if !(1..=300).contains(&self.timeout_secs) {
            anyhow::bail!(
                "SYNCHUB_TIMEOUT_SECS must be between 1 and 300 seconds. Got: {}",
                self.timeout_secs
            );
        }

        if self.cooldown_secs > 3600 {
            anyhow::bail!(
                "SYNCHUB_COOLDOWN_SECS must be at most 3600 seconds. Got: {}",
                self.cooldown_secs
            );
        }

        if let Some(path) = &self.config_path
            && !path.is_file()
        {
            anyhow::bail!("SYNCHUB_CONFIG file does not exist: {}", path.display());
        }

        parse_log_level(&self.log_level)?;

        Ok(())
    }

    /// Pair every source with its coordinator and HTTP settings
    fn coordinators(&self) -> Result<Vec<(CoordinatorConfig, HttpSourceConfig)>> {
        let hub = match &self.config_path {
            Some(path) => HubConfig::from_file(path)
                .with_context(|| format!("Failed to load SYNCHUB_CONFIG {}", path.display()))?,
            None => HubConfig::default(),
        };

        for entry in &hub.coordinators {
            if !self.sources.iter().any(|s| s.name == entry.name) {
                anyhow::bail!(
                    "SYNCHUB_CONFIG configures '{}', which is not listed in SYNCHUB_SOURCES",
                    entry.name
                );
            }
        }

        Ok(self
            .sources
            .iter()
            .map(|source| {
                let coordinator = hub.get(&source.name).cloned().unwrap_or_else(|| {
                    CoordinatorConfig::new(source.name.clone())
                        .with_interval_secs(self.interval_secs)
                        .with_fetch_timeout_secs(self.timeout_secs)
                        .with_debounce(DebounceConfig {
                            cooldown_secs: self.cooldown_secs,
                            immediate: true,
                        })
                });
                let http = HttpSourceConfig::new(source.name.clone(), source.url.clone())
                    .with_timeout_secs(self.timeout_secs);
                (coordinator, http)
            })
            .collect())
    }
}

/// Parse `name=url,name=url`
fn parse_sources(raw: &str) -> Result<Vec<Source>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, url) = entry
                .split_once('=')
                .with_context(|| format!("SYNCHUB_SOURCES entry '{}' is not name=url", entry))?;
            let (name, url) = (name.trim(), url.trim());
            if name.is_empty() || url.is_empty() {
                anyhow::bail!("SYNCHUB_SOURCES entry '{}' is not name=url", entry);
            }
            Ok(Source {
                name: name.to_string(),
                url: url.to_string(),
            })
        })
        .collect()
}

fn parse_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a whole number of seconds. Got: {}", key, raw)),
        None => Ok(default),
    }
}

fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "SYNCHUB_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return SynchubExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return SynchubExitCode::ConfigError.into();
    }

    let log_level = parse_log_level(&config.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SynchubExitCode::ConfigError.into();
    }

    info!("Starting synchubd daemon");
    info!("Configuration loaded: {} source(s)", config.sources.len());

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SynchubExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => SynchubExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                match e.downcast_ref::<synchub_core::Error>() {
                    Some(
                        synchub_core::Error::Config(_)
                        | synchub_core::Error::Authentication(_)
                        | synchub_core::Error::Rejected(_),
                    ) => SynchubExitCode::ConfigError,
                    _ => SynchubExitCode::RuntimeError,
                }
            }
        }
    })
    .into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let registry = Arc::new(CoordinatorRegistry::new());

    for (coordinator_config, source_config) in config.coordinators()? {
        let name = coordinator_config.name.clone();
        let source = HttpJsonSource::new(source_config)?;
        let (coordinator, events) = Coordinator::new(coordinator_config, source)?;

        tokio::spawn(forward_events(events));
        let updates = coordinator.updates();
        tokio::spawn(log_updates(coordinator.clone(), updates));

        registry.register(coordinator.clone())?;

        info!("{}: running first refresh", name);
        if let Err(e) = coordinator.first_refresh().await {
            error!("{}: first refresh failed, aborting startup", name);
            registry.shutdown_all().await;
            return Err(e.into());
        }
    }

    info!("Daemon initialized successfully");
    info!("Coordinating: {}", registry.names().join(", "));

    let signal = wait_for_shutdown_signal().await?;
    info!("Received shutdown signal: {}", signal);
    info!("Shutting down daemon");

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, registry.shutdown_all())
        .await
        .is_err()
    {
        anyhow::bail!("Shutdown timeout after {:?}", SHUTDOWN_TIMEOUT);
    }

    for status in registry.statuses() {
        match serde_json::to_string(&status) {
            Ok(json) => info!("Final status: {}", json),
            Err(e) => warn!("{}: failed to serialize status: {}", status.name, e),
        }
    }

    Ok(())
}

/// Log coordinator events
async fn forward_events(mut events: mpsc::Receiver<CoordinatorEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            CoordinatorEvent::Unavailable { name, kind, error } => {
                warn!("{}: source unavailable ({:?}): {}", name, kind, error)
            }
            CoordinatorEvent::Recovered { name } => info!("{}: source available again", name),
            CoordinatorEvent::Disabled { name, reason } => {
                error!("{}: source disabled, no further polling: {}", name, reason)
            }
            CoordinatorEvent::ReconnectStarted { name } => info!("{}: reconnecting", name),
            CoordinatorEvent::Reconnected { name, attempts } => {
                info!("{}: reconnected after {} attempt(s)", name, attempts)
            }
            CoordinatorEvent::Stopped { name } => debug!("{}: stopped", name),
        }
    }
}

/// Log every update delivered to the daemon's listener
async fn log_updates(coordinator: Coordinator<serde_json::Value>, mut updates: UpdateStream) {
    while updates.next().await.is_some() {
        match coordinator.data() {
            Some(data) if coordinator.last_update_success() => {
                info!("{}: updated ({})", coordinator.name(), describe(&data))
            }
            Some(data) => debug!(
                "{}: serving cached data ({}) while unavailable",
                coordinator.name(),
                describe(&data)
            ),
            None => debug!("{}: no data yet", coordinator.name()),
        }
    }
}

/// Short shape summary of a JSON document
fn describe(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Object(map) => format!("object with {} key(s)", map.len()),
        serde_json::Value::Array(items) => format!("array of {} item(s)", items.len()),
        serde_json::Value::String(_) => "string".to_string(),
        serde_json::Value::Number(n) => format!("number {}", n),
        serde_json::Value::Bool(b) => format!("bool {}", b),
        serde_json::Value::Null => "null".to_string(),
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[("SYNCHUB_SOURCES", "weather=https://api.example.com/w")]).unwrap();
        assert_eq!(config.interval_secs, 60);
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.cooldown_secs, 10);
        assert_eq!(config.log_level, "info");
        assert!(config.config_path.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_sources() {
        let sources = parse_sources(" a=http://10.0.0.1/x?y=1 , b=https://b.example ,").unwrap();
        assert_eq!(
            sources,
            vec![
                Source {
                    name: "a".to_string(),
                    url: "http://10.0.0.1/x?y=1".to_string()
                },
                Source {
                    name: "b".to_string(),
                    url: "https://b.example".to_string()
                },
            ]
        );
        assert!(parse_sources("no-url").is_err());
        assert!(parse_sources("=http://x").is_err());
    }

    #[test]
    fn test_invalid_number_is_error() {
        let err = config_from(&[
            ("SYNCHUB_SOURCES", "a=http://x"),
            ("SYNCHUB_INTERVAL_SECS", "soon"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("SYNCHUB_INTERVAL_SECS"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(config_from(&[]).unwrap().validate().is_err());
        assert!(
            config_from(&[("SYNCHUB_SOURCES", "a=http://x,a=http://y")])
                .unwrap()
                .validate()
                .is_err()
        );
        assert!(
            config_from(&[("SYNCHUB_SOURCES", "a=ftp://x")])
                .unwrap()
                .validate()
                .is_err()
        );
        assert!(
            config_from(&[("SYNCHUB_SOURCES", "a=http://x"), ("SYNCHUB_TIMEOUT_SECS", "0")])
                .unwrap()
                .validate()
                .is_err()
        );
        assert!(
            config_from(&[("SYNCHUB_SOURCES", "a=http://x"), ("SYNCHUB_LOG_LEVEL", "loud")])
                .unwrap()
                .validate()
                .is_err()
        );
        assert!(
            config_from(&[
                ("SYNCHUB_SOURCES", "a=http://x"),
                ("SYNCHUB_CONFIG", "/nonexistent/synchub.json")
            ])
            .unwrap()
            .validate()
            .is_err()
        );
    }

    #[test]
    fn test_coordinators_use_env_defaults() {
        let config = config_from(&[
            ("SYNCHUB_SOURCES", "a=http://x"),
            ("SYNCHUB_INTERVAL_SECS", "15"),
            ("SYNCHUB_COOLDOWN_SECS", "2"),
        ])
        .unwrap();
        let pairs = config.coordinators().unwrap();
        assert_eq!(pairs.len(), 1);

        let (coordinator, http) = &pairs[0];
        assert_eq!(coordinator.name, "a");
        assert_eq!(coordinator.update_interval(), Some(Duration::from_secs(15)));
        assert_eq!(coordinator.debounce.cooldown_secs, 2);
        assert_eq!(http.url, "http://x");
        assert_eq!(http.timeout_secs, 10);
    }

    #[test]
    fn test_config_file_overrides_matching_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synchub.json");
        std::fs::write(
            &path,
            r#"{"coordinators": [{"name": "b", "update_interval_secs": 300, "failure_tolerance": 2}]}"#,
        )
        .unwrap();

        let config = config_from(&[
            ("SYNCHUB_SOURCES", "a=http://x,b=http://y"),
            ("SYNCHUB_CONFIG", path.to_str().unwrap()),
        ])
        .unwrap();
        config.validate().unwrap();

        let pairs = config.coordinators().unwrap();
        assert_eq!(pairs[0].0.update_interval(), Some(Duration::from_secs(60)));
        assert_eq!(pairs[1].0.update_interval(), Some(Duration::from_secs(300)));
        assert_eq!(pairs[1].0.failure_tolerance, 2);
    }

    #[test]
    fn test_config_file_rejects_unknown_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("synchub.json");
        std::fs::write(&path, r#"{"coordinators": [{"name": "ghost"}]}"#).unwrap();

        let config = config_from(&[
            ("SYNCHUB_SOURCES", "a=http://x"),
            ("SYNCHUB_CONFIG", path.to_str().unwrap()),
        ])
        .unwrap();
        assert!(config.coordinators().is_err());
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&serde_json::json!({"a": 1, "b": 2})), "object with 2 key(s)");
        assert_eq!(describe(&serde_json::json!([1, 2, 3])), "array of 3 item(s)");
        assert_eq!(describe(&serde_json::json!(null)), "null");
    }
}
