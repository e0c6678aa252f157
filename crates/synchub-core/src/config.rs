//! Configuration types for the synchub engine
//!
//! Every duration is expressed in whole seconds (or milliseconds for the
//! sub-second schedule phase) so configs stay readable as JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::time::Duration;

/// Top-level hub configuration: one entry per coordinator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfig {
    /// Coordinators to create
    #[serde(default)]
    pub coordinators: Vec<CoordinatorConfig>,
}

impl HubConfig {
    /// Parse a hub configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self, crate::Error> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a hub configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, crate::Error> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        let mut seen = HashSet::new();
        for coordinator in &self.coordinators {
            coordinator.validate()?;
            if !seen.insert(coordinator.name.as_str()) {
                return Err(crate::Error::config(format!(
                    "Duplicate coordinator name: {}",
                    coordinator.name
                )));
            }
        }
        Ok(())
    }

    /// Find a coordinator config by name
    pub fn get(&self, name: &str) -> Option<&CoordinatorConfig> {
        self.coordinators.iter().find(|c| c.name == name)
    }
}

/// Per-coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Human-readable name used in logs and events
    pub name: String,

    /// Polling interval in seconds; `None` means push-only
    #[serde(default)]
    pub update_interval_secs: Option<u64>,

    /// Lower clamp for intervals suggested by the fetcher
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,

    /// Upper clamp for intervals suggested by the fetcher
    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: u64,

    /// Deadline for a single fetch
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Sub-second offset of every scheduled tick (0..1000)
    ///
    /// Derived from the name when unset, which spreads coordinators that
    /// share an interval across the second.
    #[serde(default)]
    pub schedule_phase_ms: Option<u64>,

    /// Consecutive transient failures served from cache before going unavailable
    #[serde(default)]
    pub failure_tolerance: u32,

    /// Refresh-request debouncing
    #[serde(default)]
    pub debounce: DebounceConfig,

    /// Reconnect loop backoff
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Capacity of the coordinator event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl CoordinatorConfig {
    /// Create a push-only configuration with defaults
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            update_interval_secs: None,
            min_interval_secs: default_min_interval_secs(),
            max_interval_secs: default_max_interval_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            schedule_phase_ms: None,
            failure_tolerance: 0,
            debounce: DebounceConfig::default(),
            reconnect: ReconnectConfig::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Set the polling interval
    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.update_interval_secs = Some(secs);
        self
    }

    /// Set the fetch timeout
    pub fn with_fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.fetch_timeout_secs = secs;
        self
    }

    /// Set the clamp bounds for fetcher-suggested intervals
    pub fn with_interval_bounds(mut self, min_secs: u64, max_secs: u64) -> Self {
        self.min_interval_secs = min_secs;
        self.max_interval_secs = max_secs;
        self
    }

    /// Pin the sub-second schedule phase
    pub fn with_schedule_phase_ms(mut self, phase_ms: u64) -> Self {
        self.schedule_phase_ms = Some(phase_ms);
        self
    }

    /// Tolerate this many consecutive transient failures
    pub fn with_failure_tolerance(mut self, tolerance: u32) -> Self {
        self.failure_tolerance = tolerance;
        self
    }

    /// Replace the debounce settings
    pub fn with_debounce(mut self, debounce: DebounceConfig) -> Self {
        self.debounce = debounce;
        self
    }

    /// Replace the reconnect settings
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::config("Coordinator name cannot be empty"));
        }
        if self.update_interval_secs == Some(0) {
            return Err(crate::Error::config(format!(
                "{}: update interval must be > 0 (omit it for push-only)",
                self.name
            )));
        }
        if self.min_interval_secs == 0 || self.min_interval_secs > self.max_interval_secs {
            return Err(crate::Error::config(format!(
                "{}: interval bounds must satisfy 0 < min <= max (got {}..{})",
                self.name, self.min_interval_secs, self.max_interval_secs
            )));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(crate::Error::config(format!(
                "{}: fetch timeout must be > 0",
                self.name
            )));
        }
        if let Some(phase) = self.schedule_phase_ms
            && phase >= 1000
        {
            return Err(crate::Error::config(format!(
                "{}: schedule phase must be below 1000 ms (got {})",
                self.name, phase
            )));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config(format!(
                "{}: event channel capacity must be > 0",
                self.name
            )));
        }
        self.reconnect.validate()?;
        Ok(())
    }

    /// Configured polling interval
    pub fn update_interval(&self) -> Option<Duration> {
        self.update_interval_secs.map(Duration::from_secs)
    }

    /// Deadline applied to every fetch
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Clamp a fetcher-suggested interval into the configured bounds
    pub fn clamp_interval(&self, suggested: Duration) -> Duration {
        suggested.clamp(
            Duration::from_secs(self.min_interval_secs),
            Duration::from_secs(self.max_interval_secs),
        )
    }

    /// Sub-second offset applied to every scheduled tick
    pub fn schedule_phase(&self) -> Duration {
        match self.schedule_phase_ms {
            Some(ms) => Duration::from_millis(ms),
            None => {
                let mut hasher = DefaultHasher::new();
                self.name.hash(&mut hasher);
                Duration::from_micros(hasher.finish() % 1_000_000)
            }
        }
    }
}

/// Debounce settings for refresh requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebounceConfig {
    /// Cooldown window in seconds
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Run the first request immediately instead of at the end of the window
    #[serde(default = "default_immediate")]
    pub immediate: bool,
}

impl DebounceConfig {
    /// Cooldown as a duration
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: default_cooldown_secs(),
            immediate: default_immediate(),
        }
    }
}

/// Backoff for the reconnect loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt
    #[serde(default = "default_reconnect_initial_secs")]
    pub initial_delay_secs: u64,

    /// Ceiling for the backoff delay
    #[serde(default = "default_reconnect_max_secs")]
    pub max_delay_secs: u64,

    /// Growth factor applied after each failed attempt
    #[serde(default = "default_reconnect_multiplier")]
    pub multiplier: u32,
}

impl ReconnectConfig {
    /// Validate the backoff settings
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.initial_delay_secs == 0 || self.initial_delay_secs > self.max_delay_secs {
            return Err(crate::Error::config(format!(
                "Reconnect delays must satisfy 0 < initial <= max (got {}..{})",
                self.initial_delay_secs, self.max_delay_secs
            )));
        }
        if self.multiplier == 0 {
            return Err(crate::Error::config("Reconnect multiplier must be >= 1"));
        }
        Ok(())
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_secs: default_reconnect_initial_secs(),
            max_delay_secs: default_reconnect_max_secs(),
            multiplier: default_reconnect_multiplier(),
        }
    }
}

fn default_min_interval_secs() -> u64 {
    1
}

fn default_max_interval_secs() -> u64 {
    86_400
}

fn default_fetch_timeout_secs() -> u64 {
    60
}

fn default_event_channel_capacity() -> usize {
    100
}

fn default_cooldown_secs() -> u64 {
    10
}

fn default_immediate() -> bool {
    true
}

fn default_reconnect_initial_secs() -> u64 {
    5
}

fn default_reconnect_max_secs() -> u64 {
    300
}

fn default_reconnect_multiplier() -> u32 {
    2
}
