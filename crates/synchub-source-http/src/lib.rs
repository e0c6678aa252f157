// # HTTP/JSON Source
//
// This crate provides a fetch hook that GETs a JSON document over HTTP.
//
// ## Purpose
//
// A reference collaborator for the coordination engine and the data source
// used by `synchubd`. Vendor integrations with their own protocol implement
// `Fetcher` directly instead.
//
// ## Error Classification
//
// | Response                         | UpdateError      |
// |----------------------------------|------------------|
// | request timeout                  | Timeout          |
// | connect / transport failure      | Connection       |
// | 401, 403                         | Authentication   |
// | 410 Gone                         | Rejected         |
// | 429, 5xx, other non-2xx          | Failed           |
// | body is not valid JSON           | Failed           |
//
// A successful response may suggest the next polling interval through
// `Retry-After` (delay in seconds) or `Cache-Control: max-age`.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use tracing::debug;

use synchub_core::traits::{Fetched, Fetcher};
use synchub_core::{Error, FetchGate, Result, UpdateError};

/// Default request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Configuration for one HTTP/JSON source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSourceConfig {
    /// Source name (used in logs)
    pub name: String,

    /// URL to GET
    pub url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra request headers (e.g. `Authorization`)
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl HttpSourceConfig {
    /// Create a config with the default timeout and no extra headers
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            headers: BTreeMap::new(),
        }
    }

    /// Set the request timeout
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Add a request header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::config("HTTP source name cannot be empty"));
        }
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(Error::config(format!(
                "{}: URL must start with http:// or https:// (got {})",
                self.name, self.url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(Error::config(format!("{}: timeout must be > 0", self.name)));
        }
        Ok(())
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Fetches a JSON document over HTTP
pub struct HttpJsonSource {
    config: HttpSourceConfig,
    client: reqwest::Client,
    gate: Option<FetchGate>,
}

impl HttpJsonSource {
    /// Create a new HTTP/JSON source
    ///
    /// # Returns
    ///
    /// - `Ok(HttpJsonSource)`: Ready to fetch
    /// - `Err(Error::Config)`: Invalid config, header, or HTTP client setup
    pub fn new(config: HttpSourceConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                Error::config(format!("{}: invalid header name {}: {}", config.name, name, e))
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                Error::config(format!("{}: invalid value for header {}: {}", config.name, name, e))
            })?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::config(format!("{}: failed to build HTTP client: {}", config.name, e)))?;

        Ok(Self {
            config,
            client,
            gate: None,
        })
    }

    /// Share a transport gate with sibling sources
    pub fn with_gate(mut self, gate: FetchGate) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Source name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Source configuration
    pub fn config(&self) -> &HttpSourceConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl Fetcher<serde_json::Value> for HttpJsonSource {
    async fn fetch(&self) -> std::result::Result<Fetched<serde_json::Value>, UpdateError> {
        let response = self
            .client
            .get(&self.config.url)
            .send()
            .await
            .map_err(|e| classify_transport(&e, self.config.timeout()))?;

        let status = response.status();
        let headers = response.headers().clone();
        classify_status(status, &headers)?;

        let body = response
            .bytes()
            .await
            .map_err(|e| classify_transport(&e, self.config.timeout()))?;
        let data: serde_json::Value = serde_json::from_slice(&body)
            .map_err(|e| UpdateError::failed(format!("invalid JSON from {}: {}", self.config.url, e)))?;

        let mut fetched = Fetched::new(data);
        if let Some(next) = suggested_interval(&headers) {
            debug!("{}: server suggests next fetch in {:?}", self.config.name, next);
            fetched = fetched.with_next_interval(next);
        }
        Ok(fetched)
    }

    fn gate(&self) -> Option<&FetchGate> {
        self.gate.as_ref()
    }
}

/// Map a reqwest failure to an update error
fn classify_transport(err: &reqwest::Error, timeout: Duration) -> UpdateError {
    if err.is_timeout() {
        UpdateError::Timeout(timeout)
    } else if err.is_decode() {
        UpdateError::failed(format!("failed to read response: {}", err))
    } else {
        UpdateError::connection(err.to_string())
    }
}

/// Map a non-success HTTP status to an update error
fn classify_status(status: StatusCode, headers: &HeaderMap) -> std::result::Result<(), UpdateError> {
    if status.is_success() {
        return Ok(());
    }

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            UpdateError::auth(format!("HTTP {}", status))
        }
        StatusCode::GONE => UpdateError::rejected(format!("HTTP {}", status)),
        StatusCode::TOO_MANY_REQUESTS => match header_str(headers, &RETRY_AFTER).and_then(parse_retry_after) {
            Some(delay) => UpdateError::failed(format!("HTTP {} (retry after {}s)", status, delay.as_secs())),
            None => UpdateError::failed(format!("HTTP {}", status)),
        },
        _ => UpdateError::failed(format!("HTTP {}", status)),
    })
}

/// Next-interval hint carried by a successful response
fn suggested_interval(headers: &HeaderMap) -> Option<Duration> {
    header_str(headers, &RETRY_AFTER)
        .and_then(parse_retry_after)
        .or_else(|| header_str(headers, &CACHE_CONTROL).and_then(parse_max_age))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `Retry-After` in its delay-seconds form; HTTP dates are ignored
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// `max-age` directive of a `Cache-Control` header
fn parse_max_age(value: &str) -> Option<Duration> {
    value
        .split(',')
        .map(str::trim)
        .find_map(|directive| directive.strip_prefix("max-age="))
        .and_then(|secs| secs.trim_matches('"').parse::<u64>().ok())
        .map(Duration::from_secs)
}
