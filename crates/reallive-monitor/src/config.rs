//! Monitor configuration.
//!
//! A TOML file deserializes into [`MonitorConfigInput`], where every field is
//! optional. Environment variables and CLI flags are layered on top of the
//! input, and [`MonitorConfigInput::resolve`] fills defaults and validates
//! the result into a [`MonitorConfig`].
//!
//! ```toml
//! flv_base_url = "http://srs:8080"
//! stale_after_ms = 60000
//! srs_api = "http://srs:1985"
//!
//! [[streams]]
//! key = "cam-1"
//! namespace = "live"
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use reallive_common::ids::normalize_stream_key;

use crate::error::ConfigError;

pub const DEFAULT_FLV_BASE: &str = "http://localhost:8080";
pub const DEFAULT_NAMESPACE: &str = "live";
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1500);
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(300);
pub const MIN_STALE_AFTER: Duration = Duration::from_secs(1);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub const ENV_FLV_BASE: &str = "SRS_FLV_BASE";
pub const ENV_STALE_MS: &str = "SEI_CACHE_STALE_MS";
pub const ENV_SRS_API: &str = "SRS_API";

// ── Input (as parsed) ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MonitorConfigInput {
    pub flv_base_url: Option<String>,
    pub reconnect_delay_ms: Option<u64>,
    pub stale_after_ms: Option<u64>,
    pub sweep_interval_ms: Option<u64>,
    pub srs_api: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub streams: Vec<StreamConfigInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StreamConfigInput {
    pub key: String,
    pub namespace: Option<String>,
}

impl StreamConfigInput {
    /// Parse the CLI form `key` or `key@namespace`.
    pub fn parse(arg: &str) -> Self {
        match arg.rsplit_once('@') {
            Some((key, namespace)) => Self {
                key: key.to_string(),
                namespace: Some(namespace.to_string()),
            },
            None => Self {
                key: arg.to_string(),
                namespace: None,
            },
        }
    }
}

// ── Resolved ────────────────────────────────────────────────────────

/// One stream to monitor from startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamTarget {
    pub stream_id: String,
    pub namespace: String,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Base of the live FLV endpoint; streams live at
    /// `{flv_base}/{namespace}/{stream_id}.flv`.
    pub flv_base: Url,
    pub reconnect_delay: Duration,
    /// Entries untouched for longer than this read as absent.
    pub stale_after: Duration,
    pub sweep_interval: Duration,
    /// SRS HTTP API; enables the live-status poller when set.
    pub srs_api: Option<Url>,
    pub poll_interval: Duration,
    pub streams: Vec<StreamTarget>,
}

fn parse_base_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::Invalid(format!("{field}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::Invalid(format!(
            "{field}: unsupported scheme {}",
            url.scheme()
        )));
    }
    if url.cannot_be_a_base() {
        return Err(ConfigError::Invalid(format!("{field}: not a base URL")));
    }
    Ok(url)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

impl MonitorConfigInput {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(toml::from_str(input)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `SRS_FLV_BASE`, `SEI_CACHE_STALE_MS` and `SRS_API` through
    /// `lookup`. Unparseable numbers are ignored.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(base) = non_empty(lookup(ENV_FLV_BASE)) {
            self.flv_base_url = Some(base);
        }
        if let Some(ms) = lookup(ENV_STALE_MS).and_then(|v| v.trim().parse::<u64>().ok()) {
            self.stale_after_ms = Some(ms);
        }
        if let Some(api) = non_empty(lookup(ENV_SRS_API)) {
            self.srs_api = Some(api);
        }
        self
    }

    pub fn resolve(self) -> Result<MonitorConfig, ConfigError> {
        let flv_base = parse_base_url(
            "flv_base_url",
            non_empty(self.flv_base_url).as_deref().unwrap_or(DEFAULT_FLV_BASE),
        )?;
        let srs_api = non_empty(self.srs_api)
            .map(|raw| parse_base_url("srs_api", &raw))
            .transpose()?;

        let stale_after = self
            .stale_after_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_STALE_AFTER)
            .max(MIN_STALE_AFTER);

        let interval = |ms: Option<u64>, default: Duration, field: &str| {
            let d = ms.map(Duration::from_millis).unwrap_or(default);
            if d.is_zero() {
                Err(ConfigError::Invalid(format!("{field} must be positive")))
            } else {
                Ok(d)
            }
        };
        let sweep_interval = interval(
            self.sweep_interval_ms,
            DEFAULT_SWEEP_INTERVAL,
            "sweep_interval_ms",
        )?;
        let poll_interval = interval(
            self.poll_interval_ms,
            DEFAULT_POLL_INTERVAL,
            "poll_interval_ms",
        )?;

        let mut seen = HashSet::new();
        let mut streams = Vec::new();
        for stream in self.streams {
            let stream_id = normalize_stream_key(&stream.key);
            if stream_id.is_empty() || !seen.insert(stream_id.clone()) {
                continue;
            }
            let namespace =
                non_empty(stream.namespace).unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
            streams.push(StreamTarget {
                stream_id,
                namespace,
            });
        }

        Ok(MonitorConfig {
            flv_base,
            reconnect_delay: self
                .reconnect_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RECONNECT_DELAY),
            stale_after,
            sweep_interval,
            srs_api,
            poll_interval,
            streams,
        })
    }
}

impl MonitorConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        MonitorConfigInput::from_toml_str(input)?.resolve()
    }
}
