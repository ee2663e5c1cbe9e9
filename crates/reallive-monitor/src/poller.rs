//! SRS live-status poller.
//!
//! Polls the SRS HTTP API for publishing streams and keeps one monitor
//! running per live stream: newly published streams are started under their
//! SRS app as namespace, streams that stop publishing are stopped.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::{Client, Url};
use serde::Deserialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use reallive_common::ids::normalize_stream_key;

use crate::config::DEFAULT_NAMESPACE;
use crate::error::ConnectError;
use crate::monitor::MonitorRegistry;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

// ── SRS API response ────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StreamsResponse {
    pub code: i64,
    pub streams: Vec<SrsStream>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SrsStream {
    pub name: String,
    pub app: Option<String>,
    pub publish: SrsPublish,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SrsPublish {
    pub active: bool,
}

/// `stream_id → namespace` for every stream currently publishing.
pub fn active_streams(response: &StreamsResponse) -> BTreeMap<String, String> {
    response
        .streams
        .iter()
        .filter(|s| s.publish.active)
        .filter_map(|s| {
            let stream_id = normalize_stream_key(&s.name);
            if stream_id.is_empty() {
                return None;
            }
            let namespace = s
                .app
                .as_deref()
                .map(str::trim)
                .filter(|app| !app.is_empty())
                .unwrap_or(DEFAULT_NAMESPACE)
                .to_string();
            Some((stream_id, namespace))
        })
        .collect()
}

/// `{api}/api/v1/streams/`
pub fn streams_url(api: &Url) -> Url {
    let mut url = api.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().extend(["api", "v1", "streams", ""]);
    }
    url
}

// ── Poller ──────────────────────────────────────────────────────────

pub struct LivePoller {
    registry: MonitorRegistry,
    client: Client,
    url: Url,
    interval: Duration,
    /// Streams this poller started, with the namespace they run under.
    started: BTreeMap<String, String>,
}

impl LivePoller {
    pub fn new(
        registry: MonitorRegistry,
        api: &Url,
        interval: Duration,
    ) -> Result<Self, ConnectError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            registry,
            client,
            url: streams_url(api),
            interval,
            started: BTreeMap::new(),
        })
    }

    async fn fetch(&self) -> Result<StreamsResponse, ConnectError> {
        let response = self.client.get(self.url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectError::Status(status.as_u16()));
        }
        let body: StreamsResponse = response.json().await?;
        if body.code != 0 {
            return Err(ConnectError::Api(body.code));
        }
        Ok(body)
    }

    /// Start and stop monitors so they match `current`.
    pub async fn reconcile(&mut self, current: BTreeMap<String, String>) {
        for (stream_id, namespace) in &current {
            if self.started.get(stream_id) != Some(namespace) {
                tracing::info!(stream_id = %stream_id, namespace = %namespace, "stream went live");
                self.registry.start(stream_id, namespace).await;
            }
        }
        for stream_id in self.started.keys() {
            if !current.contains_key(stream_id) {
                tracing::info!(stream_id = %stream_id, "stream no longer publishing");
                self.registry.stop(stream_id).await;
            }
        }
        self.started = current;
    }

    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            url = %self.url,
            interval_ms = self.interval.as_millis() as u64,
            "live-status poller started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.fetch().await {
                        Ok(response) => self.reconcile(active_streams(&response)).await,
                        Err(e) => tracing::warn!(error = %e, "SRS stream poll failed"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        tracing::info!("live-status poller stopped");
    }
}
