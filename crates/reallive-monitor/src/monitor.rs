//! Live FLV consumption and the per-stream monitor registry.
//!
//! One tokio task per stream pulls `{base}/{namespace}/{stream_id}.flv`,
//! feeds every chunk through a fresh [`SeiStreamParser`] for that
//! connection, and merges decoded payloads into the [`TelemetryCache`].
//! Any failure (bad status, transport error, server closing the body)
//! leads to a fixed-delay reconnect; only a stop request ends the task.
//!
//! ```text
//!          ┌──────────── reconnect delay ◄───────────┐
//!          ▼                                          │
//!   Idle → Connecting → Streaming ── error / EOF ─────┘
//!                  └──── bad status ────────────────────┘
//!   (any) ── stop ──► Stopped
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::StreamExt;
use reqwest::{Client, Url};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use reallive_common::ids::normalize_stream_key;
use reallive_sei::SeiStreamParser;

use crate::cache::TelemetryCache;
use crate::config::{MonitorConfig, DEFAULT_NAMESPACE};
use crate::error::ConnectError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorPhase {
    /// Waiting out the reconnect delay (or not yet started).
    Idle,
    /// Request sent, waiting for response headers.
    Connecting,
    /// Reading the body.
    Streaming,
    /// Task has exited.
    Stopped,
}

/// Live FLV URL for a stream. Both segments are percent-encoded.
pub fn stream_url(base: &Url, namespace: &str, stream_id: &str) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .pop_if_empty()
            .push(namespace)
            .push(&format!("{stream_id}.flv"));
    }
    url
}

/// Resolves once stop has been requested or the stop sender is gone.
async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stop| *stop).await;
}

// ── Task ────────────────────────────────────────────────────────────

struct MonitorTask {
    stream_id: String,
    namespace: String,
    url: Url,
    client: Client,
    cache: Arc<TelemetryCache>,
    reconnect_delay: Duration,
    running: Arc<AtomicBool>,
    phase_tx: watch::Sender<MonitorPhase>,
}

impl MonitorTask {
    fn running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn set_phase(&self, phase: MonitorPhase) {
        self.phase_tx.send_replace(phase);
    }

    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        tracing::info!(
            stream_id = %self.stream_id,
            namespace = %self.namespace,
            url = %self.url,
            "sei monitor started"
        );

        let mut connections: u64 = 0;
        while self.running() {
            self.set_phase(MonitorPhase::Connecting);
            connections += 1;

            let result = tokio::select! {
                result = self.consume() => result,
                _ = stop_requested(&mut stop_rx) => break,
            };
            if !self.running() {
                break;
            }
            if let Err(e) = result {
                tracing::warn!(
                    stream_id = %self.stream_id,
                    attempt = connections,
                    error = %e,
                    "sei stream interrupted, reconnecting"
                );
            }

            self.set_phase(MonitorPhase::Idle);
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = stop_requested(&mut stop_rx) => break,
            }
        }

        self.set_phase(MonitorPhase::Stopped);
        tracing::info!(stream_id = %self.stream_id, "sei monitor stopped");
    }

    /// One connection. Only returns once the stream is over.
    async fn consume(&self) -> Result<(), ConnectError> {
        let response = self.client.get(self.url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ConnectError::Status(status.as_u16()));
        }

        self.set_phase(MonitorPhase::Streaming);
        tracing::debug!(stream_id = %self.stream_id, "sei stream connected");

        let mut parser = SeiStreamParser::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for payload in parser.push(&chunk) {
                self.cache.update(&self.stream_id, &payload);
            }
            if !self.running() {
                return Ok(());
            }
        }

        if parser.is_rejected() {
            tracing::debug!(stream_id = %self.stream_id, "stream was not FLV");
        }
        Err(ConnectError::StreamClosed)
    }
}

// ── Registry ────────────────────────────────────────────────────────

struct MonitorHandle {
    namespace: String,
    running: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
    phase_rx: watch::Receiver<MonitorPhase>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    async fn shutdown(self, stream_id: &str) {
        self.running.store(false, Ordering::Release);
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(stream_id = %stream_id, error = %e, "sei monitor task failed");
        }
    }
}

/// At most one live monitor per stream id.
#[derive(Clone)]
pub struct MonitorRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    monitors: DashMap<String, MonitorHandle>,
    /// Held across remove, shutdown and insert in `start` and `stop`.
    lifecycle: Mutex<()>,
    cache: Arc<TelemetryCache>,
    client: Client,
    flv_base: Url,
    reconnect_delay: Duration,
}

impl MonitorRegistry {
    pub fn new(cache: Arc<TelemetryCache>, config: &MonitorConfig) -> Result<Self, ConnectError> {
        let client = Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
        Ok(Self::with_client(cache, client, config))
    }

    pub fn with_client(cache: Arc<TelemetryCache>, client: Client, config: &MonitorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                monitors: DashMap::new(),
                lifecycle: Mutex::new(()),
                cache,
                client,
                flv_base: config.flv_base.clone(),
                reconnect_delay: config.reconnect_delay,
            }),
        }
    }

    pub fn cache(&self) -> &Arc<TelemetryCache> {
        &self.inner.cache
    }

    /// Start monitoring `stream_id` under `namespace`.
    ///
    /// No-op for an empty id or when the same namespace is already running.
    /// A different namespace stops the old task and waits for it to exit
    /// before the new one is spawned.
    pub async fn start(&self, stream_id: &str, namespace: &str) {
        let stream_id = normalize_stream_key(stream_id);
        if stream_id.is_empty() {
            return;
        }
        let namespace = match namespace.trim() {
            "" => DEFAULT_NAMESPACE,
            ns => ns,
        };

        let _guard = self.inner.lifecycle.lock().await;
        if let Some((_, previous)) = self
            .inner
            .monitors
            .remove_if(&stream_id, |_, handle| handle.namespace != namespace)
        {
            tracing::info!(
                stream_id = %stream_id,
                from = %previous.namespace,
                to = %namespace,
                "namespace changed, restarting sei monitor"
            );
            previous.shutdown(&stream_id).await;
        }

        match self.inner.monitors.entry(stream_id.clone()) {
            Entry::Occupied(_) => {}
            Entry::Vacant(slot) => {
                slot.insert(self.spawn(stream_id, namespace.to_string()));
            }
        }
    }

    fn spawn(&self, stream_id: String, namespace: String) -> MonitorHandle {
        let running = Arc::new(AtomicBool::new(true));
        let (stop_tx, stop_rx) = watch::channel(false);
        let (phase_tx, phase_rx) = watch::channel(MonitorPhase::Idle);

        let task = MonitorTask {
            url: stream_url(&self.inner.flv_base, &namespace, &stream_id),
            stream_id,
            namespace: namespace.clone(),
            client: self.inner.client.clone(),
            cache: self.inner.cache.clone(),
            reconnect_delay: self.inner.reconnect_delay,
            running: running.clone(),
            phase_tx,
        };

        MonitorHandle {
            namespace,
            running,
            stop_tx,
            phase_rx,
            task: tokio::spawn(task.run(stop_rx)),
        }
    }

    /// Stop the monitor and wait for its task to exit. Returns whether one
    /// was running.
    pub async fn stop(&self, stream_id: &str) -> bool {
        let stream_id = normalize_stream_key(stream_id);
        let _guard = self.inner.lifecycle.lock().await;
        match self.inner.monitors.remove(&stream_id) {
            Some((_, handle)) => {
                handle.shutdown(&stream_id).await;
                true
            }
            None => false,
        }
    }

    pub async fn stop_all(&self) {
        let ids: Vec<String> = self
            .inner
            .monitors
            .iter()
            .map(|m| m.key().clone())
            .collect();
        for id in ids {
            self.stop(&id).await;
        }
    }

    pub fn phase(&self, stream_id: &str) -> Option<MonitorPhase> {
        self.inner
            .monitors
            .get(&normalize_stream_key(stream_id))
            .map(|m| *m.phase_rx.borrow())
    }

    /// Phase updates for the monitor currently registered under `stream_id`.
    /// The receiver outlives the monitor and ends on [`MonitorPhase::Stopped`].
    pub fn watch_phase(&self, stream_id: &str) -> Option<watch::Receiver<MonitorPhase>> {
        self.inner
            .monitors
            .get(&normalize_stream_key(stream_id))
            .map(|m| m.phase_rx.clone())
    }

    pub fn namespace(&self, stream_id: &str) -> Option<String> {
        self.inner
            .monitors
            .get(&normalize_stream_key(stream_id))
            .map(|m| m.namespace.clone())
    }

    /// `(stream_id, namespace)` of every registered monitor, sorted.
    pub fn active(&self) -> Vec<(String, String)> {
        let mut out: Vec<_> = self
            .inner
            .monitors
            .iter()
            .map(|m| (m.key().clone(), m.namespace.clone()))
            .collect();
        out.sort();
        out
    }
}
