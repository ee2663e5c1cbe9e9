//! # Telemetry Cache
//!
//! In-memory, per-stream store of the latest decoded SEI telemetry.
//!
//! Each monitor task writes only its own key; readers get owned copies
//! ([`SeiInfo`]), never references into the map. Entries not refreshed within
//! the staleness threshold read as absent and are removed lazily on read or
//! by [`TelemetryCache::sweep_stale`].
//!
//! New person detections are pushed to a single subscriber, synchronously and
//! in payload order, after the entry lock has been released.

use std::collections::{HashSet, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use serde_json::{Map, Value};

use reallive_common::events::CacheEvent;
use reallive_common::ids::normalize_stream_key;
use reallive_common::models::{
    PersonEvent, PersonEventKey, PersonState, SeiInfo, TelemetrySample, TelemetrySnapshot,
};
use reallive_common::normalize::{
    normalize_timestamp_ms, person_event, person_state, telemetry_from_device,
};
use reallive_sei::SeiJson;

use crate::config::MIN_STALE_AFTER;

/// Telemetry samples kept per stream.
pub const HISTORY_CAP: usize = 120;
/// Person events kept per stream.
pub const EVENT_CAP: usize = 200;
/// Person events returned by a read.
pub const EVENTS_RETURNED: usize = 50;
/// The dedup set is rebuilt from the ring once it grows past this.
const DEDUP_REBUILD_AT: usize = EVENT_CAP * 3;

/// Current Unix time in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

// ── Subscriber ──────────────────────────────────────────────────────

/// Receiver of cache events. Called on the writer's task; keep it short.
pub trait EventHandler: Send + Sync {
    fn on_event(&self, event: CacheEvent);
}

impl<F> EventHandler for F
where
    F: Fn(CacheEvent) + Send + Sync,
{
    fn on_event(&self, event: CacheEvent) {
        self(event)
    }
}

// ── Entry ───────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct CacheEntry {
    updated_at: i64,
    telemetry: Option<TelemetrySnapshot>,
    history: VecDeque<TelemetrySample>,
    camera_config: Option<Map<String, Value>>,
    configurable: Option<Map<String, Value>>,
    person: Option<PersonState>,
    events: VecDeque<PersonEvent>,
    seen: HashSet<PersonEventKey>,
}

impl CacheEntry {
    fn is_stale(&self, now: i64, stale_after_ms: i64) -> bool {
        now - self.updated_at > stale_after_ms
    }

    /// Merge one payload. Returns the events that were new.
    fn merge(&mut self, stream_id: &str, payload: &SeiJson, payload_ts: i64) -> Vec<PersonEvent> {
        if let Some(device) = payload.get("device").and_then(Value::as_object) {
            let snapshot = telemetry_from_device(device);
            self.history
                .push_back(TelemetrySample::from_snapshot(payload_ts, &snapshot));
            while self.history.len() > HISTORY_CAP {
                self.history.pop_front();
            }
            self.telemetry = Some(snapshot);
            if self.history.len() == 1 {
                tracing::info!(stream_id = %stream_id, "telemetry online");
            }
        }

        if let Some(camera) = payload.get("camera").and_then(Value::as_object) {
            self.camera_config = Some(camera.clone());
        }
        if let Some(configurable) = payload.get("configurable").and_then(Value::as_object) {
            self.configurable = Some(configurable.clone());
        }
        if let Some(person) = payload.get("person").and_then(Value::as_object) {
            self.person = Some(person_state(person, payload_ts));
        }

        let mut fresh = Vec::new();
        if let Some(raw_events) = payload.get("events").and_then(Value::as_array) {
            for raw in raw_events {
                let Some(event) = person_event(raw, payload_ts) else {
                    continue;
                };
                if !self.seen.insert(event.dedup_key()) {
                    continue;
                }
                self.events.push_back(event.clone());
                fresh.push(event);
            }
            while self.events.len() > EVENT_CAP {
                self.events.pop_front();
            }
            if self.seen.len() > DEDUP_REBUILD_AT {
                self.seen = self.events.iter().map(PersonEvent::dedup_key).collect();
            }
        }
        fresh
    }

    fn to_info(&self) -> SeiInfo {
        let skip = self.events.len().saturating_sub(EVENTS_RETURNED);
        SeiInfo {
            updated_at: self.updated_at,
            telemetry: self.telemetry.clone(),
            telemetry_history: self.history.iter().cloned().collect(),
            camera_config: self.camera_config.clone(),
            configurable: self.configurable.clone(),
            person: self.person.clone(),
            person_events: self.events.iter().skip(skip).cloned().collect(),
        }
    }
}

/// Stream key named inside the payload, if any.
fn payload_stream_key(payload: &SeiJson) -> Option<String> {
    ["stream_key", "streamKey"]
        .iter()
        .filter_map(|field| payload.get(*field).and_then(Value::as_str))
        .map(normalize_stream_key)
        .find(|key| !key.is_empty())
}

// ── Cache ───────────────────────────────────────────────────────────

pub struct TelemetryCache {
    entries: DashMap<String, CacheEntry>,
    handler: ArcSwapOption<Box<dyn EventHandler>>,
    stale_after_ms: i64,
}

impl TelemetryCache {
    /// `stale_after` is raised to at least one second.
    pub fn new(stale_after: Duration) -> Self {
        let stale_after = stale_after.max(MIN_STALE_AFTER);
        Self {
            entries: DashMap::new(),
            handler: ArcSwapOption::empty(),
            stale_after_ms: i64::try_from(stale_after.as_millis()).unwrap_or(i64::MAX),
        }
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_millis(self.stale_after_ms as u64)
    }

    /// Install the event handler, replacing any previous one.
    pub fn subscribe(&self, handler: impl EventHandler + 'static) {
        self.handler.store(Some(Arc::new(Box::new(handler))));
    }

    pub fn unsubscribe(&self) {
        self.handler.store(None);
    }

    /// Merge a decoded payload received on `stream_id`'s monitor.
    pub fn update(&self, stream_id: &str, payload: &SeiJson) {
        self.update_at(stream_id, payload, now_ms());
    }

    pub fn update_at(&self, stream_id: &str, payload: &SeiJson, now: i64) {
        let key = payload_stream_key(payload).unwrap_or_else(|| normalize_stream_key(stream_id));
        if key.is_empty() {
            return;
        }
        let payload_ts = normalize_timestamp_ms(payload.get("ts"), now);

        let fresh = {
            let mut entry = self.entries.entry(key.clone()).or_default();
            let fresh = entry.merge(&key, payload, payload_ts);
            entry.updated_at = now;
            fresh
        };

        if !fresh.is_empty() {
            self.dispatch(fresh.into_iter().map(|event| CacheEvent::PersonDetected {
                stream_id: key.clone(),
                event,
            }));
        }
    }

    /// Owned copy of the stream's entry, or `None` if absent or stale.
    pub fn read(&self, stream_id: &str) -> Option<SeiInfo> {
        self.read_at(stream_id, now_ms())
    }

    pub fn read_at(&self, stream_id: &str, now: i64) -> Option<SeiInfo> {
        let key = normalize_stream_key(stream_id);
        if key.is_empty() {
            return None;
        }
        if self
            .entries
            .remove_if(&key, |_, entry| entry.is_stale(now, self.stale_after_ms))
            .is_some()
        {
            tracing::debug!(stream_id = %key, "evicted stale telemetry on read");
            return None;
        }
        self.entries.get(&key).map(|entry| entry.to_info())
    }

    /// Evict every stale entry and emit [`CacheEvent::Offline`] for each.
    /// Returns the evicted stream ids.
    pub fn sweep_stale(&self) -> Vec<String> {
        self.sweep_stale_at(now_ms())
    }

    pub fn sweep_stale_at(&self, now: i64) -> Vec<String> {
        let candidates: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.is_stale(now, self.stale_after_ms))
            .map(|entry| entry.key().clone())
            .collect();

        // A racing update refreshes the entry and keeps it alive.
        let evicted: Vec<String> = candidates
            .into_iter()
            .filter_map(|key| {
                self.entries
                    .remove_if(&key, |_, entry| entry.is_stale(now, self.stale_after_ms))
                    .map(|(key, _)| key)
            })
            .collect();

        for stream_id in &evicted {
            tracing::info!(stream_id = %stream_id, "telemetry offline");
        }
        self.dispatch(
            evicted
                .iter()
                .map(|stream_id| CacheEvent::Offline {
                    stream_id: stream_id.clone(),
                }),
        );
        evicted
    }

    /// Stream ids with an entry, stale or not.
    pub fn stream_ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn dispatch(&self, events: impl IntoIterator<Item = CacheEvent>) {
        let Some(handler) = self.handler.load_full() else {
            return;
        };
        for event in events {
            let stream_id = event.stream_id().to_string();
            if catch_unwind(AssertUnwindSafe(|| handler.on_event(event))).is_err() {
                tracing::error!(stream_id = %stream_id, "cache event handler panicked");
            }
        }
    }
}

impl std::fmt::Debug for TelemetryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryCache")
            .field("entries", &self.entries.len())
            .field("stale_after_ms", &self.stale_after_ms)
            .finish()
    }
}
