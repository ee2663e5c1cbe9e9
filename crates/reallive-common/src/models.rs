//! Telemetry data models.
//!
//! These are the normalized forms of what cameras report over SEI. The
//! cache stores them and hands owned copies to readers; field names
//! serialize in camelCase for the query layer.

use serde::{Deserialize, Serialize};

// ── Device telemetry ────────────────────────────────────────────────

/// Latest device health report from one camera.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    /// Overall CPU load, 0–100, one decimal.
    pub cpu_pct: f64,
    /// Per-core CPU load, each 0–100, one decimal.
    pub cpu_core_pct: Vec<f64>,
    pub memory_pct: f64,
    pub storage_pct: f64,
    pub memory_used_mb: f64,
    pub memory_total_mb: f64,
    pub storage_used_gb: f64,
    pub storage_total_gb: f64,
}

/// One entry of the telemetry history ring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySample {
    /// Sample time, Unix milliseconds.
    pub ts: i64,
    pub cpu_pct: f64,
    pub cpu_core_pct: Vec<f64>,
    pub memory_pct: f64,
    pub storage_pct: f64,
    pub storage_used_gb: f64,
    pub storage_total_gb: f64,
}

impl TelemetrySample {
    pub fn from_snapshot(ts: i64, snapshot: &TelemetrySnapshot) -> Self {
        Self {
            ts,
            cpu_pct: snapshot.cpu_pct,
            cpu_core_pct: snapshot.cpu_core_pct.clone(),
            memory_pct: snapshot.memory_pct,
            storage_pct: snapshot.storage_pct,
            storage_used_gb: snapshot.storage_used_gb,
            storage_total_gb: snapshot.storage_total_gb,
        }
    }
}

// ── Person detection ────────────────────────────────────────────────

/// Detection bounding box in frame pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl BoundingBox {
    /// A box with zero width or height does not describe a detection.
    pub fn has_area(&self) -> bool {
        self.w > 0 && self.h > 0
    }
}

/// Current person-detection state of a camera.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonState {
    /// Never true without a box that has area.
    pub active: bool,
    /// Confidence, 0–1, three decimals.
    pub score: f64,
    /// Unix milliseconds.
    pub ts: i64,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersonEventKind {
    #[serde(rename = "person-detected")]
    PersonDetected,
}

impl std::fmt::Display for PersonEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersonEventKind::PersonDetected => write!(f, "person-detected"),
        }
    }
}

/// One discrete person-detection occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonEvent {
    #[serde(rename = "type")]
    pub kind: PersonEventKind,
    /// Unix milliseconds.
    pub ts: i64,
    pub score: f64,
    pub bbox: BoundingBox,
}

/// Deduplication identity. Events differing only in score collide.
pub type PersonEventKey = (PersonEventKind, i64, u32, u32, u32, u32);

impl PersonEvent {
    pub fn dedup_key(&self) -> PersonEventKey {
        (
            self.kind,
            self.ts,
            self.bbox.x,
            self.bbox.y,
            self.bbox.w,
            self.bbox.h,
        )
    }
}

// ── Read snapshot ───────────────────────────────────────────────────

/// Everything the cache knows about one stream, as an owned copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeiInfo {
    /// Last mutation, Unix milliseconds.
    pub updated_at: i64,
    pub telemetry: Option<TelemetrySnapshot>,
    pub telemetry_history: Vec<TelemetrySample>,
    pub camera_config: Option<serde_json::Map<String, serde_json::Value>>,
    pub configurable: Option<serde_json::Map<String, serde_json::Value>>,
    pub person: Option<PersonState>,
    /// Most recent events, oldest first.
    pub person_events: Vec<PersonEvent>,
}
