//! # reallive-monitor
//!
//! Turns live FLV feeds into queryable camera telemetry.
//!
//! - [`monitor`] — per-stream consumption loop and the registry that owns it
//! - [`cache`] — in-memory telemetry cache, person-event ring, subscriber push
//! - [`sweep`] — periodic stale-entry eviction
//! - [`poller`] — SRS live-status poller that drives the registry
//! - [`config`] — TOML/env configuration
//! - [`error`] — connection and configuration errors

pub mod cache;
pub mod config;
pub mod error;
pub mod monitor;
pub mod poller;
pub mod sweep;

pub use cache::TelemetryCache;
pub use config::MonitorConfig;
pub use monitor::{MonitorPhase, MonitorRegistry};
