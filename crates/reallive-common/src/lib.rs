//! Shared types for the RealLive SEI monitor.
//!
//! This crate contains:
//! - **Stream keys** — normalization of stream identifiers from URLs and payloads
//! - **Data models** — telemetry snapshot, history sample, person state and events
//! - **Normalization** — turning the loosely typed SEI JSON into those models
//! - **Events** — what the telemetry cache pushes to its subscriber

pub mod events;
pub mod ids;
pub mod models;
pub mod normalize;
