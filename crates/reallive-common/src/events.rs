//! Events pushed out of the telemetry cache.

use serde::{Deserialize, Serialize};

use crate::models::PersonEvent;

/// Event delivered to the cache's subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CacheEvent {
    /// A new (non-duplicate) person detection arrived over SEI.
    #[serde(rename = "person.detected")]
    PersonDetected {
        stream_id: String,
        event: PersonEvent,
    },

    /// The stream's entry went stale and was evicted.
    #[serde(rename = "stream.offline")]
    Offline { stream_id: String },
}

impl CacheEvent {
    pub fn stream_id(&self) -> &str {
        match self {
            CacheEvent::PersonDetected { stream_id, .. } | CacheEvent::Offline { stream_id } => {
                stream_id
            }
        }
    }
}
