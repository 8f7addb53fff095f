//! Broadcast event record and the event-type filter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A record broadcast to every connected event listener.
///
/// For operation events the metadata is the operation's current render;
/// for logging events it is an arbitrary log payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl Event {
    /// Wraps a payload into an event stamped with the current time.
    #[must_use]
    pub fn new(metadata: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            metadata,
        }
    }
}

/// Category of event a listener subscribes to.
///
/// The filter travels on the wire (`?type=logging,operation`) and is
/// recorded per listener for forward compatibility, but the current
/// broadcaster delivers every event regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Logging,
    Operation,
}

impl EventType {
    /// Parses a comma-separated filter string; unknown entries are ignored.
    /// An empty string yields the default of every type.
    #[must_use]
    pub fn parse_filter(filter: &str) -> Vec<EventType> {
        let types: Vec<EventType> = filter
            .split(',')
            .filter_map(|part| match part.trim() {
                "logging" => Some(EventType::Logging),
                "operation" => Some(EventType::Operation),
                _ => None,
            })
            .collect();

        if types.is_empty() {
            vec![EventType::Logging, EventType::Operation]
        } else {
            types
        }
    }
}
