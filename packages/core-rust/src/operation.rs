//! Rendered operation record.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::StatusCode;

/// A background operation as rendered on the wire.
///
/// This is the `metadata` payload of an async response and of every
/// operation event; it is also the body returned by
/// `GET /<version>/operations/<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// Unique identifier (UUID v4, canonical lowercase hyphenated form).
    pub id: String,
    /// Free-form label describing the work.
    pub description: String,
    pub created_at: DateTime<Utc>,
    /// Advances on every state change.
    pub updated_at: DateTime<Utc>,
    /// Display name of `status_code`.
    pub status: String,
    pub status_code: StatusCode,
    /// Resource kind to versioned resource URLs, e.g.
    /// `"containers" -> ["/1.0/containers/a", "/1.0/containers/b"]`.
    #[serde(default)]
    pub resources: HashMap<String, Vec<String>>,
    /// Free-form key/value metadata supplied at creation.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Error message; empty unless the final state is Failure or Cancelled.
    #[serde(default)]
    pub err: String,
}

impl Operation {
    /// True once the operation has reached an end state.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.status_code.is_final()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Operation {
        Operation {
            id: "5cddc104-67cd-4e05-8b87-85b1d4deeffe".to_string(),
            description: "test operation".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            status: StatusCode::Pending.as_str().to_string(),
            status_code: StatusCode::Pending,
            resources: HashMap::from([(
                "widgets".to_string(),
                vec!["/1.0/widgets/one".to_string()],
            )]),
            metadata: HashMap::new(),
            err: String::new(),
        }
    }

    #[test]
    fn json_round_trip() {
        let op = sample();
        let json = serde_json::to_string(&op).unwrap();
        let back: Operation = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, op.id);
        assert_eq!(back.status_code, StatusCode::Pending);
        assert_eq!(back.status, "Pending");
        assert_eq!(back.resources["widgets"], vec!["/1.0/widgets/one"]);
    }

    #[test]
    fn status_code_serializes_numerically() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["status_code"], 105);
        assert_eq!(json["status"], "Pending");
    }

    #[test]
    fn missing_optional_fields_default() {
        let json = r#"{
            "id": "x", "description": "", "status": "Success", "status_code": 200,
            "created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-01T00:00:00Z"
        }"#;
        let op: Operation = serde_json::from_str(json).unwrap();
        assert!(op.resources.is_empty());
        assert!(op.metadata.is_empty());
        assert!(op.err.is_empty());
        assert!(op.is_final());
    }
}
