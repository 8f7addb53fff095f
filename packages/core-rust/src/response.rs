//! Response envelope.
//!
//! Every REST response body is one of three envelope shapes, discriminated
//! by the `type` field:
//!
//! - `sync`: the request completed; `status`/`status_code` describe the
//!   outcome and `metadata` carries the payload.
//! - `async`: a background operation was spawned; `operation` is its URL and
//!   `metadata` the operation's current render.
//! - `error`: the request failed; `error`/`error_code` describe why.

use serde::{Deserialize, Serialize};

use crate::operation::Operation;

/// Discriminator for the three envelope shapes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    #[default]
    Sync,
    Async,
    Error,
}

/// Decoded response envelope.
///
/// All fields are optional on the wire depending on the envelope shape;
/// absent fields decode to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    #[serde(rename = "type")]
    pub response_type: ResponseType,

    /// Valid only for sync responses.
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub status_code: i64,

    /// Valid only for async responses: URL of the spawned operation.
    #[serde(default)]
    pub operation: String,

    /// Valid only for error responses.
    #[serde(default)]
    pub error_code: i64,
    #[serde(default)]
    pub error: String,

    /// Payload; shape depends on the endpoint.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Response {
    /// Decodes the metadata payload into an arbitrary type.
    ///
    /// # Errors
    ///
    /// Returns a decode error when the metadata does not match `T`.
    pub fn metadata_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.metadata.clone())
    }

    /// Decodes the metadata payload as a rendered operation.
    ///
    /// # Errors
    ///
    /// Returns a decode error when the metadata is not an operation render.
    pub fn metadata_as_operation(&self) -> Result<Operation, serde_json::Error> {
        self.metadata_as()
    }

    /// Decodes the metadata payload as a generic JSON object.
    ///
    /// # Errors
    ///
    /// Returns a decode error when the metadata is not an object.
    pub fn metadata_as_map(
        &self,
    ) -> Result<serde_json::Map<String, serde_json::Value>, serde_json::Error> {
        self.metadata_as()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusCode;

    #[test]
    fn response_type_wire_names() {
        assert_eq!(serde_json::to_string(&ResponseType::Sync).unwrap(), "\"sync\"");
        assert_eq!(
            serde_json::to_string(&ResponseType::Async).unwrap(),
            "\"async\""
        );
        assert_eq!(
            serde_json::to_string(&ResponseType::Error).unwrap(),
            "\"error\""
        );
    }

    #[test]
    fn decodes_sync_envelope() {
        let body = r#"{
            "type": "sync",
            "status": "Success",
            "status_code": 200,
            "operation": "",
            "error_code": 0,
            "error": "",
            "metadata": {"answer": 42}
        }"#;
        let resp: Response = serde_json::from_str(body).unwrap();

        assert_eq!(resp.response_type, ResponseType::Sync);
        assert_eq!(resp.status_code, 200);
        let map = resp.metadata_as_map().unwrap();
        assert_eq!(map["answer"], 42);
    }

    #[test]
    fn decodes_error_envelope_with_missing_fields() {
        let body = r#"{"type": "error", "error": "not found", "error_code": 404}"#;
        let resp: Response = serde_json::from_str(body).unwrap();

        assert_eq!(resp.response_type, ResponseType::Error);
        assert_eq!(resp.error, "not found");
        assert_eq!(resp.error_code, 404);
        assert!(resp.status.is_empty());
    }

    #[test]
    fn decodes_async_envelope_metadata_as_operation() {
        let body = serde_json::json!({
            "type": "async",
            "status": "Created",
            "status_code": 100,
            "operation": "/1.0/operations/abc",
            "metadata": {
                "id": "abc",
                "description": "work",
                "created_at": "2024-01-01T00:00:00Z",
                "updated_at": "2024-01-01T00:00:00Z",
                "status": "Pending",
                "status_code": 105,
                "resources": {},
                "metadata": {},
                "err": ""
            }
        });
        let resp: Response = serde_json::from_value(body).unwrap();

        assert_eq!(resp.operation, "/1.0/operations/abc");
        let op = resp.metadata_as_operation().unwrap();
        assert_eq!(op.id, "abc");
        assert_eq!(op.status_code, StatusCode::Pending);
    }
}
