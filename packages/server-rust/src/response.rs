//! Response renderers: every handler returns one of these, and the service
//! turns it into HTTP bytes.
//!
//! Three shapes mirror the envelope contract: a sync response for work that
//! completed inside the request, an operation response (HTTP 202) for work
//! spawned in the background, and an error response. Rendering an operation
//! response is what actually starts the operation.

use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue, StatusCode as HttpStatus};
use axum::response::{IntoResponse, Json};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::error;

use opflow_core::{Response as Envelope, ResponseType, StatusCode};

use crate::errs::CommonError;
use crate::operation::Operation;
use crate::registry::RegistryError;

// ---------------------------------------------------------------------------
// ApiResponse
// ---------------------------------------------------------------------------

/// What a handler returns; the service renders it after the handler exits.
pub enum ApiResponse {
    Sync(SyncResponse),
    /// Starts the operation when rendered and answers 202 with its URL.
    Operation(Arc<Operation>),
    Error(ErrorResponse),
    /// An already-rendered transport response (WebSocket upgrades).
    Raw(Box<axum::response::Response>),
}

/// Synchronous response with optional header decorations.
pub struct SyncResponse {
    success: bool,
    metadata: serde_json::Value,
    etag: Option<serde_json::Value>,
    location: Option<String>,
    code: Option<u16>,
    headers: Vec<(String, String)>,
}

impl SyncResponse {
    /// Adds an `ETag` header derived from hashing `value`.
    #[must_use]
    pub fn with_etag<T: Serialize>(mut self, value: &T) -> Self {
        self.etag = serde_json::to_value(value).ok();
        self
    }

    /// Adds a `Location` header; the response status becomes 201 unless
    /// overridden with [`SyncResponse::with_code`].
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Overrides the HTTP status code.
    #[must_use]
    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    /// Adds an arbitrary response header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Finishes the builder.
    #[must_use]
    pub fn into_response(self) -> ApiResponse {
        ApiResponse::Sync(self)
    }
}

/// Error response carrying the wire error code and message.
pub struct ErrorResponse {
    code: HttpStatus,
    msg: String,
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

/// Synchronous response renderer.
pub fn sync_response<T: Serialize>(success: bool, metadata: &T) -> SyncResponse {
    let metadata = serde_json::to_value(metadata).unwrap_or(serde_json::Value::Null);
    SyncResponse {
        success,
        metadata,
        etag: None,
        location: None,
        code: None,
        headers: Vec::new(),
    }
}

/// Empty successful synchronous response.
#[must_use]
pub fn empty_sync_response() -> ApiResponse {
    sync_response(true, &serde_json::Map::new()).into_response()
}

/// Permanent-redirect response to `address`.
#[must_use]
pub fn sync_response_redirect(address: impl Into<String>) -> ApiResponse {
    sync_response(true, &serde_json::Value::Null)
        .with_location(address)
        .with_code(308)
        .into_response()
}

/// Operation (async) response renderer.
#[must_use]
pub fn operation_response(op: Arc<Operation>) -> ApiResponse {
    ApiResponse::Operation(op)
}

/// 501 response for unimplemented methods.
#[must_use]
pub fn not_implemented() -> ApiResponse {
    ApiResponse::Error(ErrorResponse {
        code: HttpStatus::NOT_IMPLEMENTED,
        msg: "not implemented".to_string(),
    })
}

/// Plain 404 response.
#[must_use]
pub fn not_found() -> ApiResponse {
    ApiResponse::Error(ErrorResponse {
        code: HttpStatus::NOT_FOUND,
        msg: "not found".to_string(),
    })
}

/// 404 response naming the missing resource.
#[must_use]
pub fn not_found_error(what: impl Into<String>) -> ApiResponse {
    ApiResponse::Error(ErrorResponse {
        code: HttpStatus::NOT_FOUND,
        msg: CommonError::not_found(what).to_string(),
    })
}

/// Plain 403 response.
#[must_use]
pub fn forbidden() -> ApiResponse {
    ApiResponse::Error(ErrorResponse {
        code: HttpStatus::FORBIDDEN,
        msg: "not authorized".to_string(),
    })
}

/// Plain 409 response.
#[must_use]
pub fn conflict() -> ApiResponse {
    ApiResponse::Error(ErrorResponse {
        code: HttpStatus::CONFLICT,
        msg: "already exists".to_string(),
    })
}

/// Plain 503 response.
#[must_use]
pub fn service_unavailable() -> ApiResponse {
    ApiResponse::Error(ErrorResponse {
        code: HttpStatus::SERVICE_UNAVAILABLE,
        msg: "service unavailable".to_string(),
    })
}

/// 400 response for malformed requests.
pub fn bad_request(err: impl std::fmt::Display) -> ApiResponse {
    ApiResponse::Error(ErrorResponse {
        code: HttpStatus::BAD_REQUEST,
        msg: err.to_string(),
    })
}

/// 401 response.
pub fn authorization_error(err: impl std::fmt::Display) -> ApiResponse {
    ApiResponse::Error(ErrorResponse {
        code: HttpStatus::UNAUTHORIZED,
        msg: err.to_string(),
    })
}

/// 412 response for ETag mismatches.
pub fn precondition_failed(err: impl std::fmt::Display) -> ApiResponse {
    ApiResponse::Error(ErrorResponse {
        code: HttpStatus::PRECONDITION_FAILED,
        msg: err.to_string(),
    })
}

/// 500 catch-all response.
pub fn internal_error(err: impl std::fmt::Display) -> ApiResponse {
    ApiResponse::Error(ErrorResponse {
        code: HttpStatus::INTERNAL_SERVER_ERROR,
        msg: err.to_string(),
    })
}

/// Maps an error to the most fitting error response: known error values
/// get their dedicated status, everything else becomes a 500.
#[must_use]
pub fn smart_error(err: anyhow::Error) -> ApiResponse {
    if let Some(common) = err.downcast_ref::<CommonError>() {
        return match common {
            CommonError::AlreadyExists => conflict(),
            CommonError::NoSuchObject => not_found(),
            CommonError::NotFound { .. } => ApiResponse::Error(ErrorResponse {
                code: HttpStatus::NOT_FOUND,
                msg: common.to_string(),
            }),
            CommonError::PermissionDenied => forbidden(),
        };
    }

    if let Some(registry) = err.downcast_ref::<RegistryError>() {
        let RegistryError::NotFound(_) = registry;
        return ApiResponse::Error(ErrorResponse {
            code: HttpStatus::NOT_FOUND,
            msg: registry.to_string(),
        });
    }

    if let Some(io) = err.downcast_ref::<std::io::Error>() {
        return match io.kind() {
            std::io::ErrorKind::NotFound => not_found(),
            std::io::ErrorKind::PermissionDenied => forbidden(),
            _ => internal_error(err),
        };
    }

    internal_error(err)
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

impl ApiResponse {
    /// Renders the response to HTTP.
    ///
    /// # Errors
    ///
    /// An operation response fails when the operation cannot be started
    /// (wrong state, queue rejected the job); header values that are not
    /// valid HTTP fail for any shape.
    pub(crate) fn render(self) -> anyhow::Result<axum::response::Response> {
        match self {
            ApiResponse::Sync(sync) => sync.render(),
            ApiResponse::Operation(op) => render_operation(&op),
            ApiResponse::Error(err) => err.render(),
            ApiResponse::Raw(response) => Ok(*response),
        }
    }

    /// Renders with the error fallback: a failed render is retried as an
    /// error envelope, and a failure there is logged and dropped.
    pub(crate) fn finalize(self) -> axum::response::Response {
        match self.render() {
            Ok(response) => response,
            Err(err) => match smart_error(err).render() {
                Ok(response) => response,
                Err(_) => {
                    error!("Failed writing error for error, giving up");
                    HttpStatus::INTERNAL_SERVER_ERROR.into_response()
                }
            },
        }
    }
}

impl SyncResponse {
    fn render(self) -> anyhow::Result<axum::response::Response> {
        let status = if self.success {
            StatusCode::Success
        } else {
            StatusCode::Failure
        };

        let body = Envelope {
            response_type: ResponseType::Sync,
            status: status.as_str().to_string(),
            status_code: i64::from(status.code()),
            metadata: self.metadata,
            ..Envelope::default()
        };

        let mut response = Json(body).into_response();

        if let Some(etag) = &self.etag {
            let hash = etag_hash(etag)?;
            response
                .headers_mut()
                .insert(header::ETAG, HeaderValue::from_str(&hash)?);
        }

        for (name, value) in &self.headers {
            response.headers_mut().insert(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(value)?,
            );
        }

        if let Some(location) = &self.location {
            response
                .headers_mut()
                .insert(header::LOCATION, HeaderValue::from_str(location)?);
            *response.status_mut() =
                HttpStatus::from_u16(self.code.unwrap_or(201))?;
        }

        Ok(response)
    }
}

fn render_operation(op: &Arc<Operation>) -> anyhow::Result<axum::response::Response> {
    // Snapshot first so the 202 body carries the Pending render, then
    // start the work.
    let (url, snapshot) = op.render();
    op.run()?;

    let body = Envelope {
        response_type: ResponseType::Async,
        status: StatusCode::Created.as_str().to_string(),
        status_code: i64::from(StatusCode::Created.code()),
        operation: url.clone(),
        metadata: serde_json::to_value(snapshot)?,
        ..Envelope::default()
    };

    let mut response = Json(body).into_response();
    response
        .headers_mut()
        .insert(header::LOCATION, HeaderValue::from_str(&url)?);
    *response.status_mut() = HttpStatus::ACCEPTED;
    Ok(response)
}

impl ErrorResponse {
    fn render(self) -> anyhow::Result<axum::response::Response> {
        let body = serde_json::json!({
            "type": ResponseType::Error,
            "error": self.msg,
            "error_code": self.code.as_u16(),
        });

        let mut response = Json(body).into_response();
        *response.status_mut() = self.code;
        response.headers_mut().insert(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        );
        Ok(response)
    }
}

/// Hashes an ETag value: SHA-256 over its canonical JSON, hex encoded.
fn etag_hash(value: &serde_json::Value) -> anyhow::Result<String> {
    let bytes = serde_json::to_vec(value)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().fold(String::new(), |mut acc, byte| {
        use std::fmt::Write;
        let _ = write!(acc, "{byte:02x}");
        acc
    }))
}
