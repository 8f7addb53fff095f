//! Common error values recognized by the smart-error mapping.
//!
//! Handlers (and operation closures) can return these through `anyhow` and
//! have [`crate::response::smart_error`] derive the right HTTP error
//! envelope instead of a blanket 500.

/// Errors with a well-known HTTP mapping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommonError {
    /// Maps to 409 Conflict.
    #[error("Already exists")]
    AlreadyExists,
    /// Maps to 404 Not Found.
    #[error("Not found")]
    NoSuchObject,
    /// Maps to 404 Not Found, naming the missing resource.
    #[error("{what} not found")]
    NotFound { what: String },
    /// Maps to 403 Forbidden.
    #[error("Permission denied")]
    PermissionDenied,
}

impl CommonError {
    /// Convenience constructor for a named not-found error.
    #[must_use]
    pub fn not_found(what: impl Into<String>) -> Self {
        CommonError::NotFound { what: what.into() }
    }
}
