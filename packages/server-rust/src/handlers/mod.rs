//! Handlers for the built-in `1.0` API.

pub mod events;
pub mod operations;

pub use events::events_get;
pub use operations::{operation_delete, operation_get, operation_wait_get, operations_get};
