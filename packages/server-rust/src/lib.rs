//! `opflow` Server — REST service framework with background operations,
//! a WebSocket event stream, and a bounded worker pool.
//!
//! Consumers describe their REST surface as [`Api`] groups of
//! [`Command`]s; the framework supplies routing, the response envelope,
//! transport endpoints (UNIX socket, HTTP or HTTPS), operation tracking
//! with run/cancel/wait semantics, and event broadcasting. The built-in
//! `1.0` API exposes `events`, `operations`, `operations/{id}`, and
//! `operations/{id}/wait`.

pub mod api;
pub mod config;
pub mod errs;
pub mod events;
pub mod operation;
pub mod pool;
pub mod registry;
pub mod request;
pub mod response;
pub mod service;

mod endpoints;
mod handlers;

pub use api::{handler, middleware, Api, Command, Handler, Middleware};
pub use config::ServiceConfig;
pub use errs::CommonError;
pub use events::{EventBroadcaster, EventListener};
pub use operation::{hook, Hook, Operation, OperationError, OperationSpec};
pub use pool::{Dispatcher, Job, JobQueue, PushError};
pub use registry::{OperationRegistry, RegistryError};
pub use request::{RequestContext, ServiceState};
pub use response::{
    authorization_error, bad_request, conflict, empty_sync_response, forbidden, internal_error,
    not_found, not_found_error, not_implemented, operation_response, precondition_failed,
    service_unavailable, smart_error, sync_response, sync_response_redirect, ApiResponse,
    SyncResponse,
};
pub use service::Service;
