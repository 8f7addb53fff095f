//! API group and command tables.
//!
//! Consumers describe their REST surface as [`Api`] groups: a version
//! string plus a list of [`Command`]s, each mapping up to five HTTP
//! methods to handlers. The service mounts every command at
//! `/<version>/<name>` and injects the built-in `1.0` API for events and
//! operations.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::handlers;
use crate::request::RequestContext;
use crate::response::ApiResponse;

/// An async request handler.
pub type Handler =
    Arc<dyn Fn(RequestContext) -> Pin<Box<dyn Future<Output = ApiResponse> + Send>> + Send + Sync>;

/// Boxes an async fn into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ApiResponse> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// A pre-handler hook: inspects the request context and either passes it
/// through or short-circuits with a response. The API-level hook runs
/// before the command-level one.
pub type Middleware = Arc<
    dyn Fn(RequestContext) -> Pin<Box<dyn Future<Output = Result<RequestContext, ApiResponse>> + Send>>
        + Send
        + Sync,
>;

/// Boxes an async fn into a [`Middleware`].
pub fn middleware<F, Fut>(f: F) -> Middleware
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<RequestContext, ApiResponse>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(f(ctx)))
}

/// All the commands and metadata for one version of an API.
#[derive(Clone, Default)]
pub struct Api {
    pub version: String,
    pub middleware: Option<Middleware>,
    pub commands: Vec<Command>,
}

/// One routable resource: a router pattern relative to `/<version>/` and
/// its per-method handlers. A missing handler answers 404; a method
/// outside the five answers 501. HEAD is served by the GET handler with
/// the body suppressed by the transport.
#[derive(Clone, Default)]
pub struct Command {
    pub name: String,
    pub middleware: Option<Middleware>,

    pub get: Option<Handler>,
    pub put: Option<Handler>,
    pub post: Option<Handler>,
    pub delete: Option<Handler>,
    pub patch: Option<Handler>,
}

/// The framework's own API: event stream plus operation inspection,
/// waiting, and cancellation, mounted under version `1.0`.
pub(crate) fn builtin_api() -> Api {
    Api {
        version: opflow_core::API_VERSION.to_string(),
        middleware: None,
        commands: vec![
            Command {
                name: "events".to_string(),
                get: Some(handler(handlers::events_get)),
                ..Command::default()
            },
            Command {
                name: "operations".to_string(),
                get: Some(handler(handlers::operations_get)),
                ..Command::default()
            },
            Command {
                name: "operations/{id}".to_string(),
                get: Some(handler(handlers::operation_get)),
                delete: Some(handler(handlers::operation_delete)),
                ..Command::default()
            },
            Command {
                name: "operations/{id}/wait".to_string(),
                get: Some(handler(handlers::operation_wait_get)),
                ..Command::default()
            },
        ],
    }
}
