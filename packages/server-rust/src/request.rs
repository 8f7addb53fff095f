//! Request context handed to every handler.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::Method;

use crate::events::EventBroadcaster;
use crate::operation::{Operation, OperationError, OperationSpec};
use crate::pool::{Dispatcher, JobQueue};
use crate::registry::OperationRegistry;

/// Marker inserted on requests arriving over the UNIX socket endpoint.
#[derive(Debug, Clone, Copy)]
pub(crate) struct UnixSocketMarker;

/// Shared state behind every request: the operation registry, the event
/// broadcaster, and the dispatcher when a pool is configured.
#[derive(Clone)]
pub struct ServiceState {
    pub(crate) registry: Arc<OperationRegistry>,
    pub(crate) events: EventBroadcaster,
    pub(crate) dispatcher: Option<Arc<Dispatcher>>,
}

impl ServiceState {
    #[must_use]
    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// Current dispatcher queue; `None` when no pool is configured or the
    /// dispatcher has not started, in which case operations spawn their
    /// own tasks.
    #[must_use]
    pub(crate) fn queue(&self) -> Option<Arc<JobQueue>> {
        self.dispatcher.as_ref().and_then(|d| d.queue())
    }
}

/// The context of one REST request: the raw HTTP request, the service
/// state, and the API version the matched command belongs to.
pub struct RequestContext {
    state: ServiceState,
    version: String,
    params: HashMap<String, String>,
    request: Request,
}

impl RequestContext {
    pub(crate) fn new(
        state: ServiceState,
        version: String,
        params: HashMap<String, String>,
        request: Request,
    ) -> Self {
        Self {
            state,
            version,
            params,
            request,
        }
    }

    /// Version of the API group the matched command belongs to.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    /// Named path parameter from the matched route pattern.
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// First query-string value for `name`.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<String> {
        let query = self.request.uri().query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// True when the `recursion` query value parses to a non-zero integer.
    #[must_use]
    pub fn is_recursion(&self) -> bool {
        self.query_param("recursion")
            .and_then(|value| value.parse::<i64>().ok())
            .is_some_and(|value| value != 0)
    }

    /// True when the request arrived over the local UNIX socket.
    #[must_use]
    pub fn uses_unix_socket(&self) -> bool {
        self.request.extensions().get::<UnixSocketMarker>().is_some()
    }

    /// Decodes the request body as JSON.
    ///
    /// # Errors
    ///
    /// Fails when the body cannot be read or does not match `T`.
    pub async fn body_json<T: serde::de::DeserializeOwned>(&mut self) -> anyhow::Result<T> {
        let body = std::mem::take(self.request.body_mut());
        let bytes = axum::body::to_bytes(body, usize::MAX).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Creates a background operation bound to this request's API version,
    /// registered and announced on the event stream. The caller typically
    /// wraps the result in [`crate::response::operation_response`].
    ///
    /// # Errors
    ///
    /// Fails when the spec's metadata is not a JSON object.
    pub fn create_operation(
        &self,
        spec: OperationSpec,
    ) -> Result<Arc<Operation>, OperationError> {
        Operation::spawn(
            spec,
            &self.version,
            &self.state.registry,
            self.state.events.clone(),
            self.state.queue(),
        )
    }

    /// Consumes the raw request; used by handlers that take over the
    /// transport (WebSocket upgrade).
    pub(crate) fn take_request(&mut self) -> Request {
        std::mem::take(&mut self.request)
    }
}
