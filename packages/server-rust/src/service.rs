//! Service: router assembly, method dispatch, and endpoint lifecycle.
//!
//! Follows the deferred-startup pattern: `new()` wires state and routes,
//! `start()` starts the dispatcher and binds the configured endpoints,
//! `shutdown()` tears everything down in reverse.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{RawPathParams, Request};
use axum::http::HeaderName;
use axum::routing::any;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::{builtin_api, Api, Command, Middleware};
use crate::config::ServiceConfig;
use crate::endpoints::{self, Endpoint};
use crate::events::EventBroadcaster;
use crate::pool::Dispatcher;
use crate::registry::OperationRegistry;
use crate::request::{RequestContext, ServiceState};
use crate::response::{not_found, not_implemented};

/// A REST service: a router over the registered API groups plus the
/// built-in one, an operation registry, an event broadcaster, an optional
/// worker pool, and the transport endpoints from the configuration.
pub struct Service {
    config: ServiceConfig,
    state: ServiceState,
    router: Router,
    endpoints: Vec<Endpoint>,
}

impl Service {
    /// Wires the service: builds shared state, the dispatcher when the
    /// pool is enabled, and mounts every command of `apis` plus the
    /// built-in `1.0` API.
    #[must_use]
    pub fn new(config: ServiceConfig, apis: Vec<Api>) -> Self {
        let dispatcher = config.pool_enabled().then(|| {
            Arc::new(Dispatcher::new(
                config.max_queued_operations,
                config.max_concurrent_operations,
            ))
        });

        let state = ServiceState {
            registry: Arc::new(OperationRegistry::new()),
            events: EventBroadcaster::new(),
            dispatcher,
        };

        let router = build_router(&state, apis);

        Self {
            config,
            state,
            router,
            endpoints: Vec::new(),
        }
    }

    /// Shared state, for embedding the service into a larger application.
    #[must_use]
    pub fn state(&self) -> &ServiceState {
        &self.state
    }

    /// Address of the network endpoint once started.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.endpoints.iter().find_map(Endpoint::local_addr)
    }

    /// Starts the dispatcher and every configured endpoint. The UNIX
    /// socket runs alongside the network endpoint; HTTP and HTTPS are
    /// mutually exclusive, HTTPS winning when certificates are configured.
    ///
    /// # Errors
    ///
    /// Fails when no endpoint is configured or any endpoint cannot bind.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        if !self.endpoints.is_empty() {
            return Ok(());
        }

        if let Some(dispatcher) = &self.state.dispatcher {
            dispatcher.start().await;
        }

        #[cfg(unix)]
        if let Some(path) = &self.config.unix_socket_path {
            let endpoint = endpoints::start_unix(
                self.router.clone(),
                path,
                self.config.unix_socket_owner.as_deref(),
            )
            .await?;
            self.endpoints.push(endpoint);
        }

        if self.config.network_enabled() {
            let addr = self.config.server_address();
            let endpoint = if self.config.tls_enabled() {
                let cert = self
                    .config
                    .server_cert_path
                    .clone()
                    .expect("tls_enabled checked the certificate path");
                let key = self
                    .config
                    .server_key_path
                    .clone()
                    .expect("tls_enabled checked the key path");
                endpoints::start_https(
                    self.router.clone(),
                    &addr,
                    &cert,
                    &key,
                    self.config.ca_path.as_deref(),
                )
                .await?
            } else {
                endpoints::start_http(self.router.clone(), &addr).await?
            };
            self.endpoints.push(endpoint);
        }

        if self.endpoints.is_empty() {
            anyhow::bail!("No endpoint configured");
        }

        info!("Service ready");
        Ok(())
    }

    /// Stops every endpoint, then drains and stops the worker pool.
    ///
    /// # Errors
    ///
    /// Endpoint stop errors are joined into a single message after every
    /// endpoint had its chance to stop.
    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        let mut errors = Vec::new();
        for endpoint in self.endpoints.drain(..) {
            if let Err(err) = endpoint.stop().await {
                errors.push(err.to_string());
            }
        }

        if let Some(dispatcher) = &self.state.dispatcher {
            dispatcher.stop(true).await;
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!(errors.join(" - ")))
        }
    }
}

// ---------------------------------------------------------------------------
// Router assembly
// ---------------------------------------------------------------------------

fn build_router(state: &ServiceState, mut apis: Vec<Api>) -> Router {
    apis.push(builtin_api());

    let mut router = Router::new();
    for api in apis {
        let version = api.version.clone();
        let api_middleware = api.middleware.clone();
        for command in api.commands {
            let path = format!("/{}/{}", version, command.name);
            router = router.route(
                &path,
                any(route_handler(
                    state.clone(),
                    version.clone(),
                    api_middleware.clone(),
                    command,
                )),
            );
        }
    }

    let x_request_id = HeaderName::from_static("x-request-id");
    router
        .fallback(|| async { not_found().finalize() })
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
}

/// Builds the axum handler closure for one command.
fn route_handler(
    state: ServiceState,
    version: String,
    api_middleware: Option<Middleware>,
    command: Command,
) -> impl Fn(
    RawPathParams,
    Request,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = axum::response::Response> + Send>>
       + Clone
       + Send
       + Sync
       + 'static {
    let command = Arc::new(command);
    move |params: RawPathParams, request: Request| {
        let state = state.clone();
        let version = version.clone();
        let api_middleware = api_middleware.clone();
        let command = Arc::clone(&command);
        Box::pin(async move { dispatch(state, version, api_middleware, &command, &params, request).await })
    }
}

/// Selects the handler by method (HEAD shares GET), builds the request
/// context, runs the middleware chain, and renders the handler's response.
async fn dispatch(
    state: ServiceState,
    version: String,
    api_middleware: Option<Middleware>,
    command: &Command,
    params: &RawPathParams,
    request: Request,
) -> axum::response::Response {
    let handler = match request.method().as_str() {
        // HEAD shares the GET handler; the transport suppresses the body.
        "HEAD" | "GET" => command.get.clone(),
        "PUT" => command.put.clone(),
        "POST" => command.post.clone(),
        "DELETE" => command.delete.clone(),
        "PATCH" => command.patch.clone(),
        _ => return not_implemented().finalize(),
    };

    let Some(handler) = handler else {
        return not_found().finalize();
    };

    let params: HashMap<String, String> = params
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();
    let mut ctx = RequestContext::new(state, version, params, request);

    // API middleware wraps command middleware wraps the handler.
    for middleware in [api_middleware.as_ref(), command.middleware.as_ref()]
        .into_iter()
        .flatten()
    {
        ctx = match middleware(ctx).await {
            Ok(ctx) => ctx,
            Err(response) => return response.finalize(),
        };
    }

    handler(ctx).await.finalize()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use serde_json::{json, Value};
    use tokio::sync::Semaphore;

    use opflow_core::StatusCode;

    use super::*;
    use crate::api::{handler, middleware};
    use crate::operation::{hook, OperationSpec};
    use crate::response::{forbidden, operation_response, smart_error, sync_response};

    // ── Test helpers ──────────────────────────────────────────────────

    /// Starts a service with the given extra API on an OS-assigned HTTP
    /// port and returns it with its base URL.
    async fn start_service(apis: Vec<Api>, config: ServiceConfig) -> (Service, String) {
        let config = ServiceConfig {
            host: "127.0.0.1".to_string(),
            port: Some(0),
            ..config
        };
        let mut service = Service::new(config, apis);
        service.start().await.expect("service starts");
        let addr = service.local_addr().expect("bound address");
        (service, format!("http://{addr}"))
    }

    /// An API with a single `widgets` command whose POST spawns an
    /// operation from the given spec factory.
    fn widgets_api<F>(spec_factory: F) -> Api
    where
        F: Fn() -> OperationSpec + Send + Sync + 'static,
    {
        let spec_factory = Arc::new(spec_factory);
        Api {
            version: "1.0".to_string(),
            commands: vec![Command {
                name: "widgets".to_string(),
                post: Some(handler(move |ctx: RequestContext| {
                    let spec_factory = Arc::clone(&spec_factory);
                    async move {
                        match ctx.create_operation(spec_factory()) {
                            Ok(op) => operation_response(op),
                            Err(err) => smart_error(err.into()),
                        }
                    }
                })),
                ..Command::default()
            }],
            ..Api::default()
        }
    }

    async fn post_json(url: &str) -> (reqwest::StatusCode, Option<String>, Value) {
        let response = reqwest::Client::new().post(url).send().await.unwrap();
        let status = response.status();
        let location = response
            .headers()
            .get("location")
            .map(|v| v.to_str().unwrap().to_string());
        let body: Value = response.json().await.unwrap();
        (status, location, body)
    }

    async fn get_json(url: &str) -> (reqwest::StatusCode, Value) {
        let response = reqwest::get(url).await.unwrap();
        let status = response.status();
        let body: Value = response.json().await.unwrap();
        (status, body)
    }

    // ── End-to-end scenarios ──────────────────────────────────────────

    #[tokio::test]
    async fn create_then_wait_reaches_success() {
        let api = widgets_api(|| OperationSpec {
            description: "short nap".to_string(),
            on_run: Some(hook(|_op| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(())
            })),
            ..OperationSpec::default()
        });
        let (mut service, base) = start_service(vec![api], ServiceConfig::default()).await;

        let (status, location, body) = post_json(&format!("{base}/1.0/widgets")).await;
        assert_eq!(status, 202);
        assert_eq!(body["type"], "async");
        assert_eq!(body["metadata"]["status_code"], 105);

        let op_url = location.expect("Location header present");
        assert_eq!(body["operation"], op_url);
        assert!(op_url.starts_with("/1.0/operations/"));

        let (status, body) = get_json(&format!("{base}{op_url}/wait?timeout=5")).await;
        assert_eq!(status, 200);
        assert_eq!(body["metadata"]["status_code"], 200);
        assert_eq!(body["metadata"]["err"], "");

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn create_then_wait_reports_failure() {
        let api = widgets_api(|| OperationSpec {
            on_run: Some(hook(|_op| async { Err(anyhow::anyhow!("boom")) })),
            ..OperationSpec::default()
        });
        let (mut service, base) = start_service(vec![api], ServiceConfig::default()).await;

        let (_, location, _) = post_json(&format!("{base}/1.0/widgets")).await;
        let op_url = location.unwrap();

        let (status, body) = get_json(&format!("{base}{op_url}/wait?timeout=5")).await;
        assert_eq!(status, 200);
        assert_eq!(body["metadata"]["status_code"], 400);
        assert_eq!(body["metadata"]["err"], "boom");

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn cancel_while_running_invokes_cancel_hook() {
        let (side_tx, side_rx) = tokio::sync::oneshot::channel::<()>();
        let side_tx = Arc::new(parking_lot::Mutex::new(Some(side_tx)));

        let api = widgets_api(move || {
            let side_tx = Arc::clone(&side_tx);
            OperationSpec {
                on_run: Some(hook(|_op| async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(())
                })),
                on_cancel: Some(hook(move |_op| async move {
                    if let Some(tx) = side_tx.lock().take() {
                        let _ = tx.send(());
                    }
                    Ok(())
                })),
                ..OperationSpec::default()
            }
        });
        let (mut service, base) = start_service(vec![api], ServiceConfig::default()).await;

        let (_, location, _) = post_json(&format!("{base}/1.0/widgets")).await;
        let op_url = location.unwrap();

        // Start waiting before the cancel lands; a finished operation
        // leaves the registry, so a later wait would miss it.
        let waiter = tokio::spawn({
            let wait_url = format!("{base}{op_url}/wait?timeout=5");
            async move { get_json(&wait_url).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let delete = reqwest::Client::new()
            .delete(format!("{base}{op_url}"))
            .send()
            .await
            .unwrap();
        assert_eq!(delete.status(), 200);

        let (_, body) = waiter.await.unwrap();
        assert_eq!(body["metadata"]["status_code"], 401);

        side_rx.await.expect("cancel hook closed the side channel");
        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn cancel_without_hook_jumps_to_cancelled() {
        let api = widgets_api(|| OperationSpec {
            on_run: Some(hook(|_op| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok(())
            })),
            ..OperationSpec::default()
        });
        let (mut service, base) = start_service(vec![api], ServiceConfig::default()).await;

        let (_, location, _) = post_json(&format!("{base}/1.0/widgets")).await;
        let op_url = location.unwrap();

        let waiter = tokio::spawn({
            let wait_url = format!("{base}{op_url}/wait?timeout=5");
            async move { get_json(&wait_url).await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        reqwest::Client::new()
            .delete(format!("{base}{op_url}"))
            .send()
            .await
            .unwrap();

        let (_, body) = waiter.await.unwrap();
        assert_eq!(body["metadata"]["status_code"], 401);
        assert_eq!(body["metadata"]["err"], "Operation cancelled");

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn pool_rejects_overflow_with_queue_full() {
        let gate = Arc::new(Semaphore::new(0));
        let api = widgets_api({
            let gate = Arc::clone(&gate);
            move || {
                let gate = Arc::clone(&gate);
                OperationSpec {
                    on_run: Some(hook(move |_op| async move {
                        let _permit = gate.acquire().await;
                        Ok(())
                    })),
                    ..OperationSpec::default()
                }
            }
        });
        let config = ServiceConfig {
            max_queued_operations: 1,
            max_concurrent_operations: 1,
            ..ServiceConfig::default()
        };
        let (mut service, base) = start_service(vec![api], config).await;

        // First operation occupies the worker, second fills the queue.
        let (status, _, _) = post_json(&format!("{base}/1.0/widgets")).await;
        assert_eq!(status, 202);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let (status, _, _) = post_json(&format!("{base}/1.0/widgets")).await;
        assert_eq!(status, 202);

        // Third has nowhere to go: the push fails and the response
        // surfaces the queue error.
        let (status, _, body) = post_json(&format!("{base}/1.0/widgets")).await;
        assert_eq!(status, 500);
        assert_eq!(body["type"], "error");
        assert_eq!(body["error"], "Jobs queue is full");

        gate.add_permits(8);
        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn event_stream_reports_every_transition() {
        let api = widgets_api(|| OperationSpec {
            on_run: Some(hook(|_op| async {
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(())
            })),
            ..OperationSpec::default()
        });
        let (mut service, base) = start_service(vec![api], ServiceConfig::default()).await;
        let ws_url = base.replace("http://", "ws://") + "/1.0/events";

        let (mut stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .expect("WS connect");

        let (_, location, _) = post_json(&format!("{base}/1.0/widgets")).await;
        let op_id = location.unwrap().rsplit('/').next().unwrap().to_string();

        let mut codes = Vec::new();
        while codes.last() != Some(&200) {
            let message = tokio::time::timeout(Duration::from_secs(5), stream.next())
                .await
                .expect("event before timeout")
                .expect("stream open")
                .expect("frame ok");
            let event: Value = serde_json::from_str(message.to_text().unwrap()).unwrap();
            if event["metadata"]["id"] == op_id.as_str() {
                codes.push(event["metadata"]["status_code"].as_i64().unwrap());
            }
        }
        assert_eq!(codes, vec![105, 103, 200]);

        let _ = stream.close(None).await;
        service.shutdown().await.unwrap();
    }

    // ── Routing and envelope behavior ─────────────────────────────────

    #[tokio::test]
    async fn operations_listing_groups_by_status() {
        let gate = Arc::new(Semaphore::new(0));
        let api = widgets_api({
            let gate = Arc::clone(&gate);
            move || {
                let gate = Arc::clone(&gate);
                OperationSpec {
                    on_run: Some(hook(move |_op| async move {
                        let _permit = gate.acquire().await;
                        Ok(())
                    })),
                    ..OperationSpec::default()
                }
            }
        });
        let (mut service, base) = start_service(vec![api], ServiceConfig::default()).await;

        let (_, location, _) = post_json(&format!("{base}/1.0/widgets")).await;
        let op_url = location.unwrap();

        let (_, body) = get_json(&format!("{base}/1.0/operations")).await;
        let running = body["metadata"]["running"].as_array().unwrap();
        assert_eq!(running, &[Value::String(op_url.clone())]);

        // recursion=1 inlines the full render.
        let (_, body) = get_json(&format!("{base}/1.0/operations?recursion=1")).await;
        let running = body["metadata"]["running"].as_array().unwrap();
        assert_eq!(running[0]["status_code"], 103);

        gate.add_permits(8);
        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn finished_operation_is_not_found() {
        let api = widgets_api(|| OperationSpec {
            on_run: Some(hook(|_op| async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            })),
            ..OperationSpec::default()
        });
        let (mut service, base) = start_service(vec![api], ServiceConfig::default()).await;

        let (_, location, _) = post_json(&format!("{base}/1.0/widgets")).await;
        let op_url = location.unwrap();

        // Wait for completion, after which the registry forgot it.
        let (status, _) = get_json(&format!("{base}{op_url}/wait?timeout=5")).await;
        assert_eq!(status, 200);

        let (status, body) = get_json(&format!("{base}{op_url}")).await;
        assert_eq!(status, 404);
        assert_eq!(body["type"], "error");

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn wait_with_zero_timeout_returns_current_state() {
        let api = widgets_api(|| OperationSpec {
            on_run: Some(hook(|_op| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(())
            })),
            ..OperationSpec::default()
        });
        let (mut service, base) = start_service(vec![api], ServiceConfig::default()).await;

        let (_, location, _) = post_json(&format!("{base}/1.0/widgets")).await;
        let op_url = location.unwrap();

        let (status, body) = get_json(&format!("{base}{op_url}/wait?timeout=0")).await;
        assert_eq!(status, 200);
        assert_eq!(body["metadata"]["status_code"], 103);

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn wait_timeout_surfaces_as_internal_error() {
        let api = widgets_api(|| OperationSpec {
            on_run: Some(hook(|_op| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })),
            ..OperationSpec::default()
        });
        let (mut service, base) = start_service(vec![api], ServiceConfig::default()).await;

        let (_, location, _) = post_json(&format!("{base}/1.0/widgets")).await;
        let op_url = location.unwrap();

        let (status, body) = get_json(&format!("{base}{op_url}/wait?timeout=1")).await;
        assert_eq!(status, 500);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Timeout waiting for operation"));

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn unhandled_method_answers_501() {
        let api = widgets_api(OperationSpec::default);
        let (mut service, base) = start_service(vec![api], ServiceConfig::default()).await;

        let response = reqwest::Client::new()
            .request(
                reqwest::Method::OPTIONS,
                format!("{base}/1.0/widgets"),
            )
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 501);

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn missing_handler_answers_404() {
        let api = widgets_api(OperationSpec::default);
        let (mut service, base) = start_service(vec![api], ServiceConfig::default()).await;

        // widgets only defines POST.
        let (status, body) = get_json(&format!("{base}/1.0/widgets")).await;
        assert_eq!(status, 404);
        assert_eq!(body["error"], "not found");

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_route_answers_404_envelope() {
        let (mut service, base) = start_service(vec![], ServiceConfig::default()).await;

        let (status, body) = get_json(&format!("{base}/1.0/nowhere")).await;
        assert_eq!(status, 404);
        assert_eq!(body["type"], "error");

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn head_shares_get_without_body() {
        let api = Api {
            version: "1.0".to_string(),
            commands: vec![Command {
                name: "widgets".to_string(),
                get: Some(handler(|_ctx| async {
                    sync_response(true, &json!({"hello": "world"})).into_response()
                })),
                ..Command::default()
            }],
            ..Api::default()
        };
        let (mut service, base) = start_service(vec![api], ServiceConfig::default()).await;

        let response = reqwest::Client::new()
            .head(format!("{base}/1.0/widgets"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.bytes().await.unwrap().is_empty());

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn middleware_can_short_circuit() {
        let api = Api {
            version: "1.0".to_string(),
            middleware: Some(middleware(|ctx: RequestContext| async move {
                if ctx.query_param("token").as_deref() == Some("secret") {
                    Ok(ctx)
                } else {
                    Err(forbidden())
                }
            })),
            commands: vec![Command {
                name: "guarded".to_string(),
                get: Some(handler(|_ctx| async {
                    sync_response(true, &json!({})).into_response()
                })),
                ..Command::default()
            }],
        };
        let (mut service, base) = start_service(vec![api], ServiceConfig::default()).await;

        let (status, _) = get_json(&format!("{base}/1.0/guarded")).await;
        assert_eq!(status, 403);

        let (status, _) = get_json(&format!("{base}/1.0/guarded?token=secret")).await;
        assert_eq!(status, 200);

        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn failing_listener_does_not_drop_events_for_others() {
        let api = widgets_api(|| OperationSpec {
            on_run: Some(hook(|_op| async { Ok(()) })),
            ..OperationSpec::default()
        });
        let (mut service, base) = start_service(vec![api], ServiceConfig::default()).await;
        let ws_url = base.replace("http://", "ws://") + "/1.0/events";

        let (dying, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();
        let (mut alive, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();

        // Kill the first listener's transport, then generate events.
        drop(dying);
        tokio::time::sleep(Duration::from_millis(30)).await;

        let (_, location, _) = post_json(&format!("{base}/1.0/widgets")).await;
        let op_id = location.unwrap().rsplit('/').next().unwrap().to_string();

        let mut saw_final = false;
        while !saw_final {
            let message = tokio::time::timeout(Duration::from_secs(5), alive.next())
                .await
                .expect("event before timeout")
                .unwrap()
                .unwrap();
            let event: Value = serde_json::from_str(message.to_text().unwrap()).unwrap();
            if event["metadata"]["id"] == op_id.as_str()
                && event["metadata"]["status_code"] == 200
            {
                saw_final = true;
            }
        }

        let _ = alive.close(None).await;
        service.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn start_requires_an_endpoint() {
        let mut service = Service::new(ServiceConfig::default(), vec![]);
        let err = service.start().await.unwrap_err();
        assert_eq!(err.to_string(), "No endpoint configured");
    }

    #[tokio::test]
    async fn operation_status_uses_status_code_display() {
        // Sanity check that wire status strings match the code table.
        assert_eq!(StatusCode::Running.as_str(), "Running");
        assert_eq!(StatusCode::Cancelled.code(), 401);
    }
}
