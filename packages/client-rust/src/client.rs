//! REST client: envelope-aware HTTP plus the event-stream connection.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::header;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use opflow_core::Response as Envelope;
use opflow_core::ResponseType;

use crate::error::{Error, Result};
use crate::event_listener::EventListener;
use crate::operation::RemoteOperation;

/// Default per-request timeout.
pub const DEFAULT_TRANSPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for [`Client`].
pub struct ClientBuilder {
    url: String,
    timeout: Duration,
    accept_invalid_certs: bool,
}

impl ClientBuilder {
    /// Overrides the per-request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Accepts any server certificate. Intended for services running with
    /// an auto-generated self-signed certificate.
    #[must_use]
    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Fails when the service URL does not parse or the HTTP client
    /// cannot be constructed.
    pub fn build(self) -> Result<Client> {
        let base_url = Url::parse(self.url.trim_end_matches('/'))?;
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()?;

        Ok(Client {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                listener: tokio::sync::Mutex::new(None),
            }),
        })
    }
}

pub(crate) struct ClientInner {
    pub(crate) http: reqwest::Client,
    pub(crate) base_url: Url,
    listener: tokio::sync::Mutex<Option<Arc<EventListener>>>,
}

/// Client for an opflow REST service over HTTP or HTTPS.
///
/// Cheap to clone; clones share the HTTP connection pool and the event
/// stream.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

impl Client {
    /// Client with default settings for the given base URL
    /// (e.g. `http://127.0.0.1:8080`).
    ///
    /// # Errors
    ///
    /// Fails when the URL does not parse.
    pub fn new(url: &str) -> Result<Self> {
        Self::builder(url).build()
    }

    /// Builder for non-default settings.
    #[must_use]
    pub fn builder(url: &str) -> ClientBuilder {
        ClientBuilder {
            url: url.to_string(),
            timeout: DEFAULT_TRANSPORT_TIMEOUT,
            accept_invalid_certs: false,
        }
    }

    /// Performs a request and decodes the response envelope.
    ///
    /// Returns the envelope and the response `ETag`. An error envelope
    /// becomes [`Error::Api`].
    ///
    /// # Errors
    ///
    /// Transport failures, undecodable bodies, and error envelopes.
    pub async fn call_api(
        &self,
        method: reqwest::Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&serde_json::Value>,
        etag: Option<&str>,
    ) -> Result<(Envelope, String)> {
        let url = self.request_url(path)?;
        let mut request = self
            .inner
            .http
            .request(method, url.clone())
            .header(header::ACCEPT, "application/json");

        if !params.is_empty() {
            request = request.query(params);
        }
        if let Some(etag) = etag {
            request = request.header(header::IF_MATCH, etag);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let response_etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let bytes = response.bytes().await?;
        let envelope: Envelope = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(err) => {
                if status.is_success() {
                    return Err(err.into());
                }
                return Err(Error::Api {
                    code: i64::from(status.as_u16()),
                    message: format!("Failed to fetch {url}: {status}"),
                });
            }
        };

        if envelope.response_type == ResponseType::Error {
            return Err(Error::Api {
                code: envelope.error_code,
                message: envelope.error,
            });
        }

        Ok((envelope, response_etag))
    }

    /// Performs a request and decodes the sync response metadata into `T`.
    ///
    /// # Errors
    ///
    /// As [`Client::call_api`], plus metadata decode failures.
    pub async fn query_struct<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&serde_json::Value>,
        etag: Option<&str>,
    ) -> Result<(T, String)> {
        let (envelope, etag) = self.call_api(method, path, params, body, etag).await?;
        Ok((envelope.metadata_as()?, etag))
    }

    /// Performs a request expected to spawn a background operation and
    /// returns a handle tracking it.
    ///
    /// The event stream is connected (best effort) before the request so
    /// no transition between creation and tracking can be missed.
    ///
    /// # Errors
    ///
    /// As [`Client::call_api`], plus failures decoding the async
    /// envelope's operation render.
    pub async fn query_operation(
        &self,
        method: reqwest::Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<(RemoteOperation, String)> {
        let listener = self.get_events().await.ok();

        let (envelope, etag) = self.call_api(method, path, params, body, None).await?;
        let op = envelope.metadata_as_operation()?;
        debug!("Got operation from server: {}", op.id);

        Ok((RemoteOperation::new(self.clone(), op, listener), etag))
    }

    /// Connects to the service's event stream, reusing an already active
    /// connection.
    ///
    /// # Errors
    ///
    /// Fails when the WebSocket cannot be established.
    pub async fn get_events(&self) -> Result<Arc<EventListener>> {
        let mut guard = self.inner.listener.lock().await;
        if let Some(listener) = guard.as_ref() {
            if listener.is_active() {
                return Ok(Arc::clone(listener));
            }
        }

        let ws_url = self.websocket_url(&opflow_core::path(&["events"]))?;
        let (stream, _) = tokio_tungstenite::connect_async(ws_url.as_str()).await?;

        let listener = EventListener::new();
        tokio::spawn(read_loop(stream, Arc::clone(&listener)));

        *guard = Some(Arc::clone(&listener));
        Ok(listener)
    }

    fn request_url(&self, path: &str) -> Result<Url> {
        let full = format!(
            "{}/{}",
            self.inner.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Ok(Url::parse(&full)?)
    }

    fn websocket_url(&self, path: &str) -> Result<Url> {
        let mut url = self.request_url(path)?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        // set_scheme only rejects invalid transitions; ws/wss are fine.
        url.set_scheme(scheme)
            .map_err(|()| url::ParseError::EmptyHost)?;
        Ok(url)
    }
}

/// Reads the event stream, feeding decoded events through the listener's
/// handlers until the connection drops or the listener disconnects.
async fn read_loop(
    mut stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    listener: Arc<EventListener>,
) {
    let mut done = listener.done_receiver();

    loop {
        tokio::select! {
            message = stream.next() => match message {
                Some(Ok(message)) => {
                    let Ok(text) = message.to_text() else {
                        continue;
                    };
                    let Ok(event) = serde_json::from_str::<serde_json::Value>(text) else {
                        continue;
                    };
                    listener.dispatch(event).await;
                }
                Some(Err(err)) => {
                    listener.fail(err.to_string());
                    break;
                }
                None => {
                    listener.fail("event stream closed by server".to_string());
                    break;
                }
            },
            changed = done.changed() => {
                if changed.is_err() || *done.borrow() {
                    let _ = stream.close(None).await;
                    break;
                }
            }
        }
    }
}
