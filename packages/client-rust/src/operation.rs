//! Remote operation handle: tracks a server-side operation through the
//! event stream, with a one-shot refresh to close the setup race.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::event_listener::{EventListener, HandlerId};

/// Handle to a background operation on the server.
///
/// The handle tracks the operation through the client's event stream.
/// Arming the tracking is staged to avoid the listen/refresh race: the
/// event handler is registered first but gated shut, a one-shot refresh
/// captures the current server state, and only then does the gate open.
/// Events received in between are held at the gate, not lost, and are
/// applied after the refresh result.
#[derive(Clone)]
pub struct RemoteOperation {
    inner: Arc<Inner>,
}

struct Inner {
    client: Client,
    id: String,
    state: Mutex<opflow_core::Operation>,
    listener: Mutex<Option<Arc<EventListener>>>,
    handler_id: Mutex<Option<HandlerId>>,
    handler_ready: AtomicBool,
    setup: tokio::sync::Mutex<()>,
    done: watch::Sender<bool>,
}

impl Inner {
    /// Ends tracking: detaches the event handler and fires done. The
    /// shared listener stays connected for other operations.
    fn complete(&self) {
        let listener = self.listener.lock().clone();
        let handler_id = self.handler_id.lock().take();
        if let (Some(listener), Some(handler_id)) = (listener, handler_id) {
            let _ = listener.remove_handler(handler_id);
        }
        let _ = self.done.send(true);
    }

    fn the_error(&self) -> Result<()> {
        let err = self.state.lock().err.clone();
        if err.is_empty() {
            Ok(())
        } else {
            Err(Error::Operation(err))
        }
    }
}

impl RemoteOperation {
    pub(crate) fn new(
        client: Client,
        op: opflow_core::Operation,
        listener: Option<Arc<EventListener>>,
    ) -> Self {
        let (done, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                client,
                id: op.id.clone(),
                state: Mutex::new(op),
                listener: Mutex::new(listener),
                handler_id: Mutex::new(None),
                handler_ready: AtomicBool::new(false),
                setup: tokio::sync::Mutex::new(()),
                done,
            }),
        }
    }

    /// Identifier of the tracked operation.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Last-known snapshot of the operation.
    #[must_use]
    pub fn get(&self) -> opflow_core::Operation {
        self.inner.state.lock().clone()
    }

    /// Requests server-side cancellation
    /// (`DELETE /<version>/operations/<id>`).
    ///
    /// # Errors
    ///
    /// Surfaces the server's response when the operation cannot be
    /// cancelled.
    pub async fn cancel(&self) -> Result<()> {
        self.inner.client.delete_operation(&self.inner.id).await
    }

    /// Fetches the current server snapshot, unless event tracking is armed
    /// (events supersede polling).
    ///
    /// # Errors
    ///
    /// Surfaces lookup failures, including 404 once the operation has
    /// finished and left the registry.
    pub async fn refresh(&self) -> Result<()> {
        if self.inner.handler_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let (op, _etag) = self
            .inner
            .client
            .retrieve_operation_by_id(&self.inner.id)
            .await?;
        *self.inner.state.lock() = op;
        Ok(())
    }

    /// Blocks until the operation reaches a final state.
    ///
    /// # Errors
    ///
    /// The operation's own error when it ends in Failure or Cancelled, or
    /// the transport error that killed the event stream.
    pub async fn wait(&self) -> Result<()> {
        if self.get().is_final() {
            return self.inner.the_error();
        }

        self.setup_listener().await?;

        let mut done = self.inner.done.subscribe();
        let _ = done.wait_for(|done| *done).await;
        self.inner.the_error()
    }

    /// As [`RemoteOperation::wait`], bounded by a deadline. When the
    /// deadline passes first, server-side cancellation is requested and
    /// [`Error::OperationTimeout`] is returned.
    ///
    /// # Errors
    ///
    /// See above; also fails when the cancellation request itself fails.
    pub async fn wait_timeout(&self, limit: Duration) -> Result<()> {
        match tokio::time::timeout(limit, self.wait()).await {
            Ok(result) => result,
            Err(_) => {
                self.request_cancel().await?;
                Err(Error::OperationTimeout)
            }
        }
    }

    /// As [`RemoteOperation::wait`], aborted by `cancel`. When the token
    /// fires first, server-side cancellation is requested and
    /// [`Error::OperationCancelled`] is returned.
    ///
    /// # Errors
    ///
    /// See above; also fails when the cancellation request itself fails.
    pub async fn wait_cancellable(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            () = cancel.cancelled() => {
                self.request_cancel().await?;
                Err(Error::OperationCancelled)
            }
            result = self.wait() => result,
        }
    }

    /// Subscribes a callback to events for this operation. Returns `None`
    /// when the operation is already final.
    ///
    /// # Errors
    ///
    /// Fails when the event stream cannot be established.
    pub async fn add_handler<F, Fut>(&self, handler: F) -> Result<Option<HandlerId>>
    where
        F: Fn(opflow_core::Operation) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.setup_listener().await?;

        if self.get().is_final() {
            return Ok(None);
        }

        let Some(listener) = self.inner.listener.lock().clone() else {
            return Ok(None);
        };

        let id = self.inner.id.clone();
        let handler = Arc::new(handler);
        let handler_id = listener.add_handler(move |event| {
            let id = id.clone();
            let handler = Arc::clone(&handler);
            async move {
                if let Some(op) = extract_operation(&event, &id) {
                    handler(op).await;
                }
            }
        });
        Ok(Some(handler_id))
    }

    /// Detaches a callback registered with
    /// [`RemoteOperation::add_handler`].
    ///
    /// # Errors
    ///
    /// [`Error::HandlerNotFound`] when the token is unknown.
    pub fn remove_handler(&self, handler_id: HandlerId) -> Result<()> {
        match self.inner.listener.lock().clone() {
            Some(listener) => listener.remove_handler(handler_id),
            None => Ok(()),
        }
    }

    async fn request_cancel(&self) -> Result<()> {
        self.cancel().await.map_err(|err| Error::Api {
            code: 0,
            message: format!("Could not cancel operation {}: {err}", self.inner.id),
        })
    }

    /// Arms event tracking with the readiness gate described on the type.
    async fn setup_listener(&self) -> Result<()> {
        let _setup = self.inner.setup.lock().await;

        if self.inner.handler_ready.load(Ordering::Acquire) || *self.inner.done.borrow() {
            return Ok(());
        }

        let listener = {
            let existing = self.inner.listener.lock().clone();
            match existing {
                Some(listener) if listener.is_active() => listener,
                _ => {
                    let listener = self.inner.client.get_events().await?;
                    *self.inner.listener.lock() = Some(Arc::clone(&listener));
                    listener
                }
            }
        };

        // (1) Register the gated handler.
        let (gate_tx, gate_rx) = watch::channel(false);
        let handler_inner = Arc::clone(&self.inner);
        let handler_id = listener.add_handler(move |event| {
            let inner = Arc::clone(&handler_inner);
            let mut gate = gate_rx.clone();
            async move {
                // Events queue here until the refresh result is applied.
                let _ = gate.wait_for(|open| *open).await;

                let Some(op) = extract_operation(&event, &inner.id) else {
                    return;
                };
                let is_final = op.is_final();
                *inner.state.lock() = op;
                if is_final {
                    inner.complete();
                }
            }
        });
        *self.inner.handler_id.lock() = Some(handler_id);

        // Monitor the stream: its death before completion becomes the
        // operation's error.
        {
            let inner = Arc::clone(&self.inner);
            let listener = Arc::clone(&listener);
            tokio::spawn(async move {
                let mut listener_done = listener.done_receiver();
                let mut op_done = inner.done.subscribe();
                tokio::select! {
                    _ = listener_done.wait_for(|done| *done) => {
                        let err = listener
                            .error()
                            .unwrap_or_else(|| "event listener disconnected".to_string());
                        inner.state.lock().err = err;
                        inner.complete();
                    }
                    _ = op_done.wait_for(|done| *done) => {}
                }
            });
        }

        // (2) One-shot refresh; the handler is not armed yet, so this
        // really polls the server.
        if let Err(err) = self.refresh().await {
            self.inner.complete();
            let _ = gate_tx.send(true);
            return Err(err);
        }

        // (3) Already final: fire done and stop before arming.
        if self.get().is_final() {
            self.inner.complete();
            let _ = gate_tx.send(true);
            return Ok(());
        }

        self.inner.handler_ready.store(true, Ordering::Release);
        let _ = gate_tx.send(true);
        Ok(())
    }
}

impl std::fmt::Debug for RemoteOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteOperation")
            .field("id", &self.inner.id)
            .field("status", &self.inner.state.lock().status)
            .finish()
    }
}

/// Pulls an operation render for `id` out of a broadcast event; `None`
/// for unrelated payloads.
fn extract_operation(event: &serde_json::Value, id: &str) -> Option<opflow_core::Operation> {
    let metadata = event.get("metadata")?;
    let op: opflow_core::Operation = serde_json::from_value(metadata.clone()).ok()?;
    (op.id == id).then_some(op)
}
