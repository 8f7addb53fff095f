//! Client-side event listener: handler registry over one event-stream
//! connection.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{Error, Result};

/// Token identifying one registered handler; returned by `add_handler`
/// and consumed by `remove_handler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type EventHandler =
    Arc<dyn Fn(serde_json::Value) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// A connection to the server's event stream.
///
/// The read loop (spawned by [`crate::Client::get_events`]) feeds every
/// decoded event through the registered handlers, awaiting each one in
/// turn so a single listener observes events in broadcast order.
pub struct EventListener {
    handlers: Mutex<Vec<(HandlerId, EventHandler)>>,
    next_id: AtomicU64,
    done: watch::Sender<bool>,
    err: Mutex<Option<String>>,
}

impl EventListener {
    pub(crate) fn new() -> Arc<Self> {
        let (done, _) = watch::channel(false);
        Arc::new(Self {
            handlers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            done,
            err: Mutex::new(None),
        })
    }

    /// Registers a handler called for every received event.
    pub fn add_handler<F, Fut>(&self, handler: F) -> HandlerId
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handler: EventHandler = Arc::new(move |event| Box::pin(handler(event)));
        self.handlers.lock().push((id, handler));
        id
    }

    /// Detaches a handler registered with [`EventListener::add_handler`].
    ///
    /// # Errors
    ///
    /// [`Error::HandlerNotFound`] when the token is unknown.
    pub fn remove_handler(&self, id: HandlerId) -> Result<()> {
        let mut handlers = self.handlers.lock();
        let before = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        if handlers.len() == before {
            return Err(Error::HandlerNotFound);
        }
        Ok(())
    }

    /// Feeds one event through every handler, in registration order.
    pub(crate) async fn dispatch(&self, event: serde_json::Value) {
        let handlers: Vec<EventHandler> = self
            .handlers
            .lock()
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();

        for handler in handlers {
            handler(event.clone()).await;
        }
    }

    /// Stops listening; the read loop closes the connection.
    pub fn disconnect(&self) {
        let _ = self.done.send(true);
    }

    /// Marks the listener dead with a transport error.
    pub(crate) fn fail(&self, err: String) {
        *self.err.lock() = Some(err);
        let _ = self.done.send(true);
    }

    /// Blocks until the server disconnects or [`EventListener::disconnect`]
    /// is called.
    ///
    /// # Errors
    ///
    /// Surfaces the transport error that ended the stream, if any.
    pub async fn wait(&self) -> Result<()> {
        let mut done = self.done.subscribe();
        while !*done.borrow_and_update() {
            if done.changed().await.is_err() {
                break;
            }
        }
        match self.error() {
            Some(err) => Err(Error::Operation(err)),
            None => Ok(()),
        }
    }

    /// True while the stream is connected.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !*self.done.borrow()
    }

    /// The transport error that ended the stream, if it has ended.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.err.lock().clone()
    }

    /// Receiver flipping to `true` when the listener ends.
    #[must_use]
    pub fn done_receiver(&self) -> watch::Receiver<bool> {
        self.done.subscribe()
    }
}

impl std::fmt::Debug for EventListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListener")
            .field("active", &self.is_active())
            .field("handlers", &self.handlers.lock().len())
            .finish()
    }
}
