//! Event broadcaster: fan-out of operation and logging events to every
//! connected WebSocket listener.
//!
//! Each listener owns an unbounded outbound queue drained by its WebSocket
//! write loop, so one listener's slow or broken connection never delays
//! another's. Enqueueing happens synchronously inside `send`, which is what
//! preserves broadcast order per listener.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::debug;
use uuid::Uuid;

use opflow_core::{Event, EventType};

/// A connected event-stream consumer.
///
/// The recorded `types` filter is accepted on the wire for forward
/// compatibility; delivery currently ignores it.
pub struct EventListener {
    id: String,
    types: Vec<EventType>,
    tx: mpsc::UnboundedSender<String>,
    done: watch::Sender<bool>,
}

impl EventListener {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn types(&self) -> &[EventType] {
        &self.types
    }

    /// True until the listener has been disconnected.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !*self.done.borrow()
    }

    /// Receiver that flips to `true` when the listener is disconnected.
    #[must_use]
    pub fn done_receiver(&self) -> watch::Receiver<bool> {
        self.done.subscribe()
    }
}

impl std::fmt::Debug for EventListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventListener")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Owner of the listener set.
///
/// Cheap to clone; all clones share the same listener set.
#[derive(Clone, Debug, Default)]
pub struct EventBroadcaster {
    listeners: Arc<DashMap<String, Arc<EventListener>>>,
}

impl EventBroadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener, returning it together with the receiver its
    /// write loop drains.
    pub(crate) fn register(
        &self,
        types: Vec<EventType>,
    ) -> (Arc<EventListener>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (done, _) = watch::channel(false);

        let listener = Arc::new(EventListener {
            id: Uuid::new_v4().to_string(),
            types,
            tx,
            done,
        });
        self.listeners
            .insert(listener.id.clone(), Arc::clone(&listener));

        debug!("New event listener: {}", listener.id);
        (listener, rx)
    }

    /// Removes a listener from the set and signals its done channel.
    /// Called by the listener's write loop on a failed write or by the
    /// transport when the peer goes away. Other listeners are unaffected.
    pub(crate) fn disconnect(&self, id: &str) {
        if let Some((_, listener)) = self.listeners.remove(id) {
            let _ = listener.done.send(true);
            debug!("Disconnected event listener: {id}");
        }
    }

    /// Wraps a payload into `{timestamp, metadata}` and fans it out to
    /// every listener.
    ///
    /// # Errors
    ///
    /// Fails only when the payload cannot be serialized; per-listener
    /// delivery failures are handled by the listeners' write loops.
    pub fn send<T: Serialize>(&self, payload: &T) -> anyhow::Result<()> {
        let event = Event::new(serde_json::to_value(payload)?);
        self.broadcast(&event)
    }

    fn broadcast(&self, event: &Event) -> anyhow::Result<()> {
        let body = serde_json::to_string(event)?;
        for entry in self.listeners.iter() {
            // A send error means the write loop is gone; it already
            // disconnected itself.
            let _ = entry.value().tx.send(body.clone());
        }
        Ok(())
    }

    /// Number of connected listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}
