//! Background operation: state machine, lifecycle hooks, wait and render.
//!
//! An operation is created Pending, transitions to Running when its
//! response is rendered, and ends in Success, Failure, or Cancelled. Every
//! transition broadcasts the operation's current render to the event
//! stream; reaching a final state removes the operation from the registry
//! and fires its one-shot done signal, in that order, so listeners always
//! see the final render before lookups start returning not-found.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, error};

use opflow_core::version::versioned_path;
use opflow_core::StatusCode;

use crate::events::EventBroadcaster;
use crate::pool::{Job, JobQueue, PushError};
use crate::registry::OperationRegistry;

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Lifecycle hook invoked at most once, off the operation's lock.
pub type Hook = Box<
    dyn FnOnce(Arc<Operation>) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send
        + 'static,
>;

/// Boxes an async closure into a [`Hook`].
pub fn hook<F, Fut>(f: F) -> Hook
where
    F: FnOnce(Arc<Operation>) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Box::new(move |op| Box::pin(f(op)))
}

/// What a new operation runs, plus its rendered attributes.
///
/// `on_run` executes when the async response is rendered; `on_cancel`, when
/// present, executes on a user-initiated cancel. Without `on_cancel` a
/// cancel moves the operation straight to Cancelled.
#[derive(Default)]
pub struct OperationSpec {
    pub description: String,
    /// Resource kind to resource names; rendered with the version prefix.
    pub resources: HashMap<String, Vec<String>>,
    /// Must be a JSON object (or absent); anything else is rejected.
    pub metadata: Option<serde_json::Value>,
    pub on_run: Option<Hook>,
    pub on_cancel: Option<Hook>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the operation lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("Only pending operations can be started")]
    NotPending,
    #[error("Only running operations can be cancelled")]
    NotRunning,
    #[error("Invalid metadata provided (type isn't a map)")]
    InvalidMetadata,
    #[error("Timeout waiting for operation {0}")]
    WaitTimeout(String),
    #[error(transparent)]
    Queue(#[from] PushError),
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

struct State {
    description: String,
    updated_at: DateTime<Utc>,
    status: StatusCode,
    resources: HashMap<String, Vec<String>>,
    metadata: HashMap<String, serde_json::Value>,
    err: String,
}

struct Hooks {
    on_run: Option<Hook>,
    on_cancel: Option<Hook>,
}

/// An asynchronously completing unit of work tracked by the registry.
///
/// Mutable state sits behind a reader/writer lock; hooks run without it.
/// The registry back-reference is weak so the registry's strong handle is
/// the only thing keeping a live operation's cycle alive; removal on
/// completion breaks it.
pub struct Operation {
    id: String,
    version: String,
    url: String,
    created_at: DateTime<Utc>,
    state: RwLock<State>,
    hooks: Mutex<Hooks>,
    done: watch::Sender<bool>,
    self_ref: Weak<Operation>,
    registry: Weak<OperationRegistry>,
    events: EventBroadcaster,
    queue: Option<Arc<JobQueue>>,
}

impl Operation {
    /// Creates a Pending operation, registers it, and broadcasts its
    /// initial render.
    ///
    /// # Errors
    ///
    /// Fails when the spec's metadata is not a JSON object.
    pub fn spawn(
        spec: OperationSpec,
        version: &str,
        registry: &Arc<OperationRegistry>,
        events: EventBroadcaster,
        queue: Option<Arc<JobQueue>>,
    ) -> Result<Arc<Self>, OperationError> {
        let op = Operation::new(spec, version, Arc::downgrade(registry), events, queue)?;
        registry.add(Arc::clone(&op));

        debug!("New operation: {}", op.id());
        op.broadcast();

        Ok(op)
    }

    fn new(
        spec: OperationSpec,
        version: &str,
        registry: Weak<OperationRegistry>,
        events: EventBroadcaster,
        queue: Option<Arc<JobQueue>>,
    ) -> Result<Arc<Self>, OperationError> {
        let OperationSpec {
            description,
            resources,
            metadata,
            on_run,
            on_cancel,
        } = spec;

        let metadata = parse_metadata(metadata)?;
        let id = uuid::Uuid::new_v4().to_string();
        let url = versioned_path(version, &["operations", &id]);
        let now = Utc::now();
        let (done, _) = watch::channel(false);

        Ok(Arc::new_cyclic(|self_ref| Self {
            id,
            version: version.to_string(),
            url,
            created_at: now,
            state: RwLock::new(State {
                description,
                updated_at: now,
                status: StatusCode::Pending,
                resources,
                metadata,
                err: String::new(),
            }),
            hooks: Mutex::new(Hooks { on_run, on_cancel }),
            done,
            self_ref: self_ref.clone(),
            registry,
            events,
            queue,
        }))
    }

    /// Strong handle to this operation for hook jobs to capture.
    fn arc(&self) -> Arc<Operation> {
        self.self_ref
            .upgrade()
            .expect("a borrowed operation is still referenced")
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Versioned URL of the operation resource.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.state.read().status
    }

    /// Renders the operation for the wire: the URL plus a snapshot where
    /// every resource entry carries the version prefix
    /// (`/<version>/<kind>/<name>`).
    #[must_use]
    pub fn render(&self) -> (String, opflow_core::Operation) {
        let state = self.state.read();

        let resources = state
            .resources
            .iter()
            .map(|(kind, names)| {
                let urls = names
                    .iter()
                    .map(|name| versioned_path(&self.version, &[kind, name]))
                    .collect();
                (kind.clone(), urls)
            })
            .collect();

        let snapshot = opflow_core::Operation {
            id: self.id.clone(),
            description: state.description.clone(),
            created_at: self.created_at,
            updated_at: state.updated_at,
            status: state.status.as_str().to_string(),
            status_code: state.status,
            resources,
            metadata: state.metadata.clone(),
            err: state.err.clone(),
        };

        (self.url.clone(), snapshot)
    }

    /// Starts the operation.
    ///
    /// Transitions Pending -> Running, broadcasts the Running render, then
    /// hands the run hook to the dispatcher queue (or spawns it when no
    /// pool is configured). The hook's outcome drives the Success or
    /// Failure transition.
    ///
    /// # Errors
    ///
    /// [`OperationError::NotPending`] when the operation already started;
    /// a queue error when the pool rejects the job, in which case the
    /// operation completes as Failure.
    pub fn run(&self) -> Result<(), OperationError> {
        {
            let mut state = self.state.write();
            if state.status != StatusCode::Pending {
                return Err(OperationError::NotPending);
            }
            state.status = StatusCode::Running;
            state.updated_at = Utc::now();
        }

        self.broadcast();
        debug!("Started operation: {}", self.id);

        let on_run = self.hooks.lock().on_run.take();
        if let Some(on_run) = on_run {
            let op = self.arc();
            let job: Job = Box::pin(async move {
                match on_run(Arc::clone(&op)).await {
                    Ok(()) => {
                        op.finish(StatusCode::Success, String::new());
                        debug!("Success for operation: {}", op.id());
                    }
                    Err(err) => {
                        error!("Failure for operation: {}: {err:#}", op.id());
                        op.finish(StatusCode::Failure, err.to_string());
                    }
                }
            });
            self.submit(job)?;
        }

        Ok(())
    }

    /// Cancels a running operation.
    ///
    /// Transitions Running -> Cancelling and broadcasts. With a cancel
    /// hook, the hook's outcome drives Cancelled or Failure; without one,
    /// the operation jumps straight to Cancelled with
    /// `err = "Operation cancelled"`.
    ///
    /// # Errors
    ///
    /// [`OperationError::NotRunning`] unless the operation is Running; a
    /// queue error when the pool rejects the cancel job.
    pub fn cancel(&self) -> Result<(), OperationError> {
        {
            let mut state = self.state.write();
            if state.status != StatusCode::Running {
                return Err(OperationError::NotRunning);
            }
            state.status = StatusCode::Cancelling;
            state.updated_at = Utc::now();
        }

        self.broadcast();
        debug!("Cancelling operation: {}", self.id);

        let on_cancel = self.hooks.lock().on_cancel.take();
        match on_cancel {
            Some(on_cancel) => {
                let op = self.arc();
                let job: Job = Box::pin(async move {
                    match on_cancel(Arc::clone(&op)).await {
                        Ok(()) => {
                            op.finish(StatusCode::Cancelled, "Operation cancelled".to_string());
                            debug!("Cancelled operation: {}", op.id());
                        }
                        Err(err) => {
                            error!("Failure for cancelling operation: {}: {err:#}", op.id());
                            op.finish(StatusCode::Failure, err.to_string());
                        }
                    }
                });
                self.submit(job)?;
            }
            None => {
                self.finish(StatusCode::Cancelled, "Operation cancelled".to_string());
                debug!("Cancelled operation: {}", self.id);
            }
        }

        Ok(())
    }

    /// Waits for the operation to reach a final state.
    ///
    /// `timeout` is in seconds: negative waits forever, zero returns
    /// immediately whatever the state, positive bounds the wait.
    ///
    /// # Errors
    ///
    /// [`OperationError::WaitTimeout`] when a positive timeout elapses
    /// first.
    pub async fn wait_final(&self, timeout: i64) -> Result<(), OperationError> {
        if self.status().is_final() {
            return Ok(());
        }

        let mut done = self.done.subscribe();
        if *done.borrow_and_update() {
            return Ok(());
        }

        if timeout < 0 {
            let _ = done.changed().await;
            return Ok(());
        }

        if timeout == 0 {
            return Ok(());
        }

        #[allow(clippy::cast_sign_loss)]
        let limit = Duration::from_secs(timeout as u64);
        match tokio::time::timeout(limit, done.changed()).await {
            Ok(_) => Ok(()),
            Err(_) => Err(OperationError::WaitTimeout(self.id.clone())),
        }
    }

    /// Moves the operation to a final state: records status and error,
    /// broadcasts the final render, removes the operation from the
    /// registry, and fires the done signal. Tolerates racing completion
    /// paths; only the first caller past the final-state check proceeds.
    fn finish(&self, status: StatusCode, err: String) {
        {
            let mut state = self.state.write();
            if state.status.is_final() {
                return;
            }
            state.status = status;
            state.updated_at = Utc::now();
            state.err = err;
        }

        self.broadcast();

        {
            let mut hooks = self.hooks.lock();
            hooks.on_run = None;
            hooks.on_cancel = None;
        }

        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id);
        }
        let _ = self.done.send(true);
    }

    /// Broadcasts the current render to the event stream.
    pub(crate) fn broadcast(&self) {
        let (_, snapshot) = self.render();
        if let Err(err) = self.events.send(&snapshot) {
            error!("Failed to broadcast operation {}: {err:#}", self.id);
        }
    }

    fn submit(&self, job: Job) -> Result<(), OperationError> {
        match &self.queue {
            Some(queue) => queue.push(job).map_err(|err| {
                self.finish(StatusCode::Failure, err.to_string());
                OperationError::Queue(err)
            }),
            None => {
                tokio::spawn(job);
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Validates creation-time metadata: absent or null means empty, a JSON
/// object is taken as-is, anything else is rejected.
pub(crate) fn parse_metadata(
    metadata: Option<serde_json::Value>,
) -> Result<HashMap<String, serde_json::Value>, OperationError> {
    match metadata {
        None | Some(serde_json::Value::Null) => Ok(HashMap::new()),
        Some(serde_json::Value::Object(map)) => Ok(map.into_iter().collect()),
        Some(_) => Err(OperationError::InvalidMetadata),
    }
}
