//! Job type and the bounded job queue.

use std::future::Future;
use std::pin::Pin;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

/// A unit of work handed to a pool worker.
///
/// Workers never observe a job's outcome; a job that needs to report an
/// error must capture its own channel.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Error returned when a job cannot be enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    /// The queue has reached its capacity. The push is not retried.
    #[error("Jobs queue is full")]
    QueueFull,
    /// The queue was closed by a draining stop.
    #[error("Jobs queue already closed")]
    QueueClosed,
}

/// Bounded FIFO of jobs with a closed flag.
///
/// The sender side is shared with every operation holding a queue
/// reference; the receiver side lives inside the dispatcher loop while it
/// runs and is parked back here between a non-draining stop and the next
/// start, so undelivered jobs survive a restart.
///
/// The closed flag is guarded by a mutex so `push` cannot race a draining
/// stop: once `close()` returns, no further job can slip into the queue.
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
    receiver: Mutex<Option<mpsc::Receiver<Job>>>,
    closed: Mutex<bool>,
    capacity: usize,
}

impl JobQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            receiver: Mutex::new(Some(rx)),
            closed: Mutex::new(false),
            capacity,
        }
    }

    /// Enqueues a job without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::QueueFull`] immediately when the queue is at
    /// capacity and [`PushError::QueueClosed`] after a draining stop.
    pub fn push(&self, job: Job) -> Result<(), PushError> {
        let closed = self.closed.lock();
        if *closed {
            return Err(PushError::QueueClosed);
        }

        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PushError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(PushError::QueueClosed),
        }
    }

    /// Marks the queue closed. Jobs already enqueued stay readable for the
    /// dispatcher's drain; new pushes fail with [`PushError::QueueClosed`].
    pub(crate) fn close(&self) {
        *self.closed.lock() = true;
    }

    /// True once the queue has been closed by a draining stop.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    /// Number of jobs currently buffered in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    /// True when no jobs are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of buffered jobs.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Takes the receiver half for the dispatcher loop.
    pub(crate) fn take_receiver(&self) -> Option<mpsc::Receiver<Job>> {
        self.receiver.lock().take()
    }

    /// Parks the receiver half back after a non-draining stop.
    pub(crate) fn restore_receiver(&self, rx: mpsc::Receiver<Job>) {
        *self.receiver.lock() = Some(rx);
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Drains buffered jobs without blocking. Used by the dispatcher's
/// finalization after a draining stop.
pub(crate) fn drain(rx: &mut mpsc::Receiver<Job>) -> Vec<Job> {
    let mut jobs = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(job) => jobs.push(job),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
        }
    }
    jobs
}
