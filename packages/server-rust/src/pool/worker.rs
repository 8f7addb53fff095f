//! Pool worker: executes one job at a time, parking itself on the shared
//! ready channel between jobs.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::warn;

use super::job::Job;

/// Message delivered to a parked worker.
pub(crate) enum WorkerMessage {
    /// A job to execute.
    Assign(Job),
    /// Exit without re-parking.
    Stop,
}

/// Handle to a running worker task.
///
/// The worker sends a clone of its own handle to the ready channel each
/// time it becomes idle; the dispatcher pops the next handle to assign a
/// job, so hand-off order follows park order.
#[derive(Clone)]
pub(crate) struct Worker {
    tx: mpsc::Sender<WorkerMessage>,
}

impl Worker {
    /// Hands a job to this worker. The worker came off the ready channel,
    /// so its inbox is guaranteed empty and the send cannot lag.
    pub(crate) async fn assign(&self, job: Job) {
        let _ = self.tx.send(WorkerMessage::Assign(job)).await;
    }

    /// Signals the worker to exit. It will not re-park afterwards.
    pub(crate) async fn stop(&self) {
        let _ = self.tx.send(WorkerMessage::Stop).await;
    }
}

/// Spawns a worker task.
///
/// The worker parks itself on `ready` immediately, adds a permit to
/// `started` so the dispatcher can rendezvous on pool readiness, then
/// loops: receive a message, run the job, re-park. A panicking job is
/// caught and logged; the worker keeps serving.
pub(crate) fn spawn(ready: mpsc::Sender<Worker>, started: Arc<Semaphore>) -> JoinHandle<()> {
    let (tx, mut rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let handle = Worker { tx };

        if ready.send(handle.clone()).await.is_err() {
            return;
        }
        started.add_permits(1);

        loop {
            match rx.recv().await {
                Some(WorkerMessage::Assign(job)) => {
                    if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                        warn!("Job panicked; worker keeps running");
                    }
                }
                Some(WorkerMessage::Stop) | None => return,
            }

            if ready.send(handle.clone()).await.is_err() {
                return;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn worker_parks_then_executes_assigned_job() {
        let (ready_tx, mut ready_rx) = mpsc::channel(1);
        let started = Arc::new(Semaphore::new(0));
        let handle = spawn(ready_tx, started.clone());

        started.acquire().await.unwrap().forget();
        let worker = ready_rx.recv().await.expect("worker parked");

        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();
        worker
            .assign(Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .await;

        // The worker re-parks after finishing the job.
        let worker = ready_rx.recv().await.expect("worker re-parked");
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        worker.stop().await;
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn panicking_job_does_not_kill_worker() {
        let (ready_tx, mut ready_rx) = mpsc::channel(1);
        let started = Arc::new(Semaphore::new(0));
        let handle = spawn(ready_tx, started.clone());

        started.acquire().await.unwrap().forget();
        let worker = ready_rx.recv().await.unwrap();
        worker
            .assign(Box::pin(async {
                panic!("boom");
            }))
            .await;

        // Still alive: re-parks and runs the next job.
        let worker = ready_rx.recv().await.expect("worker survived the panic");
        let done = Arc::new(AtomicU32::new(0));
        let d = done.clone();
        worker
            .assign(Box::pin(async move {
                d.store(7, Ordering::SeqCst);
            }))
            .await;

        let worker = ready_rx.recv().await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 7);

        worker.stop().await;
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker task exits on stop")
            .unwrap();
    }
}
