//! Dispatcher: pairs the bounded job queue with a fixed worker pool.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;
use tracing::debug;

use super::job::{self, Job, JobQueue};
use super::worker::{self, Worker};

const MAX_QUEUED_JOBS_DEFAULT: usize = 100;
const MAX_CONCURRENT_JOBS_DEFAULT: usize = 10;

/// Pool engine: receives jobs from the queue and hands each one to the
/// next ready worker, preserving submission order.
///
/// The dispatcher starts stopped. `start` builds the queue (or reuses a
/// surviving one), spawns the workers and the dispatch loop; `stop` tears
/// the loop down, optionally closing and draining the queue. A stop that
/// leaves the queue open keeps undelivered jobs buffered for the next
/// start.
pub struct Dispatcher {
    queue_size: usize,
    pool_size: usize,
    inner: Mutex<Inner>,
}

struct Inner {
    running: bool,
    queue: Option<Arc<JobQueue>>,
    stop_tx: Option<oneshot::Sender<bool>>,
    loop_handle: Option<JoinHandle<Option<mpsc::Receiver<Job>>>>,
}

impl Dispatcher {
    /// Creates a stopped dispatcher. Zero sizes select the defaults
    /// (queue 100, pool 10).
    #[must_use]
    pub fn new(queue_size: usize, pool_size: usize) -> Self {
        Self {
            queue_size: if queue_size == 0 {
                MAX_QUEUED_JOBS_DEFAULT
            } else {
                queue_size
            },
            pool_size: if pool_size == 0 {
                MAX_CONCURRENT_JOBS_DEFAULT
            } else {
                pool_size
            },
            inner: Mutex::new(Inner {
                running: false,
                queue: None,
                stop_tx: None,
                loop_handle: None,
            }),
        }
    }

    /// Current job queue. `None` until the first `start`. Operations keep
    /// the returned `Arc` as their submission handle; after a draining
    /// stop the queue reports closed and a later `start` installs a fresh
    /// one here.
    #[must_use]
    pub fn queue(&self) -> Option<Arc<JobQueue>> {
        self.inner.lock().queue.clone()
    }

    /// Starts workers and the dispatch loop. Idempotent; when it returns,
    /// every worker is parked on the ready channel.
    pub async fn start(&self) {
        let started = Arc::new(Semaphore::new(0));

        {
            let mut inner = self.inner.lock();
            if inner.running {
                return;
            }

            // Reuse the queue across a non-draining stop; rebuild it when
            // absent or closed.
            let rebuild = inner.queue.as_ref().map_or(true, |q| q.is_closed());
            if rebuild {
                inner.queue = Some(Arc::new(JobQueue::new(self.queue_size)));
            }
            let queue = inner.queue.clone().expect("queue installed above");
            let rx = queue
                .take_receiver()
                .expect("queue receiver parked while stopped");

            let (ready_tx, ready_rx) = mpsc::channel(self.pool_size);
            let workers: Vec<JoinHandle<()>> = (0..self.pool_size)
                .map(|_| worker::spawn(ready_tx.clone(), started.clone()))
                .collect();

            let (stop_tx, stop_rx) = oneshot::channel();
            inner.stop_tx = Some(stop_tx);
            inner.loop_handle = Some(tokio::spawn(run_loop(
                queue,
                rx,
                ready_rx,
                workers,
                stop_rx,
                self.pool_size,
            )));
            inner.running = true;
        }

        // Rendezvous: every worker has parked once.
        let permits = u32::try_from(self.pool_size).unwrap_or(u32::MAX);
        started
            .acquire_many(permits)
            .await
            .expect("readiness semaphore never closed")
            .forget();

        debug!(
            queue_size = self.queue_size,
            pool_size = self.pool_size,
            "Dispatcher started"
        );
    }

    /// Stops the dispatch loop and the workers.
    ///
    /// With `close_queue` the queue is closed and every buffered job is
    /// still handed to a worker before the workers exit; a later `start`
    /// rebuilds the queue. Without it the buffered jobs stay in the queue
    /// and are served on the next `start`.
    pub async fn stop(&self, close_queue: bool) {
        let (stop_tx, loop_handle) = {
            let mut inner = self.inner.lock();
            if !inner.running {
                return;
            }
            (inner.stop_tx.take(), inner.loop_handle.take())
        };

        if let Some(tx) = stop_tx {
            let _ = tx.send(close_queue);
        }

        let returned_rx = match loop_handle {
            Some(handle) => handle.await.ok().flatten(),
            None => None,
        };

        let mut inner = self.inner.lock();
        inner.running = false;
        if let (Some(rx), Some(queue)) = (returned_rx, inner.queue.as_ref()) {
            queue.restore_receiver(rx);
        }

        debug!(close_queue, "Dispatcher stopped");
    }

    /// True while the dispatch loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.lock().running
    }
}

/// Dispatch loop body. Returns the queue receiver for reuse when the stop
/// left the queue open, `None` after a draining stop.
///
/// A worker is claimed before a job is pulled, so the queue buffer is only
/// consumed when the job can be handed off immediately. That keeps the
/// queue bound exact: with every worker busy, the (capacity+1)-th push
/// fails instead of a job sitting dequeued in limbo.
async fn run_loop(
    queue: Arc<JobQueue>,
    mut rx: mpsc::Receiver<Job>,
    mut ready_rx: mpsc::Receiver<Worker>,
    workers: Vec<JoinHandle<()>>,
    mut stop_rx: oneshot::Receiver<bool>,
    pool_size: usize,
) -> Option<mpsc::Receiver<Job>> {
    let mut close_queue = false;
    let mut idle: Option<Worker> = None;

    'main: loop {
        let worker = match idle.take() {
            Some(worker) => worker,
            None => tokio::select! {
                res = &mut stop_rx => {
                    // A dropped sender counts as a draining stop.
                    close_queue = res.unwrap_or(true);
                    break 'main;
                }
                parked = ready_rx.recv() => match parked {
                    Some(worker) => worker,
                    None => break 'main,
                },
            },
        };

        tokio::select! {
            res = &mut stop_rx => {
                close_queue = res.unwrap_or(true);
                idle = Some(worker);
                break 'main;
            }
            job = rx.recv() => match job {
                Some(job) => worker.assign(job).await,
                None => {
                    idle = Some(worker);
                    break 'main;
                }
            },
        }
    }

    if close_queue {
        // Close first so no new job can race the drain, then dispatch
        // whatever is still buffered.
        queue.close();
        for job in job::drain(&mut rx) {
            let worker = match idle.take() {
                Some(worker) => Some(worker),
                None => ready_rx.recv().await,
            };
            match worker {
                Some(worker) => worker.assign(job).await,
                None => break,
            }
        }
    }

    // Collect each worker as it finishes its current job and tell it to
    // exit.
    for _ in 0..pool_size {
        let worker = match idle.take() {
            Some(worker) => Some(worker),
            None => ready_rx.recv().await,
        };
        match worker {
            Some(worker) => worker.stop().await,
            None => break,
        }
    }
    for handle in workers {
        let _ = handle.await;
    }

    if close_queue {
        None
    } else {
        Some(rx)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex as SyncMutex;

    use super::super::job::PushError;
    use super::*;

    /// Pushes a job and yields briefly so the dispatch loop can hand it
    /// to a worker before the next push fills the buffer slot.
    async fn push_and_settle(queue: &Arc<JobQueue>, job: Job) {
        queue.push(job).expect("push accepted");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn new_dispatcher_is_stopped_with_no_queue() {
        let d = Dispatcher::new(5, 2);
        assert!(!d.is_running());
        assert!(d.queue().is_none());
    }

    #[tokio::test]
    async fn zero_sizes_select_defaults() {
        let d = Dispatcher::new(0, 0);
        d.start().await;
        let queue = d.queue().expect("queue built on start");
        assert_eq!(queue.capacity(), 100);
        d.stop(true).await;
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let d = Dispatcher::new(2, 2);
        d.start().await;
        let queue = d.queue().unwrap();
        d.start().await;
        // Same queue instance: the second start was a no-op.
        assert!(Arc::ptr_eq(&queue, &d.queue().unwrap()));
        d.stop(true).await;
    }

    #[tokio::test]
    async fn jobs_execute_in_submission_order_with_single_worker() {
        let d = Dispatcher::new(50, 1);
        d.start().await;
        let queue = d.queue().unwrap();

        let order = Arc::new(SyncMutex::new(Vec::new()));
        let (done_tx, mut done_rx) = mpsc::channel(32);
        for i in 0..20 {
            let order = order.clone();
            let done_tx = done_tx.clone();
            queue
                .push(Box::pin(async move {
                    order.lock().push(i);
                    let _ = done_tx.send(()).await;
                }))
                .unwrap();
        }

        for _ in 0..20 {
            done_rx.recv().await.unwrap();
        }
        assert_eq!(*order.lock(), (0..20).collect::<Vec<_>>());

        d.stop(true).await;
    }

    #[tokio::test]
    async fn push_fails_when_queue_is_full() {
        let d = Dispatcher::new(1, 1);
        d.start().await;
        let queue = d.queue().unwrap();

        let gate = Arc::new(Semaphore::new(0));

        // First job occupies the single worker...
        let g = gate.clone();
        push_and_settle(
            &queue,
            Box::pin(async move {
                let _ = g.acquire().await;
            }),
        )
        .await;
        // ...second fills the single queue slot...
        queue.push(Box::pin(async {})).unwrap();
        // ...third has nowhere to go.
        assert_eq!(queue.push(Box::pin(async {})), Err(PushError::QueueFull));

        gate.add_permits(8);
        d.stop(true).await;
    }

    #[tokio::test]
    async fn push_fails_after_draining_stop() {
        let d = Dispatcher::new(4, 2);
        d.start().await;
        let queue = d.queue().unwrap();

        let executed = Arc::new(AtomicUsize::new(0));
        let (done_tx, mut done_rx) = mpsc::channel(8);
        for _ in 0..3 {
            let executed = executed.clone();
            let done_tx = done_tx.clone();
            queue
                .push(Box::pin(async move {
                    executed.fetch_add(1, Ordering::SeqCst);
                    let _ = done_tx.send(()).await;
                }))
                .unwrap();
        }
        for _ in 0..3 {
            done_rx.recv().await.unwrap();
        }

        d.stop(true).await;

        assert_eq!(queue.push(Box::pin(async {})), Err(PushError::QueueClosed));
        assert_eq!(executed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn draining_stop_runs_buffered_jobs() {
        let d = Dispatcher::new(8, 1);
        d.start().await;
        let queue = d.queue().unwrap();

        let executed = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(Semaphore::new(0));

        // Block the worker so subsequent jobs pile up in the queue.
        let g = gate.clone();
        push_and_settle(
            &queue,
            Box::pin(async move {
                let _ = g.acquire().await;
            }),
        )
        .await;
        for _ in 0..4 {
            let executed = executed.clone();
            queue
                .push(Box::pin(async move {
                    executed.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        gate.add_permits(1);
        d.stop(true).await;

        // stop(true) only returns after the drain handed every buffered
        // job to the worker and the worker exited.
        assert_eq!(executed.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn non_draining_stop_preserves_jobs_for_restart() {
        let d = Dispatcher::new(15, 10);
        d.start().await;
        let queue = d.queue().unwrap();

        let (done_tx, mut done_rx) = mpsc::channel(32);
        for _ in 0..7 {
            let done_tx = done_tx.clone();
            queue
                .push(Box::pin(async move {
                    let _ = done_tx.send(()).await;
                }))
                .unwrap();
        }
        for _ in 0..7 {
            done_rx.recv().await.unwrap();
        }

        d.stop(false).await;

        // Pushed while stopped: buffered, not attended.
        for _ in 0..8 {
            let done_tx = done_tx.clone();
            queue
                .push(Box::pin(async move {
                    let _ = done_tx.send(()).await;
                }))
                .unwrap();
        }
        assert_eq!(queue.len(), 8);

        // Restart reuses the same queue and serves the backlog.
        d.start().await;
        assert!(Arc::ptr_eq(&queue, &d.queue().unwrap()));
        for _ in 0..8 {
            tokio::time::timeout(Duration::from_secs(2), done_rx.recv())
                .await
                .expect("buffered job delivered after restart")
                .unwrap();
        }

        d.stop(true).await;
    }

    #[tokio::test]
    async fn restart_after_draining_stop_rebuilds_queue() {
        let d = Dispatcher::new(3, 1);
        d.start().await;
        let old_queue = d.queue().unwrap();
        d.stop(true).await;

        d.start().await;
        let new_queue = d.queue().unwrap();
        assert!(!Arc::ptr_eq(&old_queue, &new_queue));
        assert!(!new_queue.is_closed());

        // The stale handle still reports closed to its holders.
        assert_eq!(
            old_queue.push(Box::pin(async {})),
            Err(PushError::QueueClosed)
        );
        d.stop(true).await;
    }

    #[tokio::test]
    async fn panicking_job_does_not_stall_the_pool() {
        let d = Dispatcher::new(4, 1);
        d.start().await;
        let queue = d.queue().unwrap();

        queue
            .push(Box::pin(async {
                panic!("boom");
            }))
            .unwrap();

        let (done_tx, mut done_rx) = mpsc::channel(1);
        queue
            .push(Box::pin(async move {
                let _ = done_tx.send(()).await;
            }))
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), done_rx.recv())
            .await
            .expect("job after the panic still runs")
            .unwrap();

        d.stop(true).await;
    }
}
