//! Fixed-size async worker pool.
//!
//! Workers share one unbounded queue, so [`WorkerPool::submit`] returns
//! immediately however busy they are. Each task runs in its own spawned
//! task; a panic there is caught at the join and recorded as a Failed job
//! while the worker moves on.

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Result, VoxError};
use crate::jobs::{JobId, JobKind, JobOutcome, JobStore};

pub type TaskFuture = Pin<Box<dyn Future<Output = JobOutcome> + Send + 'static>>;

/// A unit of work bound to the job it reports into.
pub struct Task {
    pub job_id: JobId,
    pub kind: JobKind,
    work: TaskFuture,
}

impl Task {
    pub fn new<F>(job_id: JobId, kind: JobKind, work: F) -> Self
    where
        F: Future<Output = JobOutcome> + Send + 'static,
    {
        Self {
            job_id,
            kind,
            work: Box::pin(work),
        }
    }
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Task>>>;

pub struct WorkerPool {
    size: usize,
    // Taken on shutdown; workers exit once the queue drains.
    sender: Mutex<Option<mpsc::UnboundedSender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Start `size` workers reporting into `store`. Must be called from
    /// within a tokio runtime.
    pub fn new(size: usize, store: Arc<JobStore>) -> Self {
        let size = size.max(1);
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..size)
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let store = Arc::clone(&store);
                tokio::spawn(worker_loop(worker, receiver, store))
            })
            .collect();

        info!(workers = size, "worker pool started");
        Self {
            size,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Queue `task`. Never waits for a free worker.
    pub fn submit(&self, task: Task) -> Result<()> {
        let sender = self.sender.lock();
        let Some(sender) = sender.as_ref() else {
            return Err(VoxError::BackendUnavailable(
                "worker pool is shut down".into(),
            ));
        };
        let job_id = task.job_id.clone();
        sender.send(task).map_err(|_| {
            VoxError::BackendUnavailable("worker pool has no running workers".into())
        })?;
        debug!(job_id = %job_id, "task queued");
        Ok(())
    }

    /// Stop accepting tasks, let the queue drain and wait for every worker.
    pub async fn shutdown(&self) {
        drop(self.sender.lock().take());
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "worker exited abnormally");
            }
        }
        info!("worker pool stopped");
    }
}

async fn worker_loop(worker: usize, receiver: SharedReceiver, store: Arc<JobStore>) {
    loop {
        // The lock is only held while waiting for the next task.
        let task = receiver.lock().await.recv().await;
        let Some(task) = task else {
            debug!(worker, "queue closed, worker exiting");
            return;
        };
        run_task(worker, &store, task).await;
    }
}

async fn run_task(worker: usize, store: &JobStore, task: Task) {
    let Task { job_id, kind, work } = task;

    if let Err(e) = store.mark_processing(&job_id) {
        warn!(worker, job_id = %job_id, error = %e, "skipping task for unavailable job");
        return;
    }
    debug!(worker, job_id = %job_id, %kind, "task started");

    let outcome = match tokio::spawn(work).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic());
            error!(worker, job_id = %job_id, %kind, panic = %message, "task panicked");
            JobOutcome::failed(kind, format!("worker panicked: {message}"))
        }
        Err(e) => JobOutcome::failed(kind, format!("task cancelled: {e}")),
    };

    match store.finish(&job_id, outcome) {
        Ok(state) => info!(worker, job_id = %job_id, %kind, %state, "task finished"),
        Err(e) => warn!(worker, job_id = %job_id, error = %e, "could not record outcome"),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
