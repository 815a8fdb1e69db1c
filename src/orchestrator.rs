//! Entry point for callers: submit a typed request, get a job id back, and
//! poll until the job reaches a terminal state.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::adapters::{Synthesizer, Transcriber};
use crate::config::StoreConfig;
use crate::convert::{Converter, TRANSCODER};
use crate::error::{Result, VoxError};
use crate::jobs::{JobId, JobKind, JobOutcome, JobOutput, JobRequest, JobSnapshot, JobStore};
use crate::llm::{ChatSender, Completer};
use crate::pool::{Task, WorkerPool};
use crate::storage::ArtifactStore;

/// Everything the orchestrator dispatches work to.
pub struct Backends<C> {
    /// `None` when no transcoder was found; upload jobs then fail.
    pub converter: Option<Converter>,
    pub transcriber: Transcriber,
    pub synthesizer: Synthesizer,
    pub completer: Completer<C>,
}

pub struct Orchestrator<C> {
    store: Arc<JobStore>,
    pool: WorkerPool,
    converter: Option<Arc<Converter>>,
    transcriber: Arc<Transcriber>,
    synthesizer: Arc<Synthesizer>,
    completer: Arc<Completer<C>>,
    artifacts: ArtifactStore,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl<C: ChatSender + 'static> Orchestrator<C> {
    /// Start the pool and the expiry sweeper. Must be called from within a
    /// tokio runtime.
    pub fn new(
        workers: usize,
        backends: Backends<C>,
        artifacts: ArtifactStore,
        store_config: &StoreConfig,
    ) -> Result<Self> {
        artifacts.ensure()?;
        let store = Arc::new(JobStore::new());
        let pool = WorkerPool::new(workers, Arc::clone(&store));
        let sweeper = spawn_sweeper(Arc::clone(&store), artifacts.clone(), store_config);

        Ok(Self {
            store,
            pool,
            converter: backends.converter.map(Arc::new),
            transcriber: Arc::new(backends.transcriber),
            synthesizer: Arc::new(backends.synthesizer),
            completer: Arc::new(backends.completer),
            artifacts,
            sweeper: Mutex::new(sweeper),
        })
    }

    /// Create a Pending job for `request` and queue it. Returns at once.
    pub fn submit(&self, request: JobRequest) -> Result<JobId> {
        self.enqueue(JobId::new(), request)
    }

    /// Save an uploaded chunk and queue its conversion and transcription.
    /// Each upload gets its own files, so chunks of one session never
    /// overwrite each other.
    pub fn submit_upload(&self, session: &str, extension: Option<&str>, bytes: &[u8]) -> Result<JobId> {
        let id = JobId::new();
        let input = self.artifacts.stage_upload(session, &id, extension, bytes)?;
        let request = JobRequest::ConvertAndTranscribe {
            input: input.clone(),
            session: session.to_string(),
        };

        self.enqueue(id, request).inspect_err(|_| {
            if let Err(e) = std::fs::remove_file(&input) {
                warn!(path = %input.display(), error = %e, "could not remove unqueued upload");
            }
        })
    }

    fn enqueue(&self, id: JobId, request: JobRequest) -> Result<JobId> {
        let kind = request.kind();
        let id = self.store.create_with_id(id, request.clone());
        let task = self.task_for(&id, request);

        if let Err(e) = self.pool.submit(task) {
            // The id never reaches a caller, so nobody could poll this job.
            warn!(job_id = %id, %kind, error = %e, "could not queue job");
            self.store.remove(&id);
            return Err(e);
        }
        info!(job_id = %id, %kind, "job submitted");
        Ok(id)
    }

    /// Current view of a job. A terminal job is handed out once and then
    /// forgotten.
    pub fn poll(&self, id: &JobId) -> Result<JobSnapshot> {
        self.store.read_and_consume(id)
    }

    /// Poll every `interval` until the job is terminal.
    pub async fn wait(&self, id: &JobId, interval: Duration) -> Result<JobSnapshot> {
        self.wait_with(id, interval, |_| {}).await
    }

    /// Like [`wait`](Self::wait), reporting each intermediate snapshot.
    pub async fn wait_with<F>(&self, id: &JobId, interval: Duration, mut on_update: F) -> Result<JobSnapshot>
    where
        F: FnMut(&JobSnapshot),
    {
        loop {
            let snapshot = self.poll(id)?;
            on_update(&snapshot);
            if snapshot.status.is_terminal() {
                return Ok(snapshot);
            }
            sleep(interval).await;
        }
    }

    /// Jobs currently tracked, consumed ones excluded.
    pub fn tracked_jobs(&self) -> usize {
        self.store.len()
    }

    #[cfg(test)]
    fn sweeper_active(&self) -> bool {
        self.sweeper
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Stop taking work, finish what is queued and stop the sweeper.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        self.pool.shutdown().await;
    }

    fn task_for(&self, id: &JobId, request: JobRequest) -> Task {
        let kind = request.kind();
        match request {
            JobRequest::Transcribe { audio } => {
                let transcriber = Arc::clone(&self.transcriber);
                Task::new(id.clone(), kind, async move {
                    run_blocking(kind, move || transcriber.transcribe(&audio)).await
                })
            }
            JobRequest::ConvertAndTranscribe { input, session } => {
                let converter = self.converter.clone();
                let transcriber = Arc::clone(&self.transcriber);
                let output = self.artifacts.converted_path(&session, id);
                Task::new(id.clone(), kind, async move {
                    let Some(converter) = converter else {
                        let err = VoxError::ToolMissing {
                            tool: TRANSCODER.to_string(),
                        };
                        return JobOutcome::failed(kind, err.to_string());
                    };
                    let output = match output {
                        Ok(path) => path,
                        Err(e) => return JobOutcome::failed(kind, e.to_string()),
                    };
                    match converter.convert(&input, &output).await {
                        Ok(wav) => run_blocking(kind, move || transcriber.transcribe(&wav)).await,
                        Err(e) => JobOutcome::failed(kind, e.to_string()),
                    }
                })
            }
            JobRequest::Synthesize { text } => {
                let synthesizer = Arc::clone(&self.synthesizer);
                let output = self.artifacts.reply_path(id);
                Task::new(id.clone(), kind, async move {
                    run_blocking(kind, move || match synthesizer.synthesize(&text, &output) {
                        Ok(artifact) => JobOutcome::Completed(JobOutput::Audio(artifact)),
                        Err(e) => JobOutcome::failed(kind, e.to_string()),
                    })
                    .await
                })
            }
            JobRequest::Complete { prompt } => {
                let completer = Arc::clone(&self.completer);
                Task::new(id.clone(), kind, async move {
                    JobOutcome::Completed(JobOutput::Reply(completer.complete(&prompt).await))
                })
            }
        }
    }
}

impl<C> Drop for Orchestrator<C> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}

/// Run a blocking adapter call off the async workers. A panic inside is
/// re-raised so the pool records it like any other task panic.
async fn run_blocking<F>(kind: JobKind, f: F) -> JobOutcome
where
    F: FnOnce() -> JobOutcome + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => JobOutcome::failed(kind, format!("blocking task cancelled: {e}")),
    }
}

/// Periodically drop unpolled terminal jobs and artifacts older than the
/// ttl. A ttl of zero expires them at the next sweep.
fn spawn_sweeper(
    store: Arc<JobStore>,
    artifacts: ArtifactStore,
    config: &StoreConfig,
) -> Option<JoinHandle<()>> {
    if config.sweep_interval_secs == 0 {
        debug!("job expiry sweeper disabled");
        return None;
    }
    let max_age = Duration::from_secs(config.ttl_secs);
    let ttl = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
    let period = Duration::from_secs(config.sweep_interval_secs);

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick fires immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            store.sweep_expired(ttl);

            let artifacts = artifacts.clone();
            if let Err(e) =
                tokio::task::spawn_blocking(move || artifacts.sweep_older_than(max_age)).await
            {
                warn!(error = %e, "artifact sweep did not finish");
            }
        }
    }))
}
