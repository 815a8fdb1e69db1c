use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audio::AudioArtifact;
use crate::llm::Completion;

/// Opaque job identifier. Freshly generated per job and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle of a job. Transitions only move forward:
/// Pending → Processing → Completed | Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    /// Position in the lifecycle; both terminal states share the last rank.
    pub fn rank(self) -> u8 {
        match self {
            JobState::Pending => 0,
            JobState::Processing => 1,
            JobState::Completed | JobState::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Processing => write!(f, "processing"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Transcribe,
    Synthesize,
    Complete,
    ConvertAndTranscribe,
}

/// Shown when speech recognition produced nothing.
pub const NO_SPEECH_SENTINEL: &str = "(no speech recognized)";
/// Shown when speech recognition itself failed.
pub const TRANSCRIPTION_FAILED_SENTINEL: &str = "(speech recognition failed)";
pub const SYNTHESIS_FAILED_SENTINEL: &str = "(speech synthesis failed)";
pub const COMPLETION_FAILED_SENTINEL: &str = "(AI processing failed, please try again later)";

impl JobKind {
    /// Displayable text attached to a failed job of this kind.
    pub fn failure_text(self) -> &'static str {
        match self {
            JobKind::Transcribe | JobKind::ConvertAndTranscribe => TRANSCRIPTION_FAILED_SENTINEL,
            JobKind::Synthesize => SYNTHESIS_FAILED_SENTINEL,
            JobKind::Complete => COMPLETION_FAILED_SENTINEL,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Transcribe => write!(f, "transcribe"),
            JobKind::Synthesize => write!(f, "synthesize"),
            JobKind::Complete => write!(f, "complete"),
            JobKind::ConvertAndTranscribe => write!(f, "convert_and_transcribe"),
        }
    }
}

/// Typed request accepted by the orchestrator; stored as the job payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobRequest {
    /// Transcribe an already-decodable WAV file.
    Transcribe { audio: PathBuf },
    /// Normalize an uploaded blob to WAV, then transcribe it.
    ConvertAndTranscribe { input: PathBuf, session: String },
    Synthesize { text: String },
    Complete { prompt: String },
}

impl JobRequest {
    pub fn kind(&self) -> JobKind {
        match self {
            JobRequest::Transcribe { .. } => JobKind::Transcribe,
            JobRequest::ConvertAndTranscribe { .. } => JobKind::ConvertAndTranscribe,
            JobRequest::Synthesize { .. } => JobKind::Synthesize,
            JobRequest::Complete { .. } => JobKind::Complete,
        }
    }
}

/// Kind-specific result of a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobOutput {
    Transcript { text: String },
    Audio(AudioArtifact),
    Reply(Completion),
}

impl JobOutput {
    pub fn display_text(&self) -> String {
        match self {
            JobOutput::Transcript { text } => text.clone(),
            JobOutput::Audio(artifact) => artifact.path.display().to_string(),
            JobOutput::Reply(completion) => completion.reply.clone(),
        }
    }
}

/// Terminal outcome of a job. Holding exactly one of these is what makes
/// "result xor error" hold for every terminal job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobOutcome {
    Completed(JobOutput),
    /// `display` is always something a caller can show in place of a result.
    Failed { error: String, display: String },
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Completed(_) => JobState::Completed,
            JobOutcome::Failed { .. } => JobState::Failed,
        }
    }

    pub fn failed(kind: JobKind, error: impl Into<String>) -> Self {
        JobOutcome::Failed {
            error: error.into(),
            display: kind.failure_text().to_string(),
        }
    }
}

/// A tracked unit of asynchronous work.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub state: JobState,
    pub payload: JobRequest,
    pub outcome: Option<JobOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn new(payload: JobRequest) -> Self {
        Self::with_id(JobId::new(), payload)
    }

    /// A Pending job under an id the caller already handed out, for
    /// requests whose payload has to name the job (staged uploads).
    pub fn with_id(id: JobId, payload: JobRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind: payload.kind(),
            state: JobState::Pending,
            payload,
            outcome: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn result(&self) -> Option<&JobOutput> {
        match &self.outcome {
            Some(JobOutcome::Completed(output)) => Some(output),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Some(JobOutcome::Failed { error, .. }) => Some(error),
            _ => None,
        }
    }
}

/// What a poller sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub kind: JobKind,
    pub status: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set for every terminal job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_text: Option<String>,
}

impl From<&Job> for JobSnapshot {
    fn from(job: &Job) -> Self {
        let display_text = match &job.outcome {
            Some(JobOutcome::Completed(output)) => Some(output.display_text()),
            Some(JobOutcome::Failed { display, .. }) => Some(display.clone()),
            None => None,
        };
        Self {
            id: job.id.clone(),
            kind: job.kind,
            status: job.state,
            result: job.result().cloned(),
            error: job.error().map(str::to_string),
            display_text,
        }
    }
}
