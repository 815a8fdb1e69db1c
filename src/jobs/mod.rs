mod job;
mod store;

pub use job::{
    COMPLETION_FAILED_SENTINEL, Job, JobId, JobKind, JobOutcome, JobOutput, JobRequest,
    JobSnapshot, JobState, NO_SPEECH_SENTINEL, SYNTHESIS_FAILED_SENTINEL,
    TRANSCRIPTION_FAILED_SENTINEL,
};
pub use store::{JobStore, JobUpdate};
