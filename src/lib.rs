//! voxrelay runs speech transcription, speech synthesis and LLM completion
//! as asynchronous jobs. Callers submit a request to the [`Orchestrator`],
//! get a [`JobId`] back at once, and poll until the job is terminal.

pub mod adapters;
pub mod audio;
pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod jobs;
pub mod llm;
pub mod orchestrator;
pub mod pool;
pub mod storage;
pub mod ui;

pub use config::VoxConfig;
pub use convert::Converter;
pub use error::{Result, VoxError};
pub use jobs::{JobId, JobRequest, JobSnapshot, JobState};
pub use orchestrator::{Backends, Orchestrator};
pub use storage::ArtifactStore;
