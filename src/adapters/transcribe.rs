//! The Transcribe adapter.

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::jobs::{JobKind, JobOutcome, JobOutput, NO_SPEECH_SENTINEL};

/// A speech-recognition backend. Calls may block.
pub trait SpeechRecognizer: Send + Sync {
    fn name(&self) -> &str;

    fn transcribe(&self, audio: &Path) -> anyhow::Result<String>;
}

#[derive(Clone, Default)]
pub struct Transcriber {
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
}

impl Transcriber {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>) -> Self {
        Self {
            recognizer: Some(recognizer),
        }
    }

    /// A transcriber whose every call fails; used when nothing is configured.
    pub fn unconfigured() -> Self {
        Self { recognizer: None }
    }

    pub fn is_configured(&self) -> bool {
        self.recognizer.is_some()
    }

    /// Recognize speech in `audio`.
    ///
    /// An empty transcript is a successful job carrying the no-speech
    /// sentinel. A backend error fails the job, still with displayable text.
    pub fn transcribe(&self, audio: &Path) -> JobOutcome {
        let Some(recognizer) = &self.recognizer else {
            warn!("no speech recognizer configured");
            return JobOutcome::failed(JobKind::Transcribe, "no speech recognizer configured");
        };

        match recognizer.transcribe(audio) {
            Ok(text) => {
                let text = text.trim();
                if text.is_empty() {
                    info!(backend = recognizer.name(), audio = %audio.display(), "no speech recognized");
                    JobOutcome::Completed(JobOutput::Transcript {
                        text: NO_SPEECH_SENTINEL.to_string(),
                    })
                } else {
                    info!(backend = recognizer.name(), chars = text.chars().count(), "transcription complete");
                    JobOutcome::Completed(JobOutput::Transcript {
                        text: text.to_string(),
                    })
                }
            }
            Err(e) => {
                error!(backend = recognizer.name(), error = %e, "transcription failed");
                JobOutcome::failed(JobKind::Transcribe, format!("{e:#}"))
            }
        }
    }
}
