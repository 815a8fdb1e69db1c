//! Blocking speech backends and the adapters that wrap them into job
//! outcomes.

pub mod cache;
pub mod command;
pub mod synthesize;
pub mod transcribe;

pub use cache::SampleCache;
pub use command::{CommandEngine, CommandRecognizer, CommandVoice};
pub use synthesize::{NeuralVoice, SpeechEngine, Synthesizer};
pub use transcribe::{SpeechRecognizer, Transcriber};
