//! Backends that shell out to external programs configured in
//! `voxrelay.toml`. All of them block; callers run them off the runtime.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use anyhow::{Context, bail};
use tracing::debug;

use super::synthesize::{NeuralVoice, SpeechEngine};
use super::transcribe::SpeechRecognizer;
use crate::audio::{RawAudio, pcm16_le_to_f32};
use crate::config::{CommandSpec, NeuralVoiceConfig};
use crate::error::VoxError;

fn program_name(spec: &CommandSpec) -> String {
    spec.command
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| spec.command.display().to_string())
}

fn check_status(name: &str, output: &Output) -> anyhow::Result<()> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    bail!(
        "{name} exited with {}: {}",
        output.status,
        stderr.trim()
    )
}

/// Recognizer run as `command args... <audio>`, transcript on stdout.
pub struct CommandRecognizer {
    spec: CommandSpec,
    name: String,
}

impl CommandRecognizer {
    pub fn new(spec: CommandSpec) -> Self {
        let name = program_name(&spec);
        Self { spec, name }
    }
}

impl SpeechRecognizer for CommandRecognizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn transcribe(&self, audio: &Path) -> anyhow::Result<String> {
        debug!(program = %self.spec.command.display(), audio = %audio.display(), "running recognizer");
        let output = Command::new(&self.spec.command)
            .args(&self.spec.args)
            .arg(audio)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to run {}", self.spec.command.display()))?;
        check_status(&self.name, &output)?;

        String::from_utf8(output.stdout).map_err(|e| {
            VoxError::MalformedResponse(format!("{} printed non-UTF-8 text: {e}", self.name)).into()
        })
    }
}

/// Voice fed text on stdin that answers with raw signed 16-bit mono PCM.
pub struct CommandVoice {
    spec: CommandSpec,
    name: String,
    sample_rate: u32,
}

impl CommandVoice {
    pub fn new(config: NeuralVoiceConfig) -> Self {
        let name = program_name(&config.spec);
        Self {
            spec: config.spec,
            name,
            sample_rate: config.sample_rate,
        }
    }
}

impl NeuralVoice for CommandVoice {
    fn name(&self) -> &str {
        &self.name
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn synthesize(&mut self, text: &str) -> anyhow::Result<RawAudio> {
        let mut child = Command::new(&self.spec.command)
            .args(&self.spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to run {}", self.spec.command.display()))?;

        // Stdin is dropped at the end of this block so the voice sees EOF.
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes())?;
            stdin.write_all(b"\n")?;
        }

        let output = child.wait_with_output()?;
        check_status(&self.name, &output)?;
        if output.stdout.len() % 2 != 0 {
            debug!(bytes = output.stdout.len(), "odd PCM length, dropping last byte");
        }
        Ok(RawAudio::Mono(pcm16_le_to_f32(&output.stdout)))
    }
}

/// Engine run as `command args... <out.wav> <text>`.
pub struct CommandEngine {
    spec: CommandSpec,
    name: String,
}

impl CommandEngine {
    pub fn new(spec: CommandSpec) -> Self {
        let name = program_name(&spec);
        Self { spec, name }
    }
}

impl SpeechEngine for CommandEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn save_to_file(&self, text: &str, output: &Path) -> anyhow::Result<()> {
        let result = Command::new(&self.spec.command)
            .args(&self.spec.args)
            .arg(output)
            .arg(text)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to run {}", self.spec.command.display()))?;
        check_status(&self.name, &result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn sh(script: &str) -> CommandSpec {
        // `sh -c script arg0 arg1`: appended arguments land in $0, $1.
        CommandSpec {
            command: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
        }
    }

    #[test]
    fn recognizer_reads_stdout_and_passes_path() {
        let recognizer = CommandRecognizer::new(sh("printf 'heard %s' \"$0\""));
        let text = recognizer.transcribe(Path::new("clip.wav")).unwrap();
        assert_eq!(text, "heard clip.wav");
        assert_eq!(recognizer.name(), "sh");
    }

    #[test]
    fn recognizer_failure_carries_stderr() {
        let recognizer = CommandRecognizer::new(sh("echo 'model not loaded' >&2; exit 3"));
        let err = recognizer.transcribe(Path::new("clip.wav")).unwrap_err();
        assert!(err.to_string().contains("model not loaded"));
    }

    #[test]
    fn recognizer_rejects_non_utf8() {
        let recognizer = CommandRecognizer::new(sh("printf '\\377\\376'"));
        let err = recognizer.transcribe(Path::new("clip.wav")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<VoxError>(),
            Some(VoxError::MalformedResponse(_))
        ));
    }

    #[test]
    fn voice_decodes_raw_pcm() {
        let mut voice = CommandVoice::new(NeuralVoiceConfig {
            spec: sh("cat > /dev/null; printf '\\000\\000\\377\\177'"),
            sample_rate: 16000,
        });
        let raw = voice.synthesize("hello").unwrap();
        let samples = raw.into_mono();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0], 0.0);
        assert!((samples[1] - 1.0).abs() < 1e-6);
        assert_eq!(voice.sample_rate(), 16000);
    }

    #[test]
    fn engine_receives_output_then_text() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.txt");
        let engine = CommandEngine::new(sh("printf '%s' \"$1\" > \"$0\""));
        engine.save_to_file("good morning", &out).unwrap();
        assert_eq!(std::fs::read_to_string(out).unwrap(), "good morning");
    }

    #[test]
    fn missing_program_is_an_error() {
        let engine = CommandEngine::new(CommandSpec {
            command: PathBuf::from("/nonexistent/espeak-ng"),
            args: Vec::new(),
        });
        assert!(engine.save_to_file("hi", Path::new("out.wav")).is_err());
    }
}
