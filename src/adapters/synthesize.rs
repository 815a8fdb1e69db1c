//! The Synthesize adapter: neural voice, then a generic engine, then a
//! generated tone, so a request always ends with a playable file.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::cache::SampleCache;
use crate::audio::{AudioArtifact, RawAudio, ToneSpec, inspect_wav, write_wav_pcm16};
use crate::error::{Result, VoxError};

/// A voice that returns samples. Native inference runtimes are often not
/// reentrant, so the adapter only ever calls it under its own lock.
pub trait NeuralVoice: Send {
    fn name(&self) -> &str;

    fn sample_rate(&self) -> u32;

    fn synthesize(&mut self, text: &str) -> anyhow::Result<RawAudio>;
}

/// A generic engine that renders straight into a file.
pub trait SpeechEngine: Send + Sync {
    fn name(&self) -> &str;

    fn save_to_file(&self, text: &str, output: &Path) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VoiceTier {
    Neural,
    Engine,
    Tone,
}

const TIERS: [VoiceTier; 3] = [VoiceTier::Neural, VoiceTier::Engine, VoiceTier::Tone];

pub struct Synthesizer {
    // Every neural call goes through this lock.
    neural: Option<Mutex<Box<dyn NeuralVoice>>>,
    engine: Option<Box<dyn SpeechEngine>>,
    // Locked separately so cache hits never wait on the voice.
    cache: Mutex<SampleCache>,
    placeholder: String,
    tone: ToneSpec,
}

impl Synthesizer {
    pub fn new(placeholder: impl Into<String>, cache_capacity: usize) -> Self {
        Self {
            neural: None,
            engine: None,
            cache: Mutex::new(SampleCache::new(cache_capacity)),
            placeholder: placeholder.into(),
            tone: ToneSpec::default(),
        }
    }

    pub fn with_neural(mut self, voice: Box<dyn NeuralVoice>) -> Self {
        self.neural = Some(Mutex::new(voice));
        self
    }

    pub fn with_engine(mut self, engine: Box<dyn SpeechEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_tone(mut self, tone: ToneSpec) -> Self {
        self.tone = tone;
        self
    }

    pub fn has_neural(&self) -> bool {
        self.neural.is_some()
    }

    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Pre-render `phrases` into the sample cache. Returns how many made it.
    pub fn warm_up(&self, phrases: &[String]) -> usize {
        if self.neural.is_none() {
            return 0;
        }
        let mut warmed = 0;
        for phrase in phrases {
            match self.neural_samples(phrase) {
                Ok(_) => warmed += 1,
                Err(e) => warn!(phrase = %phrase, error = %e, "warm-up synthesis failed"),
            }
        }
        info!(warmed, total = phrases.len(), "voice cache warmed");
        warmed
    }

    /// Render `text` into a WAV at `output`.
    ///
    /// Blank text is replaced by the placeholder. Whatever sits at `output`
    /// is removed before each tier. Only fails if even the tone cannot be
    /// written.
    pub fn synthesize(&self, text: &str, output: &Path) -> Result<AudioArtifact> {
        let text = if text.trim().is_empty() {
            warn!(placeholder = %self.placeholder, "empty synthesis text, using placeholder");
            self.placeholder.as_str()
        } else {
            text
        };

        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut last_error = anyhow!("no synthesis tier ran");
        for tier in TIERS {
            if let Err(e) = remove_stale(output) {
                warn!(?tier, error = %e, "could not clear previous output, skipping tier");
                last_error = e;
                continue;
            }

            match self.attempt(tier, text, output) {
                Ok(artifact) => {
                    info!(?tier, output = %output.display(), duration_secs = artifact.duration_secs, "synthesis succeeded");
                    return Ok(artifact);
                }
                Err(e) => {
                    warn!(?tier, error = %format!("{e:#}"), "synthesis tier failed");
                    last_error = e;
                }
            }
        }

        Err(VoxError::SynthesisExhausted(format!("{last_error:#}")))
    }

    fn attempt(&self, tier: VoiceTier, text: &str, output: &Path) -> anyhow::Result<AudioArtifact> {
        match tier {
            VoiceTier::Neural => {
                if self.neural.is_none() {
                    bail!("no neural voice configured");
                }
                let (samples, sample_rate) = self.neural_samples(text)?;
                write_wav_pcm16(output, &samples, sample_rate)?;
            }
            VoiceTier::Engine => {
                let Some(engine) = &self.engine else {
                    bail!("no speech engine configured");
                };
                debug!(engine = engine.name(), "rendering with speech engine");
                engine
                    .save_to_file(text, output)
                    .with_context(|| format!("engine {} failed", engine.name()))?;
            }
            VoiceTier::Tone => {
                write_wav_pcm16(output, &self.tone.samples(), self.tone.sample_rate)?;
            }
        }
        Ok(inspect_wav(output)?)
    }

    fn neural_samples(&self, text: &str) -> anyhow::Result<(Arc<Vec<f32>>, u32)> {
        if let Some(hit) = self.cache.lock().get(text) {
            debug!("voice cache hit");
            return Ok(hit);
        }

        let Some(neural) = &self.neural else {
            bail!("no neural voice configured");
        };
        let (samples, sample_rate) = {
            let mut voice = neural.lock();
            let raw = voice
                .synthesize(text)
                .with_context(|| format!("voice {} failed", voice.name()))?;
            (raw.into_mono(), voice.sample_rate())
        };
        if samples.is_empty() {
            bail!("voice returned no samples");
        }

        let samples = Arc::new(samples);
        self.cache
            .lock()
            .insert(text, Arc::clone(&samples), sample_rate);
        Ok((samples, sample_rate))
    }
}

fn remove_stale(path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed previous output");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingVoice {
        calls: Arc<AtomicUsize>,
        fail: bool,
        shape: fn() -> RawAudio,
    }

    impl NeuralVoice for CountingVoice {
        fn name(&self) -> &str {
            "counting"
        }

        fn sample_rate(&self) -> u32 {
            16000
        }

        fn synthesize(&mut self, _text: &str) -> anyhow::Result<RawAudio> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                bail!("onnx session poisoned");
            }
            Ok((self.shape)())
        }
    }

    fn chunked() -> RawAudio {
        RawAudio::Chunks(vec![vec![0.25; 800], vec![-0.25; 800]])
    }

    fn silent() -> RawAudio {
        RawAudio::Mono(Vec::new())
    }

    fn voice(fail: bool, shape: fn() -> RawAudio) -> (Box<dyn NeuralVoice>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(CountingVoice {
                calls: Arc::clone(&calls),
                fail,
                shape,
            }),
            calls,
        )
    }

    /// Writes whatever bytes it was given, standing in for an engine that
    /// may produce valid, truncated or missing output.
    struct BytesEngine(Option<Vec<u8>>);

    impl SpeechEngine for BytesEngine {
        fn name(&self) -> &str {
            "bytes"
        }

        fn save_to_file(&self, _text: &str, output: &Path) -> anyhow::Result<()> {
            match &self.0 {
                Some(bytes) => Ok(std::fs::write(output, bytes)?),
                None => bail!("engine unavailable"),
            }
        }
    }

    fn valid_wav_bytes(dir: &Path) -> Vec<u8> {
        let path = dir.join("engine-src.wav");
        write_wav_pcm16(&path, &vec![0.1; 4000], 8000).unwrap();
        std::fs::read(path).unwrap()
    }

    #[test]
    fn tone_is_the_last_resort() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reply.wav");
        let synth = Synthesizer::new("Hello", 8);

        let artifact = synth.synthesize("anything", &out).unwrap();
        assert_eq!(artifact.sample_rate, 22050);
        assert_eq!(artifact.channels, 1);
        assert!(std::fs::metadata(&out).unwrap().len() > 44);
    }

    #[test]
    fn empty_text_uses_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reply.wav");
        let (v, calls) = voice(false, chunked);
        let synth = Synthesizer::new("Hello", 8).with_neural(v);

        let artifact = synth.synthesize("   ", &out).unwrap();
        assert_eq!(artifact.sample_rate, 16000);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // The placeholder is now cached under its own text.
        synth.synthesize("Hello", &out).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn chunked_neural_output_is_flattened() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reply.wav");
        let (v, _) = voice(false, chunked);
        let synth = Synthesizer::new("Hello", 8).with_neural(v);

        let artifact = synth.synthesize("hi", &out).unwrap();
        assert!((artifact.duration_secs - 0.1).abs() < 1e-6);
        assert_eq!(artifact.channels, 1);
    }

    #[test]
    fn neural_failure_falls_back_to_engine() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reply.wav");
        let (v, calls) = voice(true, chunked);
        let synth = Synthesizer::new("Hello", 8)
            .with_neural(v)
            .with_engine(Box::new(BytesEngine(Some(valid_wav_bytes(dir.path())))));

        let artifact = synth.synthesize("hi", &out).unwrap();
        assert_eq!(artifact.sample_rate, 8000);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn silent_neural_output_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reply.wav");
        let (v, _) = voice(false, silent);
        let synth = Synthesizer::new("Hello", 8).with_neural(v);

        let artifact = synth.synthesize("hi", &out).unwrap();
        assert_eq!(artifact.sample_rate, 22050);
    }

    #[test]
    fn truncated_engine_output_falls_back_to_tone() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reply.wav");
        let synth =
            Synthesizer::new("Hello", 8).with_engine(Box::new(BytesEngine(Some(b"RIFF".to_vec()))));

        let artifact = synth.synthesize("hi", &out).unwrap();
        assert_eq!(artifact.sample_rate, 22050);
    }

    #[test]
    fn stale_output_never_passes_for_new_audio() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reply.wav");
        // A complete earlier reply sits at the target path.
        write_wav_pcm16(&out, &vec![0.3; 8000], 8000).unwrap();
        // The engine "succeeds" without writing anything.
        struct SilentEngine;
        impl SpeechEngine for SilentEngine {
            fn name(&self) -> &str {
                "silent"
            }
            fn save_to_file(&self, _text: &str, _output: &Path) -> anyhow::Result<()> {
                Ok(())
            }
        }
        let synth = Synthesizer::new("Hello", 8).with_engine(Box::new(SilentEngine));

        let artifact = synth.synthesize("hi", &out).unwrap();
        // Tone, not the stale 8 kHz file.
        assert_eq!(artifact.sample_rate, 22050);
    }

    #[test]
    fn repeated_text_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (v, calls) = voice(false, chunked);
        let synth = Synthesizer::new("Hello", 8).with_neural(v);

        synth.synthesize("good night", &dir.path().join("a.wav")).unwrap();
        synth.synthesize("good  night", &dir.path().join("b.wav")).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn warm_up_fills_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (v, calls) = voice(false, chunked);
        let synth = Synthesizer::new("Hello", 8).with_neural(v);

        let phrases = vec!["hello".to_string(), "thank you".to_string()];
        assert_eq!(synth.warm_up(&phrases), 2);
        synth.synthesize("thank you", &dir.path().join("a.wav")).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unwritable_target_exhausts_every_tier() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should go cannot be removed or written.
        let out = dir.path().join("reply.wav");
        std::fs::create_dir(&out).unwrap();
        let synth = Synthesizer::new("Hello", 8);

        let err = synth.synthesize("hi", &out).unwrap_err();
        assert!(matches!(err, VoxError::SynthesisExhausted(_)));
    }
}
