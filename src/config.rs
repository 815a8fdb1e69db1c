//! Configuração carregada de `voxrelay.toml`.
//!
//! [`VoxConfig`] reúne todos os parâmetros. Campos ausentes usam o valor
//! padrão e um arquivo ausente gera a configuração padrão. A variável de
//! ambiente `LLM_URL` tem precedência sobre o arquivo para o endpoint de
//! completion.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;

pub const DEFAULT_CONFIG_FILE: &str = "voxrelay.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VoxConfig {
    /// Number of pool workers executing jobs concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Directory holding uploaded chunks, converted audio and replies.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub conversion: ConversionConfig,

    #[serde(default)]
    pub transcription: TranscriptionConfig,

    #[serde(default)]
    pub synthesis: SynthesisConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

/// Completion service settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_url")]
    pub url: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Total attempts per completion, the first one included.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Whole-request timeout. Unset means wait as long as the service takes.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Transcoder settings for the conversion pipeline.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversionConfig {
    /// Explicit transcoder binary; looked up on PATH when unset.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
    #[serde(default = "default_tier_timeout_secs")]
    pub tier_timeout_secs: u64,
}

/// An external program plus its leading arguments.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandSpec {
    pub command: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Speech recognizer invoked as `command args... <audio.wav>`; the transcript
/// is read from stdout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TranscriptionConfig {
    #[serde(default)]
    pub recognizer: Option<CommandSpec>,
}

/// Neural voice emitting raw signed 16-bit mono PCM on stdout for text on stdin.
#[derive(Debug, Clone, Deserialize)]
pub struct NeuralVoiceConfig {
    #[serde(flatten)]
    pub spec: CommandSpec,
    #[serde(default = "default_neural_sample_rate")]
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisConfig {
    /// Text spoken when the request text is blank.
    #[serde(default = "default_placeholder_text")]
    pub placeholder_text: String,
    /// Entries kept by the neural sample cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Phrases pre-rendered into the cache at startup.
    #[serde(default)]
    pub warmup_phrases: Vec<String>,
    #[serde(default)]
    pub neural: Option<NeuralVoiceConfig>,
    /// Generic engine invoked as `command args... <out.wav> <text>`.
    #[serde(default)]
    pub engine: Option<CommandSpec>,
}

/// Job store housekeeping.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Age after which an unpolled terminal job is dropped.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_workers() -> usize {
    4
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_llm_url() -> String {
    "http://localhost:1234/v1/chat/completions".to_string()
}

fn default_llm_model() -> String {
    "gpt-oss-20b".to_string()
}

fn default_system_prompt() -> String {
    "You are a voice conversation assistant.".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

// Short replies keep the spoken answer quick.
fn default_max_tokens() -> u32 {
    500
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_tier_timeout_secs() -> u64 {
    30
}

fn default_neural_sample_rate() -> u32 {
    22050
}

fn default_placeholder_text() -> String {
    "Hello".to_string()
}

fn default_cache_capacity() -> usize {
    128
}

fn default_ttl_secs() -> u64 {
    600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            url: default_llm_url(),
            model: default_llm_model(),
            system_prompt: default_system_prompt(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            request_timeout_secs: None,
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            placeholder_text: default_placeholder_text(),
            cache_capacity: default_cache_capacity(),
            warmup_phrases: Vec::new(),
            neural: None,
            engine: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for VoxConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            artifact_dir: default_artifact_dir(),
            llm: LlmConfig::default(),
            conversion: ConversionConfig {
                ffmpeg_path: None,
                tier_timeout_secs: default_tier_timeout_secs(),
            },
            transcription: TranscriptionConfig::default(),
            synthesis: SynthesisConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl VoxConfig {
    /// Load `voxrelay.toml` from the current directory.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Load from `path`, using defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<VoxConfig>(&contents)?
        } else {
            Self::default()
        };

        // Environment wins over the file for the completion endpoint.
        if let Ok(url) = std::env::var("LLM_URL")
            && !url.is_empty()
        {
            config.llm.url = url;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(crate::error::VoxError::Config(
                "workers must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
