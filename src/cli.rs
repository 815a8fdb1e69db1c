//! Command-line interface built on clap.
//!
//! [`Cli`] carries the [`Command`] subcommands (transcribe, speak, chat,
//! convert, status) and global flags that override `voxrelay.toml`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// voxrelay: transcription, speech synthesis and LLM replies as async jobs.
#[derive(Debug, Parser)]
#[command(name = "voxrelay", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Config file to load instead of ./voxrelay.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of pool workers.
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Chat completions endpoint; wins over LLM_URL and the config file.
    #[arg(long, global = true)]
    pub llm_url: Option<String>,

    /// Debug-level logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Transcribe an audio file, converting it to WAV first when needed.
    Transcribe {
        file: PathBuf,

        /// Session id used to name the staged upload.
        #[arg(long)]
        session: Option<String>,
    },

    /// Synthesize speech for the given text.
    Speak {
        /// Text to speak; blank text speaks the placeholder.
        #[arg(default_value = "")]
        text: String,
    },

    /// Ask the language model for a reply.
    Chat { prompt: String },

    /// Convert a media file to 16 kHz mono WAV.
    Convert {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show which tools and backends are available.
    Status,
}
