use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};

use voxrelay::adapters::{CommandEngine, CommandRecognizer, CommandVoice, Synthesizer, Transcriber};
use voxrelay::audio::inspect_wav;
use voxrelay::cli::{Cli, Command};
use voxrelay::convert::{TRANSCODER, resolve_tool};
use voxrelay::llm::{ChatClient, Completer};
use voxrelay::ui::{JobProgress, status_line};
use voxrelay::{ArtifactStore, Backends, Converter, JobId, JobRequest, JobState, Orchestrator, VoxConfig};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise the verbose flag picks the level.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "voxrelay=debug".to_string()
        } else {
            "voxrelay=info".to_string()
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => VoxConfig::load_from(path),
        None => VoxConfig::load(),
    }
    .context("failed to load configuration")?;
    if let Some(workers) = cli.workers {
        config.workers = workers.max(1);
    }
    if let Some(url) = cli.llm_url {
        config.llm.url = url;
    }

    match cli.command {
        Command::Status => {
            print_status(&config);
            Ok(())
        }
        Command::Convert { input, output } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(convert(&config, &input, output))
        }
        command => {
            // Warm-up runs here, before the runtime exists, since it blocks.
            let backends = build_backends(&config)?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(run_job(config, backends, command))
        }
    }
}

fn build_backends(config: &VoxConfig) -> Result<Backends<ChatClient>> {
    let converter = match Converter::locate(&config.conversion) {
        Ok(converter) => Some(converter),
        Err(e) => {
            warn!(error = %e, "conversion disabled");
            None
        }
    };

    let transcriber = match &config.transcription.recognizer {
        Some(spec) => Transcriber::new(Arc::new(CommandRecognizer::new(spec.clone()))),
        None => Transcriber::unconfigured(),
    };

    let synthesis = &config.synthesis;
    let mut synthesizer = Synthesizer::new(&synthesis.placeholder_text, synthesis.cache_capacity);
    if let Some(neural) = &synthesis.neural {
        synthesizer = synthesizer.with_neural(Box::new(CommandVoice::new(neural.clone())));
    }
    if let Some(engine) = &synthesis.engine {
        synthesizer = synthesizer.with_engine(Box::new(CommandEngine::new(engine.clone())));
    }
    synthesizer.warm_up(&synthesis.warmup_phrases);

    let client = ChatClient::new(&config.llm).context("failed to build HTTP client")?;
    Ok(Backends {
        converter,
        transcriber,
        synthesizer,
        completer: Completer::new(client, &config.llm),
    })
}

async fn run_job(config: VoxConfig, backends: Backends<ChatClient>, command: Command) -> Result<()> {
    let orchestrator = Orchestrator::new(
        config.workers,
        backends,
        ArtifactStore::new(&config.artifact_dir),
        &config.store,
    )?;

    let (label, id) = match command {
        Command::Transcribe { file, session } => {
            (format!("transcribe {}", file.display()), submit_transcription(&orchestrator, &file, session)?)
        }
        Command::Speak { text } => (
            "speak".to_string(),
            orchestrator.submit(JobRequest::Synthesize { text })?,
        ),
        Command::Chat { prompt } => (
            "chat".to_string(),
            orchestrator.submit(JobRequest::Complete { prompt })?,
        ),
        Command::Status | Command::Convert { .. } => bail!("not a job command"),
    };

    let progress = JobProgress::start(&label);
    let snapshot = orchestrator
        .wait_with(&id, POLL_INTERVAL, |s| progress.update(s))
        .await?;
    progress.finish(&snapshot);
    orchestrator.shutdown().await;

    if snapshot.status == JobState::Failed {
        bail!("job {id} failed");
    }
    Ok(())
}

/// WAV files go straight to the recognizer; anything else is staged and
/// converted first.
fn submit_transcription(
    orchestrator: &Orchestrator<ChatClient>,
    file: &Path,
    session: Option<String>,
) -> Result<JobId> {
    if inspect_wav(file).is_ok() {
        return Ok(orchestrator.submit(JobRequest::Transcribe {
            audio: file.to_path_buf(),
        })?);
    }

    let bytes = std::fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let session = session.unwrap_or_else(|| JobId::new().to_string());
    let extension = file.extension().and_then(|e| e.to_str());
    Ok(orchestrator.submit_upload(&session, extension, &bytes)?)
}

async fn convert(config: &VoxConfig, input: &Path, output: Option<PathBuf>) -> Result<()> {
    let converter = Converter::locate(&config.conversion)?;
    let output = output.unwrap_or_else(|| default_output(input));
    if output == input {
        bail!("output would overwrite the input: {}", input.display());
    }

    let progress = JobProgress::start(&format!("convert {}", input.display()));
    let result = converter.convert(input, &output).await;
    progress.clear();
    let written = result?;
    info!(output = %written.display(), "converted");
    println!("{}", written.display());
    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "converted".to_string());
    input.with_file_name(format!("{stem}_16k.wav"))
}

fn print_status(config: &VoxConfig) {
    println!("voxrelay {}", env!("CARGO_PKG_VERSION"));

    match resolve_tool(TRANSCODER, config.conversion.ffmpeg_path.as_deref()) {
        Ok(path) => status_line("transcoder", true, &path.display().to_string()),
        Err(e) => status_line("transcoder", false, &e.to_string()),
    }

    let command_line = |label: &str, command: Option<&Path>| match command {
        Some(command) => {
            let found = which::which(command).is_ok();
            status_line(label, found, &command.display().to_string());
        }
        None => status_line(label, false, "not configured"),
    };
    command_line(
        "recognizer",
        config.transcription.recognizer.as_ref().map(|s| s.command.as_path()),
    );
    command_line(
        "voice",
        config.synthesis.neural.as_ref().map(|n| n.spec.command.as_path()),
    );
    command_line(
        "engine",
        config.synthesis.engine.as_ref().map(|s| s.command.as_path()),
    );
    status_line("tone", true, "always available");
    status_line("llm", true, &format!("{} ({})", config.llm.url, config.llm.model));
    status_line("workers", true, &config.workers.to_string());
}
