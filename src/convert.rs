//! Conversion pipeline: normalize an arbitrary uploaded media blob into
//! 16 kHz mono WAV by running the external transcoder through a fixed list
//! of parameter tiers, strictest first.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::ConversionConfig;
use crate::error::{Result, VoxError};

pub const TRANSCODER: &str = "ffmpeg";

/// One parameter set handed to the transcoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionTier {
    pub name: &'static str,
    pub codec: &'static str,
    pub sample_rate: u32,
    pub channels: u16,
    /// Extra flags placed after the codec/rate/channel flags.
    pub extra_args: &'static [&'static str],
}

impl ConversionTier {
    // Paths go through as OS strings so non-UTF-8 names survive.
    fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-i".into(), input.into()];
        let sample_rate = self.sample_rate.to_string();
        let channels = self.channels.to_string();
        let fixed = [
            "-f",
            "wav",
            "-acodec",
            self.codec,
            "-ar",
            sample_rate.as_str(),
            "-ac",
            channels.as_str(),
        ];
        args.extend(fixed.iter().chain(self.extra_args).map(OsString::from));
        args.push("-y".into());
        args.push(output.into());
        args
    }
}

/// Strict timestamp repair first, then plain PCM16, then 8-bit PCM.
pub const DEFAULT_TIERS: &[ConversionTier] = &[
    ConversionTier {
        name: "strict",
        codec: "pcm_s16le",
        sample_rate: 16000,
        channels: 1,
        extra_args: &[
            "-avoid_negative_ts",
            "make_zero",
            "-fflags",
            "+genpts",
            "-max_muxing_queue_size",
            "1024",
        ],
    },
    ConversionTier {
        name: "permissive",
        codec: "pcm_s16le",
        sample_rate: 16000,
        channels: 1,
        extra_args: &[],
    },
    ConversionTier {
        name: "pcm_u8",
        codec: "pcm_u8",
        sample_rate: 16000,
        channels: 1,
        extra_args: &[],
    },
];

/// Why a single tier did not produce output.
enum AttemptError {
    /// Stop the whole pipeline.
    Fatal(VoxError),
    /// Move on to the next tier.
    Tier(String),
}

/// Find `name`, preferring an explicit override when that path exists.
pub fn resolve_tool(name: &str, override_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        warn!(tool = name, path = %path.display(), "configured tool path missing, searching PATH");
    }
    which::which(name).map_err(|_| VoxError::ToolMissing {
        tool: name.to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct Converter {
    program: PathBuf,
    tier_timeout: Duration,
    tiers: Vec<ConversionTier>,
}

impl Converter {
    pub fn new(program: PathBuf, tier_timeout: Duration) -> Self {
        Self {
            program,
            tier_timeout,
            tiers: DEFAULT_TIERS.to_vec(),
        }
    }

    /// Locate the transcoder from config or PATH.
    pub fn locate(config: &ConversionConfig) -> Result<Self> {
        let program = resolve_tool(TRANSCODER, config.ffmpeg_path.as_deref())?;
        Ok(Self::new(
            program,
            Duration::from_secs(config.tier_timeout_secs),
        ))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn tiers(&self) -> &[ConversionTier] {
        &self.tiers
    }

    /// Convert `input` into a WAV at `output`, returning `output`.
    ///
    /// Stops at the first tier that leaves a non-empty file. A missing
    /// transcoder aborts immediately; any other tier failure, timeouts
    /// included, moves on to the next tier.
    pub async fn convert(&self, input: &Path, output: &Path) -> Result<PathBuf> {
        validate_input(input)?;

        let mut last_error = String::from("no conversion tiers configured");
        for tier in &self.tiers {
            remove_stale(output)?;
            debug!(tier = tier.name, input = %input.display(), "trying conversion tier");

            match self.attempt(tier, input, output).await {
                Ok(size) => {
                    info!(tier = tier.name, output = %output.display(), size, "conversion succeeded");
                    return Ok(output.to_path_buf());
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
                Err(AttemptError::Tier(message)) => {
                    warn!(tier = tier.name, error = %message, "conversion tier failed");
                    last_error = format!("tier {}: {message}", tier.name);
                }
            }
        }

        // Never leave a partial file behind.
        remove_stale(output)?;
        Err(VoxError::ConversionFailed {
            input: input.to_path_buf(),
            last_error,
        })
    }

    async fn attempt(
        &self,
        tier: &ConversionTier,
        input: &Path,
        output: &Path,
    ) -> std::result::Result<u64, AttemptError> {
        let child = Command::new(&self.program)
            .args(tier.args(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AttemptError::Fatal(VoxError::ToolMissing {
                        tool: self.program.display().to_string(),
                    })
                } else {
                    AttemptError::Tier(format!("failed to spawn: {e}"))
                }
            })?;

        // Dropping the timed-out future drops the child, which kills it.
        let output_result = tokio::time::timeout(self.tier_timeout, child.wait_with_output())
            .await
            .map_err(|_| AttemptError::Tier(format!("timed out after {:?}", self.tier_timeout)))?
            .map_err(|e| AttemptError::Tier(format!("I/O error waiting for process: {e}")))?;

        if !output_result.status.success() {
            let stderr = String::from_utf8_lossy(&output_result.stderr);
            return Err(AttemptError::Tier(format!(
                "exited with status {}: {}",
                output_result.status,
                stderr.trim()
            )));
        }

        match std::fs::metadata(output) {
            Ok(meta) if meta.len() > 0 => Ok(meta.len()),
            Ok(_) => Err(AttemptError::Tier("output file is empty".into())),
            Err(_) => Err(AttemptError::Tier("output file was not created".into())),
        }
    }
}

fn validate_input(input: &Path) -> Result<()> {
    let meta = std::fs::metadata(input)
        .map_err(|_| VoxError::InputInvalid(format!("{} does not exist", input.display())))?;
    if !meta.is_file() {
        return Err(VoxError::InputInvalid(format!(
            "{} is not a file",
            input.display()
        )));
    }
    if meta.len() == 0 {
        return Err(VoxError::InputInvalid(format!(
            "{} is empty",
            input.display()
        )));
    }
    Ok(())
}

fn remove_stale(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_input(dir: &Path) -> PathBuf {
        let input = dir.join("chunk.webm");
        std::fs::write(&input, b"not really webm").unwrap();
        input
    }

    #[test]
    fn tiers_go_from_strict_to_alternate_codec() {
        let names: Vec<_> = DEFAULT_TIERS.iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["strict", "permissive", "pcm_u8"]);

        let args = DEFAULT_TIERS[0].args(Path::new("in.webm"), Path::new("out.wav"));
        assert_eq!(&args[..2], &["-i", "in.webm"]);
        assert!(args.windows(2).any(|w| w == ["-ar", "16000"]));
        assert!(args.windows(2).any(|w| w == ["-ac", "1"]));
        assert!(args.windows(2).any(|w| w == ["-fflags", "+genpts"]));
        assert_eq!(args.last().and_then(|a| a.to_str()), Some("out.wav"));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_paths_pass_through_unchanged() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let input = Path::new(OsStr::from_bytes(b"clip\xff.webm"));
        let output = Path::new(OsStr::from_bytes(b"out\xfe.wav"));
        let args = DEFAULT_TIERS[1].args(input, output);
        assert_eq!(args[1].as_os_str(), input.as_os_str());
        assert_eq!(args.last().map(OsString::as_os_str), Some(output.as_os_str()));
    }

    #[tokio::test]
    async fn missing_input_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let converter = Converter::new(PathBuf::from("ffmpeg"), Duration::from_secs(1));
        let err = converter
            .convert(&dir.path().join("absent.webm"), &dir.path().join("out.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, VoxError::InputInvalid(_)));
    }

    #[tokio::test]
    async fn empty_input_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("empty.webm");
        std::fs::write(&input, b"").unwrap();
        let converter = Converter::new(PathBuf::from("ffmpeg"), Duration::from_secs(1));
        let err = converter
            .convert(&input, &dir.path().join("out.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, VoxError::InputInvalid(_)));
    }

    #[tokio::test]
    async fn absent_transcoder_is_tool_missing() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_input(dir.path());
        let converter = Converter::new(
            PathBuf::from("/nonexistent/bin/ffmpeg-xyz"),
            Duration::from_secs(1),
        );
        let err = converter
            .convert(&input, &dir.path().join("out.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, VoxError::ToolMissing { .. }));
    }

    #[test]
    fn resolve_unknown_tool_is_tool_missing() {
        let err = resolve_tool("voxrelay-no-such-tool-12345", None).unwrap_err();
        assert!(matches!(err, VoxError::ToolMissing { ref tool } if tool == "voxrelay-no-such-tool-12345"));
    }

    #[cfg(unix)]
    mod fake_transcoder {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Install a shell script standing in for the transcoder. Every call
        /// appends one line to `calls.log` next to it.
        fn install(dir: &Path, body: &str) -> PathBuf {
            let script = dir.join("fake-ffmpeg");
            let contents = format!(
                "#!/bin/sh\necho call >> \"$(dirname \"$0\")/calls.log\"\nfor arg in \"$@\"; do out=\"$arg\"; done\n{body}\n"
            );
            std::fs::write(&script, contents).unwrap();
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
            script
        }

        fn calls(dir: &Path) -> usize {
            std::fs::read_to_string(dir.join("calls.log"))
                .map(|s| s.lines().count())
                .unwrap_or(0)
        }

        #[tokio::test]
        async fn first_tier_success_stops_the_chain() {
            let dir = tempfile::tempdir().unwrap();
            let input = write_input(dir.path());
            let output = dir.path().join("out.wav");
            let script = install(dir.path(), "printf 'RIFFWAVE' > \"$out\"\nexit 0");

            let converter = Converter::new(script, Duration::from_secs(5));
            let path = converter.convert(&input, &output).await.unwrap();
            assert_eq!(path, output);
            assert_eq!(std::fs::read(&output).unwrap(), b"RIFFWAVE");
            assert_eq!(calls(dir.path()), 1);
        }

        #[tokio::test]
        async fn falls_back_to_alternate_codec() {
            let dir = tempfile::tempdir().unwrap();
            let input = write_input(dir.path());
            let output = dir.path().join("out.wav");
            let script = install(
                dir.path(),
                "case \"$*\" in *pcm_u8*) printf 'U8WAV' > \"$out\"; exit 0;; esac\necho 'Unknown encoder' >&2\nexit 1",
            );

            let converter = Converter::new(script, Duration::from_secs(5));
            converter.convert(&input, &output).await.unwrap();
            assert_eq!(std::fs::read(&output).unwrap(), b"U8WAV");
            assert_eq!(calls(dir.path()), 3);
        }

        #[tokio::test]
        async fn timeout_moves_to_next_tier() {
            let dir = tempfile::tempdir().unwrap();
            let input = write_input(dir.path());
            let output = dir.path().join("out.wav");
            let script = install(
                dir.path(),
                "case \"$*\" in *genpts*) sleep 5;; esac\nprintf 'OK' > \"$out\"",
            );

            let converter = Converter::new(script, Duration::from_millis(300));
            converter.convert(&input, &output).await.unwrap();
            assert_eq!(std::fs::read(&output).unwrap(), b"OK");
            assert_eq!(calls(dir.path()), 2);
        }

        #[tokio::test]
        async fn empty_output_is_never_returned() {
            let dir = tempfile::tempdir().unwrap();
            let input = write_input(dir.path());
            let output = dir.path().join("out.wav");
            let script = install(dir.path(), ": > \"$out\"\nexit 0");

            let converter = Converter::new(script, Duration::from_secs(5));
            let err = converter.convert(&input, &output).await.unwrap_err();
            match err {
                VoxError::ConversionFailed { last_error, .. } => {
                    assert!(last_error.contains("pcm_u8"));
                    assert!(last_error.contains("empty"));
                }
                other => panic!("expected ConversionFailed, got {other:?}"),
            }
            assert!(!output.exists());
            assert_eq!(calls(dir.path()), 3);
        }

        #[tokio::test]
        async fn stale_output_is_replaced() {
            let dir = tempfile::tempdir().unwrap();
            let input = write_input(dir.path());
            let output = dir.path().join("out.wav");
            std::fs::write(&output, b"stale content from an earlier call").unwrap();
            // Succeeds without writing: only a leftover file could make it look non-empty.
            let script = install(dir.path(), "exit 0");

            let converter = Converter::new(script, Duration::from_secs(5));
            let err = converter.convert(&input, &output).await.unwrap_err();
            assert!(matches!(err, VoxError::ConversionFailed { .. }));
            assert!(!output.exists());
        }
    }
}
