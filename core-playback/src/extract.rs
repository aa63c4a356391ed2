//! # PCM Extraction
//!
//! Starts an ffmpeg subprocess that decodes any input it understands (local
//! file or http(s) URL) into raw signed 16-bit little-endian interleaved
//! samples on its stdout.
//!
//! The caller owns the returned [`PcmStream`]: the reader half is consumed
//! by the frame encoder and the process half must be reaped with
//! [`DecoderProcess::wait`] once reading stops. Processes are spawned
//! kill-on-drop, so dropping an unreaped stream still terminates the child.

use crate::config::PcmOptions;
use crate::error::{PlaybackError, Result};
use async_trait::async_trait;
use core_async::io::AsyncRead;
use core_async::process::{self, Child, Command, Stdio};
use core_runtime::logging::redact_locator;
use std::fmt;
use std::io;
use tracing::{debug, info};

/// Exit status of a reaped decoder process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, or `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    /// ffmpeg exits with 255 after handling SIGINT.
    pub const INTERRUPTED_CODE: i32 = 255;

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Whether this is how a decoder exits after [`DecoderProcess::interrupt`].
    pub fn is_interrupted(&self) -> bool {
        matches!(self.code, Some(Self::INTERRUPTED_CODE) | None)
    }
}

/// Control over a running decoder process.
///
/// Implemented by [`FfmpegProcess`]; tests substitute scripted fakes.
#[async_trait]
pub trait DecoderProcess: Send {
    /// Ask the process to stop gracefully.
    ///
    /// Returns `false` if the process had already been reaped.
    fn interrupt(&mut self) -> io::Result<bool>;

    /// Force the process to stop.
    fn kill(&mut self) -> io::Result<()>;

    /// Wait for the process to exit. Must be safe to cancel and call again.
    async fn wait(&mut self) -> io::Result<ProcessExit>;
}

/// A decoder subprocess started by [`launch`].
pub struct FfmpegProcess {
    child: Child,
}

impl FfmpegProcess {
    /// OS process id, while the process has not been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

#[async_trait]
impl DecoderProcess for FfmpegProcess {
    fn interrupt(&mut self) -> io::Result<bool> {
        process::interrupt(&mut self.child)
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    async fn wait(&mut self) -> io::Result<ProcessExit> {
        let status = self.child.wait().await?;
        Ok(ProcessExit {
            code: status.code(),
        })
    }
}

impl fmt::Debug for FfmpegProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfmpegProcess")
            .field("pid", &self.child.id())
            .finish()
    }
}

/// Raw PCM output of a decoder together with the process producing it.
pub struct PcmStream {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub process: Box<dyn DecoderProcess>,
}

impl PcmStream {
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        process: impl DecoderProcess + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            process: Box::new(process),
        }
    }
}

impl fmt::Debug for PcmStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcmStream").finish_non_exhaustive()
    }
}

/// Build the ffmpeg argument list for `input`.
///
/// Video, subtitle and data streams are disabled. Seek and duration flags
/// are only added when non-zero, with five decimals of precision.
pub fn build_ffmpeg_args(input: &str, options: &PcmOptions) -> Vec<String> {
    let mut args: Vec<String> = ["-vn", "-sn", "-dn"].iter().map(|s| s.to_string()).collect();

    if options.seek != 0.0 {
        args.push("-accurate_seek".to_string());
        args.push("-ss".to_string());
        args.push(format!("{:.5}", options.seek));
    }

    if options.duration != 0.0 {
        args.push("-t".to_string());
        args.push(format!("{:.5}", options.duration));
    }

    args.extend([
        "-i".to_string(),
        input.to_string(),
        "-f".to_string(),
        "s16le".to_string(),
        "-ar".to_string(),
        options.sample_rate.to_string(),
        "-ac".to_string(),
        options.channels.to_string(),
        "pipe:1".to_string(),
    ]);

    args
}

/// Start a decoder for `input` and attach to its stdout.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns [`PlaybackError::Launch`] if `input` is empty, the binary cannot
/// be spawned, or its stdout cannot be captured.
pub fn launch(input: &str, options: &PcmOptions) -> Result<PcmStream> {
    if input.trim().is_empty() {
        return Err(PlaybackError::Launch("input locator is empty".to_string()));
    }

    let args = build_ffmpeg_args(input, options);
    debug!(ffmpeg = %options.ffmpeg_path, argc = args.len(), "Spawning decoder");

    let mut child = Command::new(&options.ffmpeg_path)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PlaybackError::Launch(format!("{}: {}", options.ffmpeg_path, e)))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| PlaybackError::Launch("decoder stdout was not captured".to_string()))?;

    info!(
        input = %redact_locator(input),
        pid = ?child.id(),
        seek = options.seek,
        duration = options.duration,
        "Decoder started"
    );

    Ok(PcmStream::new(stdout, FfmpegProcess { child }))
}

/// Check that `program` can be run, by invoking it with `-version`.
pub async fn decoder_available(program: &str) -> bool {
    match Command::new(program)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        Ok(status) => status.success(),
        Err(_) => false,
    }
}
