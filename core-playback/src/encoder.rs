//! # Frame Encoder
//!
//! Producer half of a session. Runs as its own task: reads fixed-size PCM
//! windows from the decoder, compresses each with a [`FrameCodec`], charges
//! it against the cache budget and forwards it on a bounded channel.
//!
//! ```text
//! ┌──────────┐  s16le   ┌──────────────┐  frames (bounded)  ┌────────────┐
//! │  ffmpeg  ├─────────>│ FrameEncoder ├───────────────────>│ Dispatcher │
//! └────▲─────┘          └──────┬───────┘                    └─────┬──────┘
//!      │ SIGINT / reap         │ EncoderOutcome (once)            │
//!      └───────────────────────┴──────────────────────────────────┘
//! ```
//!
//! ## Termination
//!
//! - End of input (a trailing partial window is discarded) → `Done`.
//! - Stop token cancelled, or the frame receiver dropped → the decoder is
//!   interrupted and the encoder finishes as `Done`.
//! - Read error, codec error or cache overflow → the decoder is interrupted
//!   if still running and the encoder finishes as `Aborted`.
//!
//! Every path reaps the decoder. An interrupted decoder that does not exit
//! within the reap timeout is killed. Exit code 255 (or death by signal) is
//! only accepted when this encoder sent the interrupt; any other unexpected
//! exit aborts the encoder unless an earlier error is already reported.

use crate::codec::FrameCodec;
use crate::config::SessionOptions;
use crate::error::PlaybackError;
use crate::extract::{DecoderProcess, PcmStream, ProcessExit};
use bytes::Bytes;
use core_async::io::AsyncReadExt;
use core_async::sync::{mpsc, oneshot, CancellationToken};
use core_async::task::JoinHandle;
use core_async::time::{timeout, Duration};
use std::io;
use tracing::{debug, info, instrument, warn};

/// Terminal state of an encoder, reported exactly once.
#[derive(Debug)]
pub enum EncoderOutcome {
    /// Input ended or the encoder was stopped on request.
    Done {
        /// Frames forwarded to the dispatcher.
        frames: usize,
    },
    /// The encoder failed; the error is final for the session.
    Aborted(PlaybackError),
}

impl EncoderOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, EncoderOutcome::Done { .. })
    }
}

/// Why the read loop ended.
enum LoopExit {
    EndOfInput,
    Stopped,
    Failed(PlaybackError),
}

/// Compresses decoder output into frames.
pub struct FrameEncoder {
    session_id: String,
    codec: Box<dyn FrameCodec>,
    frame_bytes: usize,
    max_cache_bytes: usize,
    reap_timeout: Duration,
}

impl FrameEncoder {
    pub fn new(
        session_id: impl Into<String>,
        codec: Box<dyn FrameCodec>,
        options: &SessionOptions,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            codec,
            frame_bytes: options.frame_bytes(),
            max_cache_bytes: options.max_cache_bytes,
            reap_timeout: options.reap_timeout,
        }
    }

    /// Run the encoder on its own task.
    ///
    /// The returned receiver resolves with the encoder's outcome once the
    /// decoder has been reaped.
    pub fn spawn(
        self,
        stream: PcmStream,
        frames: mpsc::Sender<Bytes>,
        stop: CancellationToken,
    ) -> (oneshot::Receiver<EncoderOutcome>, JoinHandle<()>) {
        let (done_tx, done_rx) = oneshot::channel();
        let handle = core_async::spawn(async move {
            let outcome = self.run(stream, frames, stop).await;
            // Nobody is waiting if the dispatcher already exited.
            let _ = done_tx.send(outcome);
        });
        (done_rx, handle)
    }

    /// Encode until the input ends, `stop` is cancelled, or an error occurs.
    #[instrument(name = "encoder", skip_all, fields(session = %self.session_id, codec = self.codec.name()))]
    pub async fn run(
        mut self,
        stream: PcmStream,
        frames: mpsc::Sender<Bytes>,
        stop: CancellationToken,
    ) -> EncoderOutcome {
        let PcmStream {
            mut reader,
            mut process,
        } = stream;

        let mut window = vec![0u8; self.frame_bytes];
        let mut samples = vec![0i16; self.frame_bytes / 2];
        let mut cached_bytes = 0usize;
        let mut forwarded = 0usize;

        let exit = loop {
            if stop.is_cancelled() {
                break LoopExit::Stopped;
            }

            let read = core_async::select! {
                biased;
                _ = stop.cancelled() => break LoopExit::Stopped,
                read = reader.read_exact(&mut window) => read,
            };

            match read {
                Ok(_) => {}
                // Also covers a trailing partial window, which would play
                // at the wrong speed and is dropped.
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    break LoopExit::EndOfInput;
                }
                Err(e) => break LoopExit::Failed(PlaybackError::DecodeRead(e)),
            }

            for (sample, bytes) in samples.iter_mut().zip(window.chunks_exact(2)) {
                *sample = i16::from_le_bytes([bytes[0], bytes[1]]);
            }

            let frame = match self.codec.encode(&samples) {
                Ok(frame) => frame,
                Err(e) => break LoopExit::Failed(e),
            };

            if cached_bytes + frame.len() > self.max_cache_bytes {
                warn!(
                    cached_bytes,
                    budget = self.max_cache_bytes,
                    "Frame cache budget exceeded"
                );
                break LoopExit::Failed(PlaybackError::CacheOverflow {
                    budget: self.max_cache_bytes,
                });
            }
            cached_bytes += frame.len();

            core_async::select! {
                biased;
                _ = stop.cancelled() => break LoopExit::Stopped,
                sent = frames.send(frame) => {
                    if sent.is_err() {
                        debug!("Frame receiver dropped");
                        break LoopExit::Stopped;
                    }
                }
            }
            forwarded += 1;
        };

        // Close our end of the pipe so a decoder blocked on write notices.
        drop(reader);

        let (interrupted, mut error) = match exit {
            LoopExit::EndOfInput => {
                debug!(frames = forwarded, "Decoder output ended");
                (false, None)
            }
            LoopExit::Stopped => {
                info!(frames = forwarded, "Encoder stopped");
                (interrupt(process.as_mut()), None)
            }
            LoopExit::Failed(e) => {
                warn!(error = %e, "Encoder aborting");
                (interrupt(process.as_mut()), Some(e))
            }
        };

        match reap(process.as_mut(), self.reap_timeout).await {
            Ok(exit) if exit.success() => {}
            Ok(exit) if interrupted && exit.is_interrupted() => {
                debug!(code = ?exit.code, "Decoder exited after interrupt");
            }
            Ok(exit) => {
                warn!(code = ?exit.code, "Decoder exited unexpectedly");
                error.get_or_insert(PlaybackError::SubprocessExit { code: exit.code });
            }
            Err(e) => {
                warn!(error = %e, "Failed to reap decoder");
                error.get_or_insert(PlaybackError::Io(e));
            }
        }

        match error {
            Some(e) => EncoderOutcome::Aborted(e),
            None => {
                info!(frames = forwarded, bytes = cached_bytes, "Encoder finished");
                EncoderOutcome::Done { frames: forwarded }
            }
        }
    }
}

/// Wait for the decoder to exit, killing it if it is still running after
/// `reap_timeout`.
async fn reap(process: &mut dyn DecoderProcess, reap_timeout: Duration) -> io::Result<ProcessExit> {
    match timeout(reap_timeout, process.wait()).await {
        Ok(exit) => exit,
        Err(_) => {
            warn!(
                timeout_ms = reap_timeout.as_millis() as u64,
                "Decoder did not exit in time, killing it"
            );
            process.kill()?;
            process.wait().await
        }
    }
}

/// Send an interrupt, returning whether one was delivered.
fn interrupt(process: &mut dyn DecoderProcess) -> bool {
    match process.interrupt() {
        Ok(sent) => sent,
        Err(e) => {
            warn!(error = %e, "Failed to interrupt decoder");
            false
        }
    }
}
