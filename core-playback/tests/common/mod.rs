//! Shared fixtures for core-playback integration tests.
//!
//! Frames use the PCM passthrough codec at 48kHz stereo with 960-sample
//! frames: 3840 bytes each, 50 frames per second. Frame `i` is filled with
//! byte `i`, so its index can be read back from any byte.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use core_async::sync::CancellationToken;
use core_playback::{
    DecoderProcess, FrameSink, PcmCodec, PcmStream, PlaybackError, ProcessExit, Result, Session,
    SessionBuilder, SessionOptions,
};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

pub const FPS: f32 = 50.0;

pub fn options() -> SessionOptions {
    SessionOptions {
        idle_backoff: Duration::from_millis(1),
        reap_timeout: Duration::from_millis(500),
        ..SessionOptions::default()
    }
}

pub fn frame_bytes() -> usize {
    options().frame_bytes()
}

/// Index encoded in a frame produced from [`pcm_frames`].
pub fn frame_index(frame: &Bytes) -> u8 {
    frame[0]
}

/// `count` frames of PCM, frame `i` filled with byte `i`.
pub fn pcm_frames(count: u8) -> Vec<u8> {
    (0..count)
        .flat_map(|i| std::iter::repeat(i).take(frame_bytes()))
        .collect()
}

// ============================================================================
// Scripted decoder process
// ============================================================================

/// Decoder stand-in. Either exits with a fixed code once its output is
/// drained, or keeps running until interrupted and then exits with 255.
#[derive(Clone)]
pub struct FakeDecoder {
    natural_exit: Option<i32>,
    pub interrupted: CancellationToken,
    pub interrupts: Arc<AtomicUsize>,
}

impl FakeDecoder {
    pub fn exits_with(code: i32) -> Self {
        Self {
            natural_exit: Some(code),
            interrupted: CancellationToken::new(),
            interrupts: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn until_interrupted() -> Self {
        Self {
            natural_exit: None,
            ..Self::exits_with(0)
        }
    }

    pub fn was_interrupted(&self) -> bool {
        self.interrupts.load(Ordering::SeqCst) > 0
    }
}

#[async_trait]
impl DecoderProcess for FakeDecoder {
    fn interrupt(&mut self) -> io::Result<bool> {
        self.interrupts.fetch_add(1, Ordering::SeqCst);
        self.interrupted.cancel();
        Ok(true)
    }

    fn kill(&mut self) -> io::Result<()> {
        self.interrupted.cancel();
        Ok(())
    }

    async fn wait(&mut self) -> io::Result<ProcessExit> {
        match self.natural_exit {
            Some(code) => Ok(ProcessExit { code: Some(code) }),
            None => {
                self.interrupted.cancelled().await;
                Ok(ProcessExit {
                    code: Some(ProcessExit::INTERRUPTED_CODE),
                })
            }
        }
    }
}

/// A PCM source preloaded with `count` frames.
///
/// With `keep_open` the writer half is returned so the stream does not end
/// and the encoder stays live.
pub async fn pcm_source(count: u8, keep_open: bool) -> (DuplexStream, Option<DuplexStream>) {
    let (mut writer, reader) = duplex(1 << 20);
    writer.write_all(&pcm_frames(count)).await.unwrap();
    if keep_open {
        (reader, Some(writer))
    } else {
        (reader, None)
    }
}

/// Start a session over a preloaded source with the PCM codec.
pub async fn start_session(
    options: SessionOptions,
    frames: u8,
    keep_open: bool,
    decoder: FakeDecoder,
    sink: impl FrameSink + 'static,
) -> (Session, Option<DuplexStream>) {
    let (reader, writer) = pcm_source(frames, keep_open).await;
    let session = SessionBuilder::new(options)
        .codec(PcmCodec)
        .start_with_stream(PcmStream::new(reader, decoder), sink)
        .unwrap();
    (session, writer)
}

// ============================================================================
// Gated sink
// ============================================================================

/// Sink that only accepts as many frames as it has been allowed.
#[derive(Clone)]
pub struct GatedSink {
    allowance: Arc<AtomicUsize>,
    out: mpsc::UnboundedSender<Bytes>,
}

impl GatedSink {
    pub fn new(allowance: usize) -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (out, rx) = mpsc::unbounded_channel();
        (
            Self {
                allowance: Arc::new(AtomicUsize::new(allowance)),
                out,
            },
            rx,
        )
    }

    pub fn allow(&self, frames: usize) {
        self.allowance.fetch_add(frames, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.allowance
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn deliver(&self, frame: Bytes) -> Result<()> {
        self.out.send(frame).map_err(|_| PlaybackError::SinkClosed)
    }
}

#[async_trait]
impl FrameSink for GatedSink {
    fn try_send(&mut self, frame: &Bytes) -> Result<bool> {
        if !self.take() {
            return Ok(false);
        }
        self.deliver(frame.clone())?;
        Ok(true)
    }

    async fn send(&mut self, frame: Bytes) -> Result<()> {
        while !self.take() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        self.deliver(frame)
    }
}

/// Poll `f` until it yields `Some`, failing the test after two seconds.
pub async fn eventually<T, F, Fut>(mut f: F) -> T
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if let Some(value) = f().await {
                return value;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time")
}
