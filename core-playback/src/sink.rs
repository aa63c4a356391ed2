//! # Frame Sinks
//!
//! Where the dispatcher delivers frames. The sink applies its own pacing
//! downstream; the dispatcher only needs to know whether a frame was
//! accepted right now ([`FrameSink::try_send`]) or to wait until it is
//! ([`FrameSink::send`]).
//!
//! [`ChannelSink`] hands frames to any task holding the matching receiver.
//! [`DcaWriter`] is such a task: it writes DCA0 framing (each frame prefixed
//! by its length as a little-endian `i16`) to any `AsyncWrite`.

use crate::error::{PlaybackError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use core_async::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use core_async::sync::mpsc;
use core_async::task::JoinHandle;
use tracing::{debug, warn};

/// Destination for emitted frames.
#[async_trait]
pub trait FrameSink: Send {
    /// Offer a frame without waiting.
    ///
    /// Returns `Ok(false)` when the sink is momentarily full; the caller
    /// keeps the frame and retries later.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::SinkClosed`] once the consumer has gone away.
    fn try_send(&mut self, frame: &Bytes) -> Result<bool>;

    /// Deliver a frame, waiting for room if necessary.
    async fn send(&mut self, frame: Bytes) -> Result<()>;
}

/// Sink backed by a bounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<Bytes>) -> Self {
        Self { sender }
    }

    /// Create a sink and the receiver its frames arrive on.
    pub fn channel(depth: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(depth);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    fn try_send(&mut self, frame: &Bytes) -> Result<bool> {
        match self.sender.try_send(frame.clone()) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => Ok(false),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(PlaybackError::SinkClosed),
        }
    }

    async fn send(&mut self, frame: Bytes) -> Result<()> {
        self.sender
            .send(frame)
            .await
            .map_err(|_| PlaybackError::SinkClosed)
    }
}

/// Writes frames in DCA0 framing.
pub struct DcaWriter;

impl DcaWriter {
    /// Spawn a writer task draining a new channel of `depth` frames into
    /// `writer`.
    ///
    /// The task ends when every [`ChannelSink`] clone is dropped, flushes,
    /// and resolves to the number of frames written.
    pub fn spawn<W>(writer: W, depth: usize) -> (ChannelSink, JoinHandle<Result<u64>>)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (sink, rx) = ChannelSink::channel(depth);
        let handle = core_async::spawn(Self::run(writer, rx));
        (sink, handle)
    }

    /// Drain `frames` into `writer` until the channel closes.
    pub async fn run<W>(writer: W, mut frames: mpsc::Receiver<Bytes>) -> Result<u64>
    where
        W: AsyncWrite + Send + Unpin,
    {
        let mut writer = BufWriter::new(writer);
        let mut written = 0u64;

        while let Some(frame) = frames.recv().await {
            let len = i16::try_from(frame.len()).map_err(|_| {
                warn!(len = frame.len(), "Frame too large for DCA framing");
                PlaybackError::Encode(format!(
                    "frame of {} bytes exceeds the DCA length prefix",
                    frame.len()
                ))
            })?;

            writer.write_all(&len.to_le_bytes()).await?;
            writer.write_all(&frame).await?;
            written += 1;
        }

        writer.flush().await?;
        debug!(frames = written, "DCA writer finished");
        Ok(written)
    }
}
