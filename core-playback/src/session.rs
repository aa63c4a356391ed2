//! # Playback Sessions
//!
//! Wires one input through the pipeline and hands back a [`SessionHandle`]
//! for the controller.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use core_playback::{ChannelSink, SessionBuilder, SessionOptions};
//!
//! # async fn example() -> core_playback::Result<()> {
//! let (sink, mut frames) = ChannelSink::channel(16);
//! let session = SessionBuilder::new(SessionOptions::default().with_seek(30.0))
//!     .start("https://example.com/track.webm", sink)?;
//!
//! let handle = session.handle();
//! tokio::spawn(async move {
//!     while let Some(frame) = frames.recv().await {
//!         // hand the frame to the transport
//!         let _ = frame;
//!     }
//! });
//!
//! handle.pause().await?;
//! println!("at {}s", handle.playback_time().await?);
//! handle.resume().await?;
//!
//! let report = session.wait().await?;
//! println!("{:?}", report.end);
//! # Ok(())
//! # }
//! ```

use crate::codec::{default_codec, FrameCodec};
use crate::config::{SessionOptions, SessionState};
use crate::dispatcher::{Dispatcher, DispatcherChannels, SessionReport};
use crate::encoder::FrameEncoder;
use crate::error::{PlaybackError, Result};
use crate::extract::{self, PcmStream};
use crate::protocol::{Command, Request, Response};
use crate::sink::FrameSink;
use core_async::sync::{mpsc, watch, CancellationToken};
use core_async::task::JoinHandle;
use core_async::time::{timeout, Duration};
use core_runtime::events::{EventBus, SessionEvent};
use core_runtime::logging::redact_locator;
use std::fmt;
use tracing::info;
use uuid::Uuid;

/// Configures and starts a [`Session`].
pub struct SessionBuilder {
    options: SessionOptions,
    codec: Option<Box<dyn FrameCodec>>,
    events: Option<EventBus>,
    id: Option<String>,
}

impl SessionBuilder {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            codec: None,
            events: None,
            id: None,
        }
    }

    /// Use `codec` instead of [`default_codec`].
    pub fn codec(mut self, codec: impl FrameCodec + 'static) -> Self {
        self.codec = Some(Box::new(codec));
        self
    }

    /// Publish lifecycle events on `bus`.
    pub fn events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    /// Override the generated session id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Launch the decoder for `input` and start streaming into `sink`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self, input: &str, sink: impl FrameSink + 'static) -> Result<Session> {
        self.options.validate()?;
        let stream = extract::launch(input, &self.options.pcm)?;
        self.spawn(stream, sink, redact_locator(input))
    }

    /// Start streaming from an already running decoder.
    pub fn start_with_stream(
        self,
        stream: PcmStream,
        sink: impl FrameSink + 'static,
    ) -> Result<Session> {
        self.options.validate()?;
        self.spawn(stream, sink, "<stream>".to_string())
    }

    fn spawn(
        self,
        stream: PcmStream,
        sink: impl FrameSink + 'static,
        input_label: String,
    ) -> Result<Session> {
        let SessionBuilder {
            options,
            codec,
            events,
            id,
        } = self;

        let id = id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let codec = match codec {
            Some(codec) => codec,
            None => default_codec(&options)?,
        };

        let (frames_tx, frames_rx) = mpsc::channel(options.frame_queue_depth);
        let (commands_tx, commands_rx) = mpsc::channel(options.command_queue_depth);
        let (state_tx, state_rx) = watch::channel(SessionState::Starting);
        let stop = CancellationToken::new();

        let encoder = FrameEncoder::new(id.clone(), codec, &options);
        let (outcome_rx, _encoder_task) = encoder.spawn(stream, frames_tx, stop.clone());

        if let Some(bus) = &events {
            let _ = bus.emit(SessionEvent::Started {
                session_id: id.clone(),
                input: input_label.clone(),
            });
        }

        let dispatcher = Dispatcher::new(
            id.clone(),
            &options,
            DispatcherChannels {
                frames: frames_rx,
                outcome: outcome_rx,
                commands: commands_rx,
                stop,
                state: state_tx,
            },
            Box::new(sink),
            events,
        );
        let task = core_async::spawn(dispatcher.run());

        info!(session = %id, input = %input_label, "Session started");

        Ok(Session {
            handle: SessionHandle {
                id,
                commands: commands_tx,
                state: state_rx,
                query_timeout: options.query_timeout,
            },
            task,
        })
    }
}

/// A running session: its controller handle plus the dispatcher task.
pub struct Session {
    handle: SessionHandle,
    task: JoinHandle<Result<SessionReport>>,
}

impl Session {
    /// Start a session with default codec and no event bus.
    pub fn start(
        input: &str,
        options: SessionOptions,
        sink: impl FrameSink + 'static,
    ) -> Result<Session> {
        SessionBuilder::new(options).start(input, sink)
    }

    pub fn id(&self) -> &str {
        &self.handle.id
    }

    /// A controller handle. Handles are cheap to clone.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Wait for the session to end.
    pub async fn wait(self) -> Result<SessionReport> {
        self.task.await.map_err(|e| {
            PlaybackError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("dispatcher task failed: {}", e),
            ))
        })?
    }

    pub fn into_parts(self) -> (SessionHandle, JoinHandle<Result<SessionReport>>) {
        (self.handle, self.task)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.handle.id)
            .field("state", &self.handle.state())
            .finish()
    }
}

/// Controller side of a session.
///
/// Every method fails with [`PlaybackError::SessionEnded`] once the session
/// has stopped accepting commands.
#[derive(Clone)]
pub struct SessionHandle {
    id: String,
    commands: mpsc::Sender<Request>,
    state: watch::Receiver<SessionState>,
    query_timeout: Option<Duration>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Latest state published by the dispatcher.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Returns `true` once the session no longer accepts commands.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Wait until the session reaches a terminal state.
    pub async fn ended(&self) -> SessionState {
        let mut state = self.state.clone();
        let ended = match state.wait_for(|s| s.is_terminal()).await {
            Ok(s) => *s,
            // The dispatcher is gone without publishing an end state.
            Err(_) => SessionState::Failed,
        };
        ended
    }

    pub async fn stop(&self) -> Result<()> {
        self.command(Command::Stop).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.command(Command::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.command(Command::Resume).await
    }

    pub async fn start_loop(&self) -> Result<()> {
        self.command(Command::StartLoop).await
    }

    pub async fn stop_loop(&self) -> Result<()> {
        self.command(Command::StopLoop).await
    }

    /// Move playback to `secs` seconds into the track.
    pub async fn seek(&self, secs: f32) -> Result<()> {
        self.command(Command::Seek(secs)).await
    }

    /// Seconds of audio before the read cursor.
    pub async fn playback_time(&self) -> Result<f32> {
        match self.request(Command::GetPlaybackTime).await? {
            Some(Response::PlaybackTime(secs)) => Ok(secs),
            other => Err(unexpected("PlaybackTime", other)),
        }
    }

    /// Total cached length, or `None` while the encoder is still running.
    pub async fn duration(&self) -> Result<Option<f32>> {
        match self.request(Command::GetDuration).await? {
            Some(Response::Duration(secs)) => Ok(Some(secs)),
            Some(Response::DurationUnknown) => Ok(None),
            other => Err(unexpected("Duration", other)),
        }
    }

    /// Send any command. Queries wait for and return their reply.
    ///
    /// # Errors
    ///
    /// [`PlaybackError::SessionEnded`] once the session is gone, or
    /// [`PlaybackError::QueryTimeout`] if the configured query timeout
    /// elapses first.
    pub async fn request(&self, command: Command) -> Result<Option<Response>> {
        if !command.is_query() {
            self.command(command).await?;
            return Ok(None);
        }

        let (request, reply) = Request::query(command);
        self.submit(request).await?;

        let response = match self.query_timeout {
            Some(limit) => timeout(limit, reply).await.map_err(|_| {
                PlaybackError::QueryTimeout {
                    command: command.name(),
                    timeout_ms: limit.as_millis() as u64,
                }
            })?,
            None => reply.await,
        };
        response.map(Some).map_err(|_| PlaybackError::SessionEnded)
    }

    /// Queue a prepared request without waiting for its reply.
    pub async fn submit(&self, request: Request) -> Result<()> {
        self.commands
            .send(request)
            .await
            .map_err(|_| PlaybackError::SessionEnded)
    }

    async fn command(&self, command: Command) -> Result<()> {
        self.submit(Request::command(command)).await
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn unexpected(expected: &'static str, received: Option<Response>) -> PlaybackError {
    PlaybackError::InvalidCommandResponse {
        expected,
        received: match received {
            Some(response) => response.to_string(),
            None => "no response".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_response_error() {
        let err = unexpected("Duration", Some(Response::PlaybackTime(1.5)));
        assert!(matches!(
            &err,
            PlaybackError::InvalidCommandResponse { expected: "Duration", received }
                if received == "PlaybackTime(1.5)"
        ));
        assert!(!err.is_fatal());

        let err = unexpected("PlaybackTime", None);
        assert!(err.to_string().contains("no response"));
    }

    #[tokio::test]
    async fn test_mismatched_reply_is_reported() {
        let (commands, mut rx) = mpsc::channel(4);
        let (_state_tx, state) = watch::channel(SessionState::Streaming);
        let handle = SessionHandle {
            id: "fake".to_string(),
            commands,
            state,
            query_timeout: None,
        };

        let responder = tokio::spawn(async move {
            let request: Request = rx.recv().await.unwrap();
            request.respond(Response::DurationUnknown);
        });

        let err = handle.playback_time().await.unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidCommandResponse { .. }));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_query_timeout_is_reported() {
        let (commands, _rx) = mpsc::channel(4);
        let (_state_tx, state) = watch::channel(SessionState::Streaming);
        let handle = SessionHandle {
            id: "silent".to_string(),
            commands,
            state,
            query_timeout: Some(Duration::from_millis(20)),
        };

        let err = handle.duration().await.unwrap_err();
        assert!(matches!(
            err,
            PlaybackError::QueryTimeout {
                command: "GetDuration",
                timeout_ms: 20
            }
        ));
        assert!(!err.is_session_ended());
    }

    #[tokio::test]
    async fn test_closed_session_rejects_commands() {
        let (commands, rx) = mpsc::channel(4);
        drop(rx);
        let (state_tx, state) = watch::channel(SessionState::Stopped);
        drop(state_tx);
        let handle = SessionHandle {
            id: "gone".to_string(),
            commands,
            state,
            query_timeout: None,
        };

        assert!(handle.is_closed());
        assert!(handle.pause().await.unwrap_err().is_session_ended());
        assert_eq!(handle.ended().await, SessionState::Stopped);
    }
}
