//! # Playback Dispatcher
//!
//! The control loop of a session. It alone owns the frame cache, the read
//! cursor and the pause/loop flags, so none of them need a lock. Each
//! iteration merges three event sources in a fixed order:
//!
//! 1. Drain newly encoded frames into the cache.
//! 2. Observe the encoder's terminal outcome.
//! 3. Apply at most one controller command.
//! 4. Emit the frame under the cursor, unless paused. While the encoder is
//!    live the sink is only offered the frame (`try_send`) so a slow sink
//!    cannot delay commands; once every frame is cached the dispatcher waits
//!    on the sink instead.
//! 5. At the end of the cache with the encoder done, loop back to the first
//!    frame or finish.
//! 6. Sleep for the idle backoff when the iteration did nothing.
//!
//! On exit the command queue is closed and every query already in it is
//! answered, so no caller waits on a session that is gone.

use crate::cache::FrameCache;
use crate::config::{SessionOptions, SessionState, SessionStats};
use crate::encoder::EncoderOutcome;
use crate::error::{PlaybackError, Result};
use crate::protocol::{Command, Request, Response};
use crate::sink::FrameSink;
use bytes::Bytes;
use core_async::sync::{mpsc, oneshot, watch, CancellationToken};
use core_async::time::{sleep, Duration};
use core_runtime::events::{EventBus, SessionEvent};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, trace, warn};

/// How a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEnd {
    /// Every cached frame was emitted with looping off.
    Finished,
    /// A Stop command ended the session.
    Stopped,
}

/// Summary returned when a session ends without error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub end: SessionEnd,
    pub stats: SessionStats,
    /// Cursor position at exit, in seconds.
    pub position_secs: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EncoderState {
    Running,
    /// Reached the end of its input; the cache is complete.
    Done,
    Aborted,
    /// Stopped by the dispatcher before the end of its input.
    Interrupted,
}

/// What the loop should do after a command.
enum Flow {
    Continue,
    Stop,
}

/// Channels connecting a dispatcher to the rest of its session.
pub struct DispatcherChannels {
    pub frames: mpsc::Receiver<Bytes>,
    pub outcome: oneshot::Receiver<EncoderOutcome>,
    pub commands: mpsc::Receiver<Request>,
    pub stop: CancellationToken,
    pub state: watch::Sender<SessionState>,
}

/// Single-owner playback state machine.
pub struct Dispatcher {
    session_id: String,
    frames_per_second: f64,
    idle_backoff: Duration,
    cache: FrameCache,
    cursor: usize,
    paused: bool,
    looping: bool,
    encoder: EncoderState,
    channels: DispatcherChannels,
    sink: Box<dyn FrameSink>,
    events: Option<EventBus>,
    stats: SessionStats,
}

impl Dispatcher {
    pub fn new(
        session_id: impl Into<String>,
        options: &SessionOptions,
        channels: DispatcherChannels,
        sink: Box<dyn FrameSink>,
        events: Option<EventBus>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            frames_per_second: options.frames_per_second(),
            idle_backoff: options.idle_backoff,
            cache: FrameCache::new(),
            cursor: 0,
            paused: false,
            looping: false,
            encoder: EncoderState::Running,
            channels,
            sink,
            events,
            stats: SessionStats::default(),
        }
    }

    /// Run the loop until the session finishes, is stopped, or fails.
    ///
    /// The encoder is always stopped and awaited before this returns.
    #[instrument(name = "dispatcher", skip_all, fields(session = %self.session_id))]
    pub async fn run(mut self) -> Result<SessionReport> {
        self.refresh_state();
        info!("Playback started");

        let result = self.event_loop().await;
        let result = self.shutdown_encoder(result).await;

        self.close_commands();
        self.stats.cached_bytes = self.cache.total_bytes();
        let position_secs = self.position_secs() as f32;

        match result {
            Ok(end) => {
                let (state, event) = match end {
                    SessionEnd::Finished => (
                        SessionState::Finished,
                        SessionEvent::Finished {
                            session_id: self.session_id.clone(),
                        },
                    ),
                    SessionEnd::Stopped => (
                        SessionState::Stopped,
                        SessionEvent::Stopped {
                            session_id: self.session_id.clone(),
                        },
                    ),
                };
                info!(
                    end = ?end,
                    emitted = self.stats.frames_emitted,
                    cached = self.stats.frames_cached,
                    "Playback ended"
                );
                self.set_state(state);
                self.emit(event);
                Ok(SessionReport {
                    end,
                    stats: self.stats.clone(),
                    position_secs,
                })
            }
            Err(e) => {
                warn!(error = %e, "Playback failed");
                self.set_state(SessionState::Failed);
                self.emit(SessionEvent::Failed {
                    session_id: self.session_id.clone(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn event_loop(&mut self) -> Result<SessionEnd> {
        loop {
            let mut worked = self.drain_frames();

            if self.encoder == EncoderState::Running {
                match self.channels.outcome.try_recv() {
                    Ok(EncoderOutcome::Done { frames }) => {
                        // Frames are sent before the outcome, so all of them
                        // are already queued.
                        self.drain_frames();
                        self.encoder = EncoderState::Done;
                        debug!(frames, cached = self.cache.len(), "Encoder done");
                        self.emit(SessionEvent::EncoderFinished {
                            session_id: self.session_id.clone(),
                            duration_secs: self.cache.len() as f64 / self.frames_per_second,
                        });
                        self.refresh_state();
                        worked = true;
                    }
                    Ok(EncoderOutcome::Aborted(e)) => {
                        self.encoder = EncoderState::Aborted;
                        return Err(e);
                    }
                    Err(oneshot::error::TryRecvError::Empty) => {}
                    Err(oneshot::error::TryRecvError::Closed) => {
                        self.encoder = EncoderState::Aborted;
                        return Err(PlaybackError::Encode(
                            "encoder task exited without reporting".to_string(),
                        ));
                    }
                }
            }

            match self.channels.commands.try_recv() {
                Ok(request) => {
                    worked = true;
                    self.stats.commands_applied += 1;
                    if let Flow::Stop = self.apply(request) {
                        return Ok(SessionEnd::Stopped);
                    }
                }
                // A session keeps playing after every controller is dropped.
                Err(mpsc::error::TryRecvError::Empty)
                | Err(mpsc::error::TryRecvError::Disconnected) => {}
            }

            if !self.paused {
                if let Some(frame) = self.cache.at(self.cursor).cloned() {
                    let emitted = if self.encoder == EncoderState::Running {
                        self.sink.try_send(&frame)?
                    } else {
                        self.sink.send(frame).await?;
                        true
                    };

                    if emitted {
                        self.cursor += 1;
                        self.stats.frames_emitted += 1;
                        worked = true;
                    }
                }
            }

            if self.encoder == EncoderState::Done && self.cursor >= self.cache.len() {
                if self.looping && !self.cache.is_empty() {
                    trace!("Looping back to the first frame");
                    self.cursor = 0;
                    self.stats.loops_completed += 1;
                    self.refresh_state();
                    worked = true;
                } else {
                    return Ok(SessionEnd::Finished);
                }
            }

            if !worked {
                sleep(self.idle_backoff).await;
            }
        }
    }

    /// Move every queued frame into the cache. Returns whether any arrived.
    fn drain_frames(&mut self) -> bool {
        let mut received = false;
        while let Ok(frame) = self.channels.frames.try_recv() {
            self.cache.append(frame);
            self.stats.frames_cached += 1;
            received = true;
        }
        received
    }

    fn apply(&mut self, request: Request) -> Flow {
        let Request { command, reply } = request;
        trace!(?command, "Applying command");

        match command {
            Command::Stop => {
                info!(position_secs = self.position_secs(), "Stop requested");
                return Flow::Stop;
            }
            Command::Pause => {
                if !self.paused {
                    self.paused = true;
                    self.emit(SessionEvent::Paused {
                        session_id: self.session_id.clone(),
                        position_secs: self.position_secs(),
                    });
                }
            }
            Command::Resume => {
                if self.paused {
                    self.paused = false;
                    self.emit(SessionEvent::Resumed {
                        session_id: self.session_id.clone(),
                        position_secs: self.position_secs(),
                    });
                }
            }
            Command::StartLoop | Command::StopLoop => {
                let looping = command == Command::StartLoop;
                if self.looping != looping {
                    self.looping = looping;
                    self.emit(SessionEvent::LoopChanged {
                        session_id: self.session_id.clone(),
                        looping,
                    });
                }
            }
            Command::Seek(secs) => {
                self.cursor = self.seek_index(secs);
                debug!(secs, cursor = self.cursor, "Seek");
                self.emit(SessionEvent::Seeked {
                    session_id: self.session_id.clone(),
                    position_secs: self.position_secs(),
                });
            }
            Command::GetPlaybackTime | Command::GetDuration => {}
        }

        if let Some(reply) = reply {
            if let Some(response) = self.answer(command) {
                let _ = reply.send(response);
            }
        }

        self.refresh_state();
        Flow::Continue
    }

    /// Reply for a query command, `None` for mutating commands.
    fn answer(&self, command: Command) -> Option<Response> {
        match command {
            Command::GetPlaybackTime => Some(Response::PlaybackTime(self.position_secs() as f32)),
            Command::GetDuration => Some(match self.encoder {
                EncoderState::Done => {
                    Response::Duration((self.cache.len() as f64 / self.frames_per_second) as f32)
                }
                EncoderState::Running | EncoderState::Aborted | EncoderState::Interrupted => {
                    Response::DurationUnknown
                }
            }),
            _ => None,
        }
    }

    /// Cache index for a time offset, rounded to the nearest frame.
    fn seek_index(&self, secs: f32) -> usize {
        (secs.max(0.0) as f64 * self.frames_per_second).round() as usize
    }

    fn position_secs(&self) -> f64 {
        self.cursor as f64 / self.frames_per_second
    }

    /// Make sure the encoder has stopped and been reaped.
    ///
    /// After a Stop, an encoder error is still reported; after any other
    /// exit the loop's own result wins.
    async fn shutdown_encoder(&mut self, result: Result<SessionEnd>) -> Result<SessionEnd> {
        if self.encoder != EncoderState::Running {
            return result;
        }

        self.channels.stop.cancel();
        let outcome = (&mut self.channels.outcome).await;
        // The cache is partial, so the duration stays unknown.
        self.encoder = EncoderState::Interrupted;

        match (result, outcome) {
            (Ok(SessionEnd::Stopped), Ok(EncoderOutcome::Aborted(e))) => Err(e),
            (result, Ok(EncoderOutcome::Aborted(e))) => {
                debug!(error = %e, "Encoder error after playback ended");
                result
            }
            (result, _) => result,
        }
    }

    /// Refuse new commands and answer the queries already accepted.
    fn close_commands(&mut self) {
        self.channels.commands.close();
        while let Ok(request) = self.channels.commands.try_recv() {
            if let Some(response) = self.answer(request.command) {
                request.respond(response);
            }
        }
    }

    fn refresh_state(&self) {
        let state = if self.paused {
            SessionState::Paused
        } else if self.encoder == EncoderState::Done && !self.looping {
            SessionState::Draining
        } else {
            SessionState::Streaming
        };
        self.set_state(state);
    }

    fn set_state(&self, state: SessionState) {
        self.channels.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(bus) = &self.events {
            // No subscribers is fine.
            let _ = bus.emit(event);
        }
    }
}
