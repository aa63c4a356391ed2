//! # Command/Response Protocol
//!
//! Messages a controller sends to a running session's dispatcher. Mutating
//! commands get no reply; the two queries get exactly one [`Response`]
//! through the one-shot channel carried in their [`Request`].

use core_async::sync::oneshot;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Control message for the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// End the session; the encoder is interrupted if still running.
    Stop,
    /// Hold emission. Idempotent.
    Pause,
    /// Continue emission. No-op when not paused.
    Resume,
    /// Replay the cache from the start whenever the end is reached.
    StartLoop,
    StopLoop,
    /// Move the read cursor to this many seconds into the cache.
    Seek(f32),
    /// Query: seconds already emitted from the cursor's point of view.
    GetPlaybackTime,
    /// Query: total cached seconds, once the encoder is done.
    GetDuration,
}

impl Command {
    /// Returns `true` for commands that expect a [`Response`].
    pub fn is_query(&self) -> bool {
        matches!(self, Command::GetPlaybackTime | Command::GetDuration)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Stop => "Stop",
            Command::Pause => "Pause",
            Command::Resume => "Resume",
            Command::StartLoop => "StartLoop",
            Command::StopLoop => "StopLoop",
            Command::Seek(_) => "Seek",
            Command::GetPlaybackTime => "GetPlaybackTime",
            Command::GetDuration => "GetDuration",
        }
    }
}

/// Reply to a query command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Response {
    PlaybackTime(f32),
    Duration(f32),
    /// The encoder is still producing, so the length is not known yet.
    DurationUnknown,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::PlaybackTime(secs) => write!(f, "PlaybackTime({})", secs),
            Response::Duration(secs) => write!(f, "Duration({})", secs),
            Response::DurationUnknown => write!(f, "DurationUnknown"),
        }
    }
}

/// A command on its way to the dispatcher, with the reply slot for queries.
#[derive(Debug)]
pub struct Request {
    pub command: Command,
    pub reply: Option<oneshot::Sender<Response>>,
}

impl Request {
    /// A mutating command that expects no reply.
    pub fn command(command: Command) -> Self {
        Self {
            command,
            reply: None,
        }
    }

    /// A query and the receiver its reply arrives on.
    pub fn query(command: Command) -> (Self, oneshot::Receiver<Response>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                command,
                reply: Some(tx),
            },
            rx,
        )
    }

    /// Deliver `response` if the caller is still waiting.
    pub fn respond(self, response: Response) {
        if let Some(reply) = self.reply {
            // The caller may have timed out and dropped the receiver.
            let _ = reply.send(response);
        }
    }
}

/// Parse a seek target written as `mm:ss` or plain seconds.
///
/// ```
/// use core_playback::protocol::parse_timestamp;
///
/// assert_eq!(parse_timestamp("1:30"), Some(90.0));
/// assert_eq!(parse_timestamp("45"), Some(45.0));
/// assert_eq!(parse_timestamp("1:2:3"), None);
/// ```
///
/// Returns `None` when the total does not fit in `u32` seconds.
pub fn parse_timestamp(input: &str) -> Option<f32> {
    let mut parts = input.trim().split(':');
    let first = parts.next()?;
    let (mins, secs) = match (parts.next(), parts.next()) {
        (None, _) => ("", first),
        (Some(secs), None) => (first, secs),
        (Some(_), Some(_)) => return None,
    };

    let mins: u32 = if mins.is_empty() { 0 } else { mins.parse().ok()? };
    let secs: u32 = secs.parse().ok()?;
    let total = mins.checked_mul(60)?.checked_add(secs)?;
    Some(total as f32)
}

/// Format seconds as `mm:ss`, truncating fractions.
pub fn format_timestamp(secs: f32) -> String {
    let secs = secs.max(0.0) as u64;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
