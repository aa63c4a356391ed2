//! # Event Bus System
//!
//! Broadcasts playback session lifecycle events using `tokio::sync::broadcast`.
//! Hosts subscribe to render "now playing" state, announce failures, or
//! advance a queue when a session finishes, without holding a reference
//! into the dispatcher.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐     emit      ┌───────────┐    subscribe    ┌────────────┐
//! │ Dispatcher ├──────────────>│ EventBus  ├────────────────>│ Subscriber │
//! └────────────┘               │ (broadcast│                 └────────────┘
//! ┌────────────┐     emit      │  channel) │    subscribe    ┌────────────┐
//! │ Dispatcher ├──────────────>│           ├────────────────>│ Subscriber │
//! └────────────┘               └───────────┘                 └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, SessionEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(64);
//! let mut stream = bus.subscribe();
//!
//! bus.emit(SessionEvent::Paused {
//!     session_id: "s-1".to_string(),
//!     position_secs: 12.5,
//! })
//! .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.session_id(), "s-1");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Emitting with no subscribers returns `Err(SendError)`; publishers treat
//! that as "nobody is listening", not as a failure.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Lifecycle events of one playback session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum SessionEvent {
    /// The dispatcher loop began streaming.
    Started {
        session_id: String,
        /// Redacted input locator.
        input: String,
    },
    /// Playback paused.
    Paused {
        session_id: String,
        position_secs: f64,
    },
    /// Playback resumed after pause.
    Resumed {
        session_id: String,
        position_secs: f64,
    },
    /// The read cursor was relocated by a seek.
    Seeked {
        session_id: String,
        position_secs: f64,
    },
    /// Looping was switched on or off.
    LoopChanged { session_id: String, looping: bool },
    /// The encoder reached the end of its input; the duration is now known.
    EncoderFinished {
        session_id: String,
        duration_secs: f64,
    },
    /// Every cached frame was emitted and looping is off.
    Finished { session_id: String },
    /// The session was stopped by its controller.
    Stopped { session_id: String },
    /// The session ended with an error.
    Failed { session_id: String, message: String },
}

impl SessionEvent {
    /// The session this event belongs to.
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::Started { session_id, .. }
            | SessionEvent::Paused { session_id, .. }
            | SessionEvent::Resumed { session_id, .. }
            | SessionEvent::Seeked { session_id, .. }
            | SessionEvent::LoopChanged { session_id, .. }
            | SessionEvent::EncoderFinished { session_id, .. }
            | SessionEvent::Finished { session_id }
            | SessionEvent::Stopped { session_id }
            | SessionEvent::Failed { session_id, .. } => session_id,
        }
    }

    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            SessionEvent::Started { .. } => "Playback started",
            SessionEvent::Paused { .. } => "Playback paused",
            SessionEvent::Resumed { .. } => "Playback resumed",
            SessionEvent::Seeked { .. } => "Playback position changed",
            SessionEvent::LoopChanged { .. } => "Loop mode changed",
            SessionEvent::EncoderFinished { .. } => "Encoding finished",
            SessionEvent::Finished { .. } => "Playback finished",
            SessionEvent::Stopped { .. } => "Playback stopped",
            SessionEvent::Failed { .. } => "Playback error",
        }
    }

    /// Returns `true` for the last event a session emits.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionEvent::Finished { .. } | SessionEvent::Stopped { .. } | SessionEvent::Failed { .. }
        )
    }
}

/// Central event bus for publishing and subscribing to session events.
///
/// Clone the bus to hand it to several sessions; every clone publishes into
/// the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified per-subscriber buffer.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: SessionEvent) -> Result<usize, SendError<SessionEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&SessionEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with filtering.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream};
///
/// let bus = EventBus::default();
/// // Only follow one session.
/// let stream = EventStream::new(bus.subscribe()).filter(|e| e.session_id() == "s-7");
/// ```
pub struct EventStream {
    receiver: Receiver<SessionEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<SessionEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&SessionEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<SessionEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
