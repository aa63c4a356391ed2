//! # Playback Error Types
//!
//! Error taxonomy for one playback session, from launching the decoder
//! process to answering controller queries.

use thiserror::Error;

/// Errors that can occur during a playback session.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Extraction Errors
    // ========================================================================
    /// The decoder process could not be started or its stdout attached.
    #[error("Failed to launch decoder: {0}")]
    Launch(String),

    /// Reading PCM from the decoder failed for a reason other than end of stream.
    #[error("Failed to read decoded audio: {0}")]
    DecodeRead(#[source] std::io::Error),

    /// The decoder exited with a status that was not requested.
    #[error("Decoder exited unexpectedly ({})", exit_code_label(.code))]
    SubprocessExit { code: Option<i32> },

    // ========================================================================
    // Encoding Errors
    // ========================================================================
    /// The frame codec rejected a PCM window.
    #[error("Frame encoding failed: {0}")]
    Encode(String),

    /// Encoded frames would exceed the session's cache budget.
    ///
    /// Usually means the input is too long; shortening it or raising the
    /// budget avoids it.
    #[error("Audio too large: the maximum cache limit of {budget} bytes has been exceeded")]
    CacheOverflow { budget: usize },

    // ========================================================================
    // Control Errors
    // ========================================================================
    /// A query was answered with the wrong response kind.
    #[error("Invalid command response: expected {expected}, received {received}")]
    InvalidCommandResponse {
        expected: &'static str,
        received: String,
    },

    /// The session reached a terminal state before the command was handled.
    #[error("Playback session has ended")]
    SessionEnded,

    /// A query got no reply within the configured timeout. The session may
    /// still be running, for example while it waits on a slow sink.
    #[error("No reply to {command} within {timeout_ms} ms")]
    QueryTimeout {
        command: &'static str,
        timeout_ms: u64,
    },

    /// The owner already has a live session.
    #[error("A playback session already exists for {0}")]
    SessionExists(String),

    /// Session options failed validation.
    #[error("Invalid playback options: {0}")]
    InvalidOptions(String),

    // ========================================================================
    // Output Errors
    // ========================================================================
    /// The frame sink was closed by its consumer.
    #[error("Frame sink closed")]
    SinkClosed,

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_code_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl PlaybackError {
    /// Returns `true` if the encoder stopped because of the cache budget.
    pub fn is_cache_overflow(&self) -> bool {
        matches!(self, PlaybackError::CacheOverflow { .. })
    }

    /// Returns `true` if a command failed only because the session is gone.
    pub fn is_session_ended(&self) -> bool {
        matches!(self, PlaybackError::SessionEnded)
    }

    pub fn is_query_timeout(&self) -> bool {
        matches!(self, PlaybackError::QueryTimeout { .. })
    }

    /// Returns `true` if this error ends the session that produced it.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PlaybackError::SessionEnded
                | PlaybackError::QueryTimeout { .. }
                | PlaybackError::SessionExists(_)
                | PlaybackError::InvalidCommandResponse { .. }
        )
    }
}

impl From<core_runtime::Error> for PlaybackError {
    fn from(err: core_runtime::Error) -> Self {
        PlaybackError::InvalidOptions(err.to_string())
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;
