//! # Session Configuration
//!
//! Per-session options derived from the process-wide [`RelayConfig`], plus
//! the state and statistics types a session reports.

use crate::error::{PlaybackError, Result};
use core_runtime::config::RelayConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options for the PCM extraction process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PcmOptions {
    /// Path or name of the ffmpeg binary.
    pub ffmpeg_path: String,
    /// Interleaved output channels.
    pub channels: u16,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Start offset in seconds. Zero starts at the beginning.
    #[serde(default)]
    pub seek: f32,
    /// Length to extract in seconds. Zero means until the end of input.
    #[serde(default)]
    pub duration: f32,
}

impl Default for PcmOptions {
    fn default() -> Self {
        PcmOptions::from_relay_config(&RelayConfig::default())
    }
}

impl PcmOptions {
    pub fn from_relay_config(config: &RelayConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            channels: config.channels,
            sample_rate: config.sample_rate,
            seek: 0.0,
            duration: 0.0,
        }
    }
}

/// Everything one playback session needs to run.
///
/// Build it with [`SessionOptions::from_relay_config`] and adjust the
/// per-track fields (`pcm.seek`, `pcm.duration`) before starting.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub pcm: PcmOptions,
    /// Samples per channel in one frame.
    pub frame_size: usize,
    /// Target codec bitrate in bits per second.
    pub bitrate: u32,
    /// Hard ceiling on encoded bytes cached by the session.
    pub max_cache_bytes: usize,
    /// Capacity of the encoder-to-dispatcher frame queue.
    pub frame_queue_depth: usize,
    /// Capacity of the controller-to-dispatcher command queue.
    pub command_queue_depth: usize,
    /// Dispatcher sleep when an iteration found no work.
    pub idle_backoff: Duration,
    /// Wait for an interrupted decoder before killing it.
    pub reap_timeout: Duration,
    /// Upper bound on a query reply wait. `None` waits for the session.
    pub query_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions::from_relay_config(&RelayConfig::default())
    }
}

impl SessionOptions {
    pub fn from_relay_config(config: &RelayConfig) -> Self {
        Self {
            pcm: PcmOptions::from_relay_config(config),
            frame_size: config.frame_size,
            bitrate: config.bitrate,
            max_cache_bytes: config.max_cache_bytes,
            frame_queue_depth: config.frame_queue_depth,
            command_queue_depth: config.command_queue_depth,
            idle_backoff: config.idle_backoff(),
            reap_timeout: config.reap_timeout(),
            query_timeout: config.query_timeout(),
        }
    }

    /// Starts extraction `seconds` into the input.
    pub fn with_seek(mut self, seconds: f32) -> Self {
        self.pcm.seek = seconds;
        self
    }

    /// Limits extraction to `seconds` of audio.
    pub fn with_duration(mut self, seconds: f32) -> Self {
        self.pcm.duration = seconds;
        self
    }

    /// How many frames are played per second (`sample_rate / frame_size`).
    pub fn frames_per_second(&self) -> f64 {
        self.pcm.sample_rate as f64 / self.frame_size as f64
    }

    /// Bytes of s16le PCM that make up one frame.
    pub fn frame_bytes(&self) -> usize {
        self.frame_size * self.pcm.channels as usize * 2
    }

    /// Validate option values.
    pub fn validate(&self) -> Result<()> {
        if self.pcm.ffmpeg_path.trim().is_empty() {
            return Err(PlaybackError::InvalidOptions(
                "ffmpeg_path cannot be empty".to_string(),
            ));
        }

        if self.pcm.channels == 0 || self.pcm.sample_rate == 0 || self.frame_size == 0 {
            return Err(PlaybackError::InvalidOptions(
                "channels, sample_rate and frame_size must be > 0".to_string(),
            ));
        }

        if !self.pcm.seek.is_finite() || self.pcm.seek < 0.0 {
            return Err(PlaybackError::InvalidOptions(format!(
                "seek must be a non-negative number of seconds, got {}",
                self.pcm.seek
            )));
        }

        if !self.pcm.duration.is_finite() || self.pcm.duration < 0.0 {
            return Err(PlaybackError::InvalidOptions(format!(
                "duration must be a non-negative number of seconds, got {}",
                self.pcm.duration
            )));
        }

        if self.max_cache_bytes == 0 {
            return Err(PlaybackError::InvalidOptions(
                "max_cache_bytes must be > 0".to_string(),
            ));
        }

        if self.frame_queue_depth == 0 || self.command_queue_depth == 0 {
            return Err(PlaybackError::InvalidOptions(
                "queue depths must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Session State
// ============================================================================

/// Current state of the playback dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Decoder launched, loop not yet running.
    Starting,
    /// Emitting frames while the encoder may still be producing.
    Streaming,
    /// Frames are held; commands are still processed.
    Paused,
    /// The encoder is done; emitting the remaining cached frames.
    Draining,
    /// Ended by a Stop command.
    Stopped,
    /// Every frame was emitted with looping off.
    Finished,
    /// The encoder or sink failed.
    Failed,
}

impl SessionState {
    /// Returns `true` if the dispatcher loop is still running.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Streaming | Self::Paused | Self::Draining)
    }

    /// Returns `true` if the session is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Finished | Self::Failed)
    }
}

/// Counters collected by the dispatcher over one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Frames appended to the cache.
    pub frames_cached: usize,
    /// Frames handed to the sink, including replays.
    pub frames_emitted: usize,
    /// Encoded bytes held in the cache.
    pub cached_bytes: usize,
    /// Times the cursor wrapped back to the first frame.
    pub loops_completed: usize,
    /// Commands taken off the queue.
    pub commands_applied: usize,
}
