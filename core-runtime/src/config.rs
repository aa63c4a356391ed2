//! # Relay Configuration Module
//!
//! Provides configuration management for the relay pipeline.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `RelayConfig`
//! instance holding the process-wide settings every playback session starts
//! from: where the decoder binary lives, the PCM layout it must produce, how
//! frames are compressed and how large a single session's frame cache may grow.
//! Validation is fail-fast so a bad value is rejected before any subprocess is
//! spawned.
//!
//! Configuration can also be read from a JSON file. Every field has a serde
//! default, so a file only needs the keys it wants to override.
//!
//! ## Usage
//!
//! ### Builder
//!
//! ```
//! use core_runtime::config::RelayConfig;
//!
//! let config = RelayConfig::builder()
//!     .ffmpeg_path("/usr/bin/ffmpeg")
//!     .bitrate(96_000)
//!     .max_cache_bytes(50_000_000)
//!     .build()
//!     .expect("valid config");
//!
//! assert_eq!(config.frames_per_second(), 50.0);
//! ```
//!
//! ### JSON file
//!
//! ```no_run
//! use core_runtime::config::RelayConfig;
//!
//! let config = RelayConfig::from_json_file("relay.json").expect("readable config");
//! println!("decoder: {}", config.ffmpeg_path);
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Sample rates accepted by Opus encoders.
pub const SUPPORTED_SAMPLE_RATES: &[u32] = &[8_000, 12_000, 16_000, 24_000, 48_000];

/// Process-wide relay configuration.
///
/// Use [`RelayConfig::builder`] or [`RelayConfig::from_json_file`] to
/// construct instances. Both paths run [`RelayConfig::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Path or name of the ffmpeg binary used to extract PCM.
    ///
    /// Default: `"ffmpeg"` (resolved through `PATH`).
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Output sample rate in Hz.
    ///
    /// Default: 48000, the only rate voice endpoints accept.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Number of interleaved output channels (1 or 2).
    ///
    /// Default: 2.
    #[serde(default = "default_channels")]
    pub channels: u16,

    /// Samples per channel in one frame.
    ///
    /// Default: 960 (20ms at 48kHz). Changing it changes the playback speed
    /// on sinks that assume 20ms frames.
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,

    /// Target encoder bitrate in bits per second.
    ///
    /// Default: 64000.
    #[serde(default = "default_bitrate")]
    pub bitrate: u32,

    /// Maximum number of encoded bytes one session may cache.
    ///
    /// A 3-minute song usually needs about 2.7MB. Default: 100MB.
    #[serde(default = "default_max_cache_bytes")]
    pub max_cache_bytes: usize,

    /// Capacity of the bounded encoder-to-dispatcher frame queue.
    ///
    /// Default: 8 frames.
    #[serde(default = "default_frame_queue_depth")]
    pub frame_queue_depth: usize,

    /// Capacity of a session's command queue.
    ///
    /// Default: 32 commands.
    #[serde(default = "default_command_queue_depth")]
    pub command_queue_depth: usize,

    /// Dispatcher sleep when an iteration found no work, in milliseconds.
    ///
    /// Default: 2ms.
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,

    /// How long to wait for an interrupted decoder before killing it, in
    /// milliseconds.
    ///
    /// Default: 5000ms.
    #[serde(default = "default_reap_timeout_ms")]
    pub reap_timeout_ms: u64,

    /// Upper bound on waiting for a query reply, in milliseconds.
    ///
    /// `None` waits until the reply arrives or the session ends.
    #[serde(default)]
    pub query_timeout_ms: Option<u64>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            frame_size: default_frame_size(),
            bitrate: default_bitrate(),
            max_cache_bytes: default_max_cache_bytes(),
            frame_queue_depth: default_frame_queue_depth(),
            command_queue_depth: default_command_queue_depth(),
            idle_backoff_ms: default_idle_backoff_ms(),
            reap_timeout_ms: default_reap_timeout_ms(),
            query_timeout_ms: None,
        }
    }
}

impl RelayConfig {
    /// Creates a new builder seeded with the defaults.
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder::default()
    }

    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: RelayConfig = serde_json::from_str(json)
            .map_err(|e| Error::Config(format!("Unable to decode config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Unable to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config = Self::from_json_str(&data)?;
        tracing::info!(path = %path.display(), "Config file loaded");
        Ok(config)
    }

    /// Writes the default configuration as pretty JSON.
    ///
    /// Fails if the file already exists so a user's config is never
    /// clobbered.
    pub fn write_default_file(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if path.exists() {
            return Err(Error::Config(format!(
                "Refusing to overwrite existing config file {}",
                path.display()
            )));
        }

        let data = serde_json::to_string_pretty(&RelayConfig::default())
            .map_err(|e| Error::Internal(format!("Unable to encode default config: {}", e)))?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - The decoder path is not empty
    /// - The sample rate is one an Opus encoder accepts
    /// - Mono or stereo output
    /// - Non-zero frame size, bitrate, cache budget and queue depths
    pub fn validate(&self) -> Result<()> {
        if self.ffmpeg_path.trim().is_empty() {
            return Err(Error::Config("ffmpeg_path cannot be empty".to_string()));
        }

        if !SUPPORTED_SAMPLE_RATES.contains(&self.sample_rate) {
            return Err(Error::Config(format!(
                "Unsupported sample rate {} (expected one of {:?})",
                self.sample_rate, SUPPORTED_SAMPLE_RATES
            )));
        }

        if !(1..=2).contains(&self.channels) {
            return Err(Error::Config(format!(
                "Unsupported channel count {} (expected 1 or 2)",
                self.channels
            )));
        }

        if self.frame_size == 0 {
            return Err(Error::Config("frame_size must be > 0".to_string()));
        }

        if self.bitrate == 0 {
            return Err(Error::Config("bitrate must be > 0".to_string()));
        }

        if self.max_cache_bytes == 0 {
            return Err(Error::Config("max_cache_bytes must be > 0".to_string()));
        }

        if self.frame_queue_depth == 0 || self.command_queue_depth == 0 {
            return Err(Error::Config("queue depths must be > 0".to_string()));
        }

        if self.query_timeout_ms == Some(0) {
            return Err(Error::Config(
                "query_timeout_ms must be > 0 when set".to_string(),
            ));
        }

        Ok(())
    }

    /// How many frames are played per second.
    pub fn frames_per_second(&self) -> f64 {
        self.sample_rate as f64 / self.frame_size as f64
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    pub fn reap_timeout(&self) -> Duration {
        Duration::from_millis(self.reap_timeout_ms)
    }

    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_ms.map(Duration::from_millis)
    }
}

/// Builder for constructing [`RelayConfig`] instances.
///
/// Unset values fall back to the defaults; [`build`](RelayConfigBuilder::build)
/// validates the result.
#[derive(Debug, Default)]
pub struct RelayConfigBuilder {
    config: RelayConfig,
}

impl RelayConfigBuilder {
    /// Sets the decoder binary path.
    pub fn ffmpeg_path(mut self, path: impl Into<String>) -> Self {
        self.config.ffmpeg_path = path.into();
        self
    }

    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    pub fn channels(mut self, channels: u16) -> Self {
        self.config.channels = channels;
        self
    }

    /// Sets the samples per channel in one frame.
    pub fn frame_size(mut self, frame_size: usize) -> Self {
        self.config.frame_size = frame_size;
        self
    }

    pub fn bitrate(mut self, bitrate: u32) -> Self {
        self.config.bitrate = bitrate;
        self
    }

    /// Sets the per-session cache budget in bytes.
    pub fn max_cache_bytes(mut self, bytes: usize) -> Self {
        self.config.max_cache_bytes = bytes;
        self
    }

    pub fn frame_queue_depth(mut self, depth: usize) -> Self {
        self.config.frame_queue_depth = depth;
        self
    }

    pub fn command_queue_depth(mut self, depth: usize) -> Self {
        self.config.command_queue_depth = depth;
        self
    }

    pub fn idle_backoff(mut self, backoff: Duration) -> Self {
        self.config.idle_backoff_ms = backoff.as_millis() as u64;
        self
    }

    pub fn reap_timeout(mut self, timeout: Duration) -> Self {
        self.config.reap_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Bounds every query reply wait.
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.config.query_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<RelayConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ============================================================================
// Default Functions (for serde)
// ============================================================================

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_sample_rate() -> u32 {
    48_000
}

fn default_channels() -> u16 {
    2
}

fn default_frame_size() -> usize {
    960 // 20ms at 48kHz
}

fn default_bitrate() -> u32 {
    64_000
}

fn default_max_cache_bytes() -> usize {
    100_000_000
}

fn default_frame_queue_depth() -> usize {
    8
}

fn default_command_queue_depth() -> usize {
    32
}

fn default_idle_backoff_ms() -> u64 {
    2
}

fn default_reap_timeout_ms() -> u64 {
    5_000
}
