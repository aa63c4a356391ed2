//! # Playback Pipeline
//!
//! Extracts, encodes, caches and streams audio to a frame sink while a
//! controller pauses, resumes, seeks, loops, stops and queries it.
//!
//! ## Overview
//!
//! ```text
//! extract ──PCM──> encoder ──frames──> dispatcher ──frames──> sink
//!                                          ▲   │
//!                              Command ────┘   └──── Response
//! ```
//!
//! - [`extract`] launches ffmpeg and exposes its s16le output
//! - [`encoder`] turns PCM windows into frames under a cache budget
//! - [`cache`] keeps every frame so loops and seeks never re-decode
//! - [`dispatcher`] is the state machine merging frames, commands and sink
//!   backpressure
//! - [`session`] wires them together and returns a [`SessionHandle`]
//! - [`registry`] keeps one session per owner
//!
//! Frames are Opus packets with the default `opus` feature and raw PCM
//! windows without it.

pub mod cache;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod encoder;
pub mod error;
pub mod extract;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod sink;

pub use cache::FrameCache;
pub use codec::{default_codec, FrameCodec, PcmCodec};
#[cfg(feature = "opus")]
pub use codec::OpusCodec;
pub use config::{PcmOptions, SessionOptions, SessionState, SessionStats};
pub use dispatcher::{SessionEnd, SessionReport};
pub use encoder::{EncoderOutcome, FrameEncoder};
pub use error::{PlaybackError, Result};
pub use extract::{DecoderProcess, PcmStream, ProcessExit};
pub use protocol::{Command, Request, Response};
pub use registry::SessionRegistry;
pub use session::{Session, SessionBuilder, SessionHandle};
pub use sink::{ChannelSink, DcaWriter, FrameSink};
