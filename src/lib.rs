//! Workspace placeholder crate.
//!
//! This crate exposes shared feature flags that map to the individual
//! workspace crates (`core-runtime`, `core-playback`). Hosts that drive a
//! voice connection can depend on `relay-workspace` and enable the documented
//! features without wiring each crate individually.
//!
//! - `playback` (default): the extraction/encode/dispatch pipeline.
//! - `opus`: Opus frame compression through libopus.

pub use core_runtime as runtime;

#[cfg(feature = "playback")]
pub use core_playback as playback;
