//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the relay pipeline:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Session event bus
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that `core-playback` depends
//! on. It establishes the logging conventions, the configuration surface
//! and the event broadcasting mechanism used throughout the workspace.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
