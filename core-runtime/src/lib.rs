//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the lesson playback core:
//! - Logging and tracing infrastructure
//! - Configuration management
//! - Event bus system
//!
//! The playback components and the service facade depend on this crate for
//! their configuration blocks, their event types and the logging conventions
//! (including signed URL redaction).

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
