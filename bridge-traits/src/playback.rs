//! Media element bridge.
//!
//! The host player (an HTML `<video>` element, a native player view) reports
//! playback progress through these types. The core never drives the player;
//! it only observes it.

use async_trait::async_trait;

use crate::error::Result;

/// An observation emitted by a media element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaEvent {
    /// Periodic position report (`timeupdate`).
    TimeUpdate {
        /// Current playback position in seconds.
        position_seconds: f64,
        /// Media duration in seconds, when the element knows it.
        duration_seconds: Option<f64>,
    },
    /// Playback paused at the given position (`pause`).
    Pause {
        position_seconds: f64,
        duration_seconds: Option<f64>,
    },
}

impl MediaEvent {
    /// Position carried by the event.
    pub fn position_seconds(&self) -> f64 {
        match self {
            MediaEvent::TimeUpdate {
                position_seconds, ..
            }
            | MediaEvent::Pause {
                position_seconds, ..
            } => *position_seconds,
        }
    }

    /// Duration carried by the event, if known.
    pub fn duration_seconds(&self) -> Option<f64> {
        match self {
            MediaEvent::TimeUpdate {
                duration_seconds, ..
            }
            | MediaEvent::Pause {
                duration_seconds, ..
            } => *duration_seconds,
        }
    }
}

/// Source of media element events.
///
/// Each call to [`subscribe`](MediaEventSource::subscribe) attaches a fresh
/// listener; dropping the returned stream detaches it.
#[async_trait]
pub trait MediaEventSource: Send + Sync {
    async fn subscribe(&self) -> Result<Box<dyn MediaEventStream>>;
}

/// Stream of media events.
#[async_trait]
pub trait MediaEventStream: Send {
    /// Next event, or `None` once the element is gone.
    async fn next(&mut self) -> Option<MediaEvent>;
}
