//! Channel-backed media event source.

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    playback::{MediaEvent, MediaEventSource, MediaEventStream},
};
use tokio::sync::broadcast;
use tracing::warn;

const DEFAULT_CAPACITY: usize = 64;

/// Media event source fed by the desktop player.
///
/// The native player view forwards its position reports through
/// [`report`](ChannelMediaSource::report); every subscribed tracker receives a
/// copy.
#[derive(Debug, Clone)]
pub struct ChannelMediaSource {
    sender: broadcast::Sender<MediaEvent>,
}

impl ChannelMediaSource {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Forward an event to every listener. Returns how many listeners got it.
    pub fn report(&self, event: MediaEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChannelMediaSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaEventSource for ChannelMediaSource {
    async fn subscribe(&self) -> Result<Box<dyn MediaEventStream>> {
        Ok(Box::new(ChannelMediaStream {
            receiver: self.sender.subscribe(),
        }))
    }
}

struct ChannelMediaStream {
    receiver: broadcast::Receiver<MediaEvent>,
}

#[async_trait]
impl MediaEventStream for ChannelMediaStream {
    async fn next(&mut self) -> Option<MediaEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Only the latest position matters, keep reading
                    warn!(skipped, "Media listener lagged behind player");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
