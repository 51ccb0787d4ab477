//! # Event Bus System
//!
//! Event-driven communication between the playback components using
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: one enum per component, wrapped in [`CoreEvent`]
//! - **EventBus**: central broadcast channel for publishing events
//! - **EventStream**: receiver wrapper with optional filtering
//!
//! ```text
//! ┌──────────────────┐   emit   ┌───────────┐
//! │ ProgressTracker  ├─────────>│           │
//! └──────────────────┘          │           │  subscribe  ┌────────────┐
//! ┌──────────────────┐   emit   │ EventBus  ├────────────>│ UI / host  │
//! │ConnectionMonitor ├─────────>│           │             └────────────┘
//! └──────────────────┘          │           │
//! ┌──────────────────┐   emit   │           │
//! │UrlRefreshManager ├─────────>│           │
//! └──────────────────┘          └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{ConnectionEvent, ConnectionState, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut stream = bus.subscribe();
//!
//! bus.emit(CoreEvent::Connection(ConnectionEvent::StateChanged {
//!     previous: ConnectionState::Online,
//!     current: ConnectionState::Reconnecting,
//!     retry_count: 1,
//! }))
//! .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Connection state changed");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events. Non-fatal.
//! - **`RecvError::Closed`**: every sender was dropped. Treat as shutdown.
//!
//! Emitting with no subscribers returns an error; producers ignore it with
//! `.ok()` because events are advisory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Progress(ProgressEvent),
    Connection(ConnectionEvent),
    Lease(LeaseEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Progress(e) => e.description(),
            CoreEvent::Connection(e) => e.description(),
            CoreEvent::Lease(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Progress(ProgressEvent::SaveFailed { .. }) => EventSeverity::Error,
            CoreEvent::Connection(ConnectionEvent::RetriesExhausted { .. }) => {
                EventSeverity::Error
            }
            CoreEvent::Lease(LeaseEvent::RefreshFailed { will_retry, .. }) => {
                if *will_retry {
                    EventSeverity::Warning
                } else {
                    EventSeverity::Error
                }
            }
            CoreEvent::Progress(ProgressEvent::Saved {
                store: ProgressStoreKind::Local,
                ..
            }) => EventSeverity::Warning,
            CoreEvent::Connection(ConnectionEvent::StateChanged {
                current: ConnectionState::Offline,
                ..
            }) => EventSeverity::Warning,
            CoreEvent::Lease(LeaseEvent::Refreshed { .. }) => EventSeverity::Info,
            CoreEvent::Progress(ProgressEvent::PendingSynced { .. }) => EventSeverity::Info,
            CoreEvent::Connection(ConnectionEvent::StateChanged { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Progress Events
// ============================================================================

/// Which store accepted a progress write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressStoreKind {
    Remote,
    Local,
}

/// Events emitted by the progress tracker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum ProgressEvent {
    /// A progress snapshot was persisted.
    Saved {
        user_id: String,
        video_id: String,
        position_seconds: f64,
        completed: bool,
        /// `Local` means the remote write failed and the snapshot is pending.
        store: ProgressStoreKind,
    },
    /// Neither store accepted the snapshot.
    SaveFailed {
        user_id: String,
        video_id: String,
        message: String,
    },
    /// A locally cached snapshot was replayed to the remote store.
    PendingSynced { user_id: String, video_id: String },
}

impl ProgressEvent {
    fn description(&self) -> &str {
        match self {
            ProgressEvent::Saved { .. } => "Progress saved",
            ProgressEvent::SaveFailed { .. } => "Progress could not be saved",
            ProgressEvent::PendingSynced { .. } => "Pending progress synced",
        }
    }
}

// ============================================================================
// Connection Events
// ============================================================================

/// Connectivity state as seen by the connection monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Online,
    Offline,
    Slow,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Online => "online",
            ConnectionState::Offline => "offline",
            ConnectionState::Slow => "slow",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Events emitted by the connection monitor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum ConnectionEvent {
    /// The monitor moved between states.
    StateChanged {
        previous: ConnectionState,
        current: ConnectionState,
        retry_count: u32,
    },
    /// A reconnect attempt was scheduled.
    RetryScheduled { attempt: u32, delay_ms: u64 },
    /// The retry budget ran out and the monitor settled offline.
    RetriesExhausted { attempts: u32 },
}

impl ConnectionEvent {
    fn description(&self) -> &str {
        match self {
            ConnectionEvent::StateChanged { .. } => "Connection state changed",
            ConnectionEvent::RetryScheduled { .. } => "Reconnect attempt scheduled",
            ConnectionEvent::RetriesExhausted { .. } => "Reconnect attempts exhausted",
        }
    }
}

// ============================================================================
// Lease Events
// ============================================================================

/// Events emitted by the signed URL refresh manager.
///
/// URLs are never carried in events; they hold credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum LeaseEvent {
    /// A refresh was scheduled for the current lease.
    Scheduled {
        video_id: String,
        expires_at: DateTime<Utc>,
        refresh_at: DateTime<Utc>,
    },
    /// A refresh request is in flight.
    Refreshing { video_id: String },
    /// A new signed URL was issued.
    Refreshed {
        video_id: String,
        expires_at: DateTime<Utc>,
    },
    /// The refresh request failed.
    RefreshFailed {
        video_id: String,
        message: String,
        attempt: u32,
        will_retry: bool,
    },
}

impl LeaseEvent {
    fn description(&self) -> &str {
        match self {
            LeaseEvent::Scheduled { .. } => "URL refresh scheduled",
            LeaseEvent::Refreshing { .. } => "Refreshing signed URL",
            LeaseEvent::Refreshed { .. } => "Signed URL refreshed",
            LeaseEvent::RefreshFailed { .. } => "Signed URL refresh failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Cloning the bus yields another producer on the same channel. Each
/// [`subscribe`](EventBus::subscribe) call creates an independent receiver that
/// sees every event emitted after it was created.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    ///
    /// Subscribers that fall more than `capacity` events behind receive
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
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

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(100);
/// let lease_events = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Lease(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Only events at or above `minimum` severity are returned.
    pub fn min_severity(self, minimum: EventSeverity) -> Self {
        self.filter(move |event| event.severity() >= minimum)
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    ///
    /// Returns `None` if no matching events are currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
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

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn saved(video_id: &str, store: ProgressStoreKind) -> CoreEvent {
        CoreEvent::Progress(ProgressEvent::Saved {
            user_id: "user-1".to_string(),
            video_id: video_id.to_string(),
            position_seconds: 42.0,
            completed: false,
            store,
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(saved("vid-1", ProgressStoreKind::Remote)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Lease(LeaseEvent::Refreshing {
            video_id: "vid-1".to_string(),
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Connection(_)));

        bus.emit(saved("vid-1", ProgressStoreKind::Remote)).ok();
        let connection = CoreEvent::Connection(ConnectionEvent::RetryScheduled {
            attempt: 1,
            delay_ms: 2000,
        });
        bus.emit(connection.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), connection);
    }

    #[tokio::test]
    async fn test_min_severity_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe()).min_severity(EventSeverity::Warning);

        bus.emit(saved("vid-1", ProgressStoreKind::Remote)).ok();
        bus.emit(saved("vid-2", ProgressStoreKind::Local)).ok();

        assert_eq!(
            stream.try_recv().unwrap().unwrap(),
            saved("vid-2", ProgressStoreKind::Local)
        );
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for attempt in 1..=5 {
            bus.emit(CoreEvent::Connection(ConnectionEvent::RetryScheduled {
                attempt,
                delay_ms: 2000,
            }))
            .ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        assert_eq!(
            saved("vid-1", ProgressStoreKind::Remote).severity(),
            EventSeverity::Debug
        );
        assert_eq!(
            saved("vid-1", ProgressStoreKind::Local).severity(),
            EventSeverity::Warning
        );

        let exhausted = CoreEvent::Connection(ConnectionEvent::RetriesExhausted { attempts: 5 });
        assert_eq!(exhausted.severity(), EventSeverity::Error);

        let offline = CoreEvent::Connection(ConnectionEvent::StateChanged {
            previous: ConnectionState::Reconnecting,
            current: ConnectionState::Offline,
            retry_count: 6,
        });
        assert_eq!(offline.severity(), EventSeverity::Warning);

        let retrying = CoreEvent::Lease(LeaseEvent::RefreshFailed {
            video_id: "vid-1".to_string(),
            message: "503".to_string(),
            attempt: 1,
            will_retry: true,
        });
        assert_eq!(retrying.severity(), EventSeverity::Warning);

        let stale = CoreEvent::Lease(LeaseEvent::RefreshFailed {
            video_id: "vid-1".to_string(),
            message: "503".to_string(),
            attempt: 6,
            will_retry: false,
        });
        assert_eq!(stale.severity(), EventSeverity::Error);
    }

    #[test]
    fn test_event_description() {
        let event = CoreEvent::Progress(ProgressEvent::PendingSynced {
            user_id: "user-1".to_string(),
            video_id: "vid-1".to_string(),
        });
        assert_eq!(event.description(), "Pending progress synced");
    }

    #[test]
    fn test_connection_state_wire_names() {
        assert_eq!(
            serde_json::to_string(&ConnectionState::Reconnecting).unwrap(),
            "\"reconnecting\""
        );
        assert_eq!(ConnectionState::Slow.to_string(), "slow");
    }

    #[tokio::test]
    async fn test_event_serialization() {
        let event = CoreEvent::Lease(LeaseEvent::Refreshed {
            video_id: "vid-9".to_string(),
            expires_at: "2026-01-01T00:00:00Z".parse().unwrap(),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Lease\""));
        assert!(json.contains("vid-9"));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());
    }
}
