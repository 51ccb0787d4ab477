//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the lesson playback core and the
//! host environment (desktop shell, browser, mobile webview). Every signal the
//! core reacts to (network reachability, page visibility, media element events)
//! and every capability it consumes (HTTP, device-local storage, time) arrives
//! through one of these traits so the core logic can be exercised without a
//! real browser or DOM.
//!
//! ## Traits
//!
//! ### Networking & I/O
//! - [`HttpClient`](http::HttpClient) - Async HTTP operations with retry policy
//!
//! ### Storage
//! - [`SettingsStore`](storage::SettingsStore) - Device-local key-value storage
//!   (localStorage on the web, SQLite on desktop,
//!   [`MemorySettingsStore`](storage::MemorySettingsStore) in tests)
//!
//! ### Platform Integration
//! - [`NetworkMonitor`](network::NetworkMonitor) - Online/offline signals
//! - [`LifecycleObserver`](lifecycle::LifecycleObserver) - Page visibility and unload
//! - [`MediaEventSource`](playback::MediaEventSource) - `timeupdate` / `pause` from a media element
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Platform
//! implementations should convert platform-specific errors to `BridgeError` and
//! include context (URLs, keys, network status) in the message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across async tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod lifecycle;
pub mod network;
pub mod playback;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use lifecycle::{LifecycleChangeStream, LifecycleObserver, LifecycleState};
pub use network::{NetworkChangeStream, NetworkInfo, NetworkMonitor, NetworkStatus};
pub use playback::{MediaEvent, MediaEventSource, MediaEventStream};
pub use storage::{MemorySettingsStore, SettingsStore};
pub use time::{Clock, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
