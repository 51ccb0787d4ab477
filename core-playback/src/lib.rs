//! # Lesson Playback Core
//!
//! Keeps a learner's place in a video and keeps the video playable.
//!
//! ## Overview
//!
//! This crate handles:
//! - Watch progress tracking with debounced saves, a device-local fallback
//!   when the progress service is unreachable, and replay once it is back
//! - Network reachability as an explicit state machine with bounded retry
//! - Renewal of time-limited signed streaming URLs before they expire
//!
//! Platform signals (media element events, page visibility, online/offline)
//! and capabilities (HTTP, device storage, time) come in through the
//! `bridge-traits` crate.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use core_playback::progress::{
//!     LocalProgressCache, ProgressStore, ProgressTracker, RestProgressRepository,
//! };
//!
//! let store = Arc::new(ProgressStore::new(
//!     Arc::new(RestProgressRepository::from_config(&config)),
//!     LocalProgressCache::new(config.settings_store.clone()),
//!     config.progress.clone(),
//! ));
//! let tracker = ProgressTracker::new(user_id, video_id, store, config.clock.clone());
//! let handle = tracker.start_tracking(media_source, config.lifecycle_observer.clone()).await?;
//! ```

pub mod connection;
pub mod error;
pub mod progress;
pub mod url_refresh;

pub use connection::{
    ConnectionMonitor, ConnectionSnapshot, ConnectionState, ConnectionSubscription,
};
pub use error::{PlaybackError, Result};
pub use progress::{
    LocalProgressCache, ProgressRecord, ProgressRepository, ProgressSnapshot, ProgressStore,
    ProgressTracker, RestProgressRepository, SaveOutcome, TrackingHandle,
};
pub use url_refresh::{
    HttpUrlRefresher, RefreshedUrl, SignedUrlLease, UrlRefreshManager, UrlRefreshManagerBuilder,
    UrlRefresher,
};
