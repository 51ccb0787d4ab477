//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (HTTP, device
//! storage, network and lifecycle signals) into the playback core. A host
//! creates one [`PlaybackContext`] per signed-in learner and opens a
//! [`PlaybackSession`] for every video the learner watches. Desktop apps
//! typically enable the `desktop-shims` feature (which depends on
//! `bridge-desktop`) so the bridges have defaults.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bridge_traits::playback::MediaEventSource;
use chrono::{DateTime, Utc};
use core_playback::{
    ConnectionMonitor, ConnectionSnapshot, ConnectionState, ConnectionSubscription,
    LocalProgressCache, ProgressRepository, ProgressStore, ProgressTracker,
    RestProgressRepository, TrackingHandle, UrlRefreshManager,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// Everything one signed-in learner's playback shares.
///
/// Owns the event bus, the connection monitor and the progress store.
/// Whenever the monitor reaches `online` (including at start) locally cached
/// progress is replayed to the progress service in the background.
pub struct PlaybackContext {
    config: CoreConfig,
    user_id: String,
    event_bus: Arc<EventBus>,
    monitor: ConnectionMonitor,
    store: Arc<ProgressStore>,
    sync_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    subscription: Mutex<Option<ConnectionSubscription>>,
    shut_down: AtomicBool,
}

impl PlaybackContext {
    /// Create a context backed by the REST progress service in `config`.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn bootstrap(config: CoreConfig, user_id: impl Into<String>) -> Result<Self> {
        let repository = Arc::new(RestProgressRepository::from_config(&config));
        Self::bootstrap_with_repository(config, user_id, repository).await
    }

    /// Create a context with a custom progress repository.
    #[instrument(skip_all)]
    pub async fn bootstrap_with_repository(
        config: CoreConfig,
        user_id: impl Into<String>,
        repository: Arc<dyn ProgressRepository>,
    ) -> Result<Self> {
        config.validate().map_err(CoreError::from_runtime)?;
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(CoreError::InitializationFailed(
                "user id cannot be empty".to_string(),
            ));
        }
        let runtime = Handle::try_current().map_err(|e| {
            CoreError::InitializationFailed(format!("no Tokio runtime available: {}", e))
        })?;

        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let store = Arc::new(
            ProgressStore::new(
                repository,
                LocalProgressCache::new(config.settings_store.clone()),
                config.progress.clone(),
            )
            .with_event_bus(event_bus.clone()),
        );

        let monitor = ConnectionMonitor::with_event_bus(
            config.network_monitor.clone(),
            config.connection.clone(),
            event_bus.clone(),
        );
        if let Err(e) = monitor.start_watching().await {
            // Reported issues still drive the monitor without platform signals
            warn!(error = %e, "Network signals unavailable");
        }

        let sync_task = Arc::new(Mutex::new(None));
        let subscription = monitor.subscribe(replay_when_online(
            runtime,
            store.clone(),
            user_id.clone(),
            sync_task.clone(),
        ));

        info!(api = %config.api_base_url, "Playback context ready");
        Ok(Self {
            config,
            user_id,
            event_bus,
            monitor,
            store,
            sync_task,
            subscription: Mutex::new(Some(subscription)),
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn connection_monitor(&self) -> &ConnectionMonitor {
        &self.monitor
    }

    pub fn progress_store(&self) -> Arc<ProgressStore> {
        self.store.clone()
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        self.event_bus.clone()
    }

    /// Stream of progress, connection and lease events.
    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// Start tracking `video_id`, fed by `media_source`.
    #[instrument(skip(self, media_source))]
    pub async fn open_session(
        &self,
        video_id: &str,
        media_source: Arc<dyn MediaEventSource>,
    ) -> Result<PlaybackSession> {
        self.ensure_running()?;
        let video_id = video_id.to_string();

        let tracker = ProgressTracker::new(
            self.user_id.clone(),
            video_id.clone(),
            self.store.clone(),
            self.config.clock.clone(),
        );
        let resume_position = tracker.resume_position(&self.user_id, &video_id).await;
        let tracking = tracker
            .start_tracking(media_source, self.config.lifecycle_observer.clone())
            .await?;

        let urls = UrlRefreshManager::from_config(&self.config)
            .connection_monitor(self.monitor.clone())
            .event_bus(self.event_bus.clone())
            .build();

        debug!(%video_id, ?resume_position, "Playback session opened");
        Ok(PlaybackSession {
            video_id,
            tracker,
            tracking: Some(tracking),
            urls,
            resume_position,
        })
    }

    /// Replay locally cached progress now. Returns how many entries were uploaded.
    pub async fn sync_pending(&self) -> Result<usize> {
        self.ensure_running()?;
        Ok(self.store.sync_pending(&self.user_id).await?)
    }

    /// Stop background work. Open sessions keep their own timers until closed.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.subscription.lock().take();
        if let Some(task) = self.sync_task.lock().take() {
            task.abort();
        }
        self.monitor.destroy();
        info!("Playback context shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            Err(CoreError::ShutDown)
        } else {
            Ok(())
        }
    }
}

impl Drop for PlaybackContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Listener that replays cached progress on every transition into `online`.
fn replay_when_online(
    runtime: Handle,
    store: Arc<ProgressStore>,
    user_id: String,
    sync_task: Arc<Mutex<Option<JoinHandle<()>>>>,
) -> impl Fn(ConnectionSnapshot) + Send + Sync + 'static {
    let last_status = Mutex::new(None::<ConnectionState>);

    move |snapshot| {
        let previous = last_status.lock().replace(snapshot.status);
        if !snapshot.is_online() || previous == Some(ConnectionState::Online) {
            return;
        }

        let mut task = sync_task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            debug!("Progress replay already running");
            return;
        }

        let store = store.clone();
        let user_id = user_id.clone();
        *task = Some(runtime.spawn(async move {
            match store.sync_pending(&user_id).await {
                Ok(0) => {}
                Ok(uploaded) => debug!(uploaded, "Replayed cached progress"),
                Err(e) => warn!(error = %e, "Progress replay failed"),
            }
        }));
    }
}

/// One video being watched: its progress tracker and signed URL lease.
///
/// Dropping the session detaches the listeners and cancels URL renewal
/// without a final save; [`close`](Self::close) saves first.
pub struct PlaybackSession {
    video_id: String,
    tracker: ProgressTracker,
    tracking: Option<TrackingHandle>,
    urls: UrlRefreshManager,
    resume_position: Option<f64>,
}

impl PlaybackSession {
    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    pub fn url_manager(&self) -> &UrlRefreshManager {
        &self.urls
    }

    /// Saved position to seek to when the session opened, if any.
    pub fn resume_position(&self) -> Option<f64> {
        self.resume_position
    }

    /// Hand the session a signed streaming URL to keep fresh.
    pub fn set_stream_url<F>(
        &self,
        url: impl Into<String>,
        expires_at: DateTime<Utc>,
        on_refresh: F,
    ) where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.urls
            .set_url(url, expires_at, self.video_id.clone(), on_refresh);
    }

    /// Save the current position, then tear the session down.
    pub async fn close(mut self) {
        self.tracker.flush().await;
        if let Some(tracking) = self.tracking.take() {
            tracking.stop().await;
        }
        self.urls.destroy();
        debug!(video_id = %self.video_id, "Playback session closed");
    }
}
