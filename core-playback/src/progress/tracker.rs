//! Per-video progress tracker.

use std::sync::{Arc, Weak};

use bridge_traits::lifecycle::{LifecycleObserver, LifecycleState};
use bridge_traits::playback::{MediaEvent, MediaEventSource};
use bridge_traits::time::Clock;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::record::{ProgressRecord, ProgressSnapshot};
use super::store::{ProgressStore, SaveOutcome};
use crate::error::Result;

/// Tracks watch progress of one learner on one video.
///
/// Position updates that move at least `save_threshold_seconds` away from the
/// last saved position open a debounce window of `save_debounce_ms`. Further
/// updates inside the window replace the pending snapshot; when the window
/// closes the latest one is saved. The window is not restarted by later
/// updates, so continuous playback still saves about once per window.
///
/// Pause, hidden and terminating signals save immediately and discard any
/// pending window. Saves never raise errors to the caller: a remote failure
/// falls back to the local cache inside [`ProgressStore`].
///
/// Cloning is cheap and every clone drives the same tracker.
#[derive(Clone)]
pub struct ProgressTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    user_id: String,
    video_id: String,
    store: Arc<ProgressStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<TrackerState>,
}

#[derive(Default)]
struct TrackerState {
    last_saved_position: f64,
    latest: Option<ProgressSnapshot>,
    pending: Option<PendingSave>,
    next_pending_id: u64,
}

struct PendingSave {
    id: u64,
    snapshot: ProgressSnapshot,
    timer: JoinHandle<()>,
}

impl ProgressTracker {
    pub fn new(
        user_id: impl Into<String>,
        video_id: impl Into<String>,
        store: Arc<ProgressStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                user_id: user_id.into(),
                video_id: video_id.into(),
                store,
                clock,
                state: Mutex::new(TrackerState::default()),
            }),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    pub fn video_id(&self) -> &str {
        &self.inner.video_id
    }

    /// Position of the most recent save handed to the store.
    pub fn last_saved_position(&self) -> f64 {
        self.inner.state.lock().last_saved_position
    }

    /// Whether a debounced save is waiting for its window to close.
    pub fn has_pending_save(&self) -> bool {
        self.inner.state.lock().pending.is_some()
    }

    /// Attach to a media element and, optionally, to page lifecycle signals.
    ///
    /// Listeners run until the returned handle is stopped or dropped.
    pub async fn start_tracking(
        &self,
        media_source: Arc<dyn MediaEventSource>,
        lifecycle: Option<Arc<dyn LifecycleObserver>>,
    ) -> Result<TrackingHandle> {
        let cancel = CancellationToken::new();
        let mut tasks = Vec::with_capacity(2);

        let mut media_events = media_source.subscribe().await?;
        let tracker = self.clone();
        let token = cancel.clone();
        tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    event = media_events.next() => match event {
                        Some(event) => tracker.handle_media_event(event).await,
                        None => break,
                    },
                }
            }
            debug!(video_id = %tracker.video_id(), "Media listener stopped");
        }));

        if let Some(observer) = lifecycle {
            let mut lifecycle_events = observer.subscribe_changes().await?;
            let tracker = self.clone();
            let token = cancel.clone();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        state = lifecycle_events.next() => match state {
                            Some(state) => tracker.handle_lifecycle(state).await,
                            None => break,
                        },
                    }
                }
            }));
        }

        debug!(
            user_id = %self.inner.user_id,
            video_id = %self.inner.video_id,
            "Progress tracking started"
        );
        Ok(TrackingHandle { cancel, tasks })
    }

    /// Dispatch a media element event.
    pub async fn handle_media_event(&self, event: MediaEvent) {
        match event {
            MediaEvent::TimeUpdate {
                position_seconds,
                duration_seconds,
            } => self.handle_time_update(position_seconds, duration_seconds),
            MediaEvent::Pause {
                position_seconds,
                duration_seconds,
            } => self.handle_pause(position_seconds, duration_seconds).await,
        }
    }

    /// Record a playback position and schedule a save if it moved far enough.
    ///
    /// # Panics
    ///
    /// Panics outside a Tokio runtime when a save window has to be opened.
    pub fn handle_time_update(&self, position_seconds: f64, duration_seconds: Option<f64>) {
        let snapshot = match ProgressSnapshot::new(position_seconds, duration_seconds) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Ignoring time update");
                return;
            }
        };

        let threshold = self.inner.store.config().save_threshold_seconds;
        let mut state = self.inner.state.lock();
        state.latest = Some(snapshot);

        if (snapshot.position_seconds - state.last_saved_position).abs() < threshold {
            return;
        }

        if let Some(pending) = state.pending.as_mut() {
            pending.snapshot = snapshot;
            return;
        }

        let id = state.next_pending_id;
        state.next_pending_id += 1;
        let debounce = self.inner.store.config().save_debounce();
        let inner = Arc::downgrade(&self.inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            TrackerInner::flush_window(inner, id).await;
        });
        state.pending = Some(PendingSave {
            id,
            snapshot,
            timer,
        });
    }

    /// Save the paused position now.
    pub async fn handle_pause(&self, position_seconds: f64, duration_seconds: Option<f64>) {
        match ProgressSnapshot::new(position_seconds, duration_seconds) {
            Ok(snapshot) => {
                self.inner.save_now(snapshot).await;
            }
            Err(e) => warn!(error = %e, "Ignoring pause event"),
        }
    }

    /// Save the last observed position when the page is hidden or unloading.
    pub async fn handle_lifecycle(&self, state: LifecycleState) {
        match state {
            LifecycleState::Hidden | LifecycleState::Terminating => {
                debug!(?state, "Saving progress on lifecycle change");
                self.flush().await;
            }
            LifecycleState::Visible => {}
        }
    }

    /// Save the last observed position immediately.
    ///
    /// Returns `None` when no position has been observed yet.
    pub async fn flush(&self) -> Option<SaveOutcome> {
        let latest = self.inner.state.lock().latest;
        match latest {
            Some(snapshot) => Some(self.inner.save_now(snapshot).await),
            None => None,
        }
    }

    /// Saved progress for any video of any learner, remote first.
    pub async fn get_progress(&self, user_id: &str, video_id: &str) -> Option<ProgressRecord> {
        self.inner.store.get_progress(user_id, video_id).await
    }

    /// Where playback of `video_id` should resume for `user_id`.
    pub async fn resume_position(&self, user_id: &str, video_id: &str) -> Option<f64> {
        self.inner.store.resume_position(user_id, video_id).await
    }

    /// Upload this learner's locally cached snapshots.
    pub async fn sync_pending(&self) -> Result<usize> {
        self.inner.store.sync_pending(&self.inner.user_id).await
    }
}

impl TrackerInner {
    async fn flush_window(inner: Weak<TrackerInner>, id: u64) {
        let Some(inner) = inner.upgrade() else {
            return;
        };

        let snapshot = {
            let mut state = inner.state.lock();
            match state.pending.take() {
                Some(pending) if pending.id == id => {
                    state.last_saved_position = pending.snapshot.position_seconds;
                    pending.snapshot
                }
                other => {
                    // Superseded by a forced save
                    state.pending = other;
                    return;
                }
            }
        };

        inner.persist(snapshot).await;
    }

    async fn save_now(&self, snapshot: ProgressSnapshot) -> SaveOutcome {
        {
            let mut state = self.state.lock();
            if let Some(pending) = state.pending.take() {
                pending.timer.abort();
            }
            state.latest = Some(snapshot);
            state.last_saved_position = snapshot.position_seconds;
        }
        self.persist(snapshot).await
    }

    #[instrument(
        skip(self, snapshot),
        fields(video_id = %self.video_id, position = snapshot.position_seconds)
    )]
    async fn persist(&self, snapshot: ProgressSnapshot) -> SaveOutcome {
        let record = ProgressRecord::new(
            self.user_id.clone(),
            self.video_id.clone(),
            snapshot,
            self.store.config().completion_ratio,
            self.clock.now(),
        );
        self.store.save(&record).await
    }
}

impl Drop for TrackerInner {
    fn drop(&mut self) {
        if let Some(pending) = self.state.get_mut().pending.take() {
            pending.timer.abort();
        }
    }
}

/// Listener tasks attached by [`ProgressTracker::start_tracking`].
///
/// Dropping the handle detaches the listeners. A save already in flight
/// completes; a debounce window already open still fires.
pub struct TrackingHandle {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl TrackingHandle {
    /// Detach the listeners and wait for them to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && self.tasks.iter().any(|t| !t.is_finished())
    }
}

impl Drop for TrackingHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
