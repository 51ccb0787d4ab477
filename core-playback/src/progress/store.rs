//! Remote-first progress persistence with a device-local fallback.

use std::sync::Arc;

use core_runtime::config::ProgressConfig;
use core_runtime::events::{CoreEvent, EventBus, ProgressEvent, ProgressStoreKind};
use tracing::{debug, error, info, instrument, warn};

use super::local_cache::LocalProgressCache;
use super::record::ProgressRecord;
use super::remote::ProgressRepository;
use crate::error::Result;

/// Where a snapshot ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Remote,
    /// Remote write failed; the snapshot waits in the local cache.
    Local,
    /// Neither store accepted the snapshot.
    Failed,
}

/// Progress persistence shared by every tracker of a session context.
///
/// Writes go to the remote repository first and fall back to the local
/// cache. Reads do the same. No operation here surfaces a store failure to
/// the caller except [`sync_pending`](ProgressStore::sync_pending), whose
/// only error is an unreadable local cache.
pub struct ProgressStore {
    remote: Arc<dyn ProgressRepository>,
    local: LocalProgressCache,
    config: ProgressConfig,
    event_bus: Option<Arc<EventBus>>,
}

impl ProgressStore {
    pub fn new(
        remote: Arc<dyn ProgressRepository>,
        local: LocalProgressCache,
        config: ProgressConfig,
    ) -> Self {
        Self {
            remote,
            local,
            config,
            event_bus: None,
        }
    }

    /// Set event bus for save and sync events.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Progress(event)).ok();
        }
    }

    /// Persist `record`: remote first, local cache on any remote failure.
    #[instrument(skip(self, record), fields(video_id = %record.video_id))]
    pub async fn save(&self, record: &ProgressRecord) -> SaveOutcome {
        let outcome = match self.remote.upsert(record).await {
            Ok(()) => {
                // A stale local snapshot must not be replayed over this one later
                if let Err(e) = self.local.discard_superseded(record).await {
                    debug!(error = %e, "Could not clear cached progress");
                }
                SaveOutcome::Remote
            }
            Err(remote_err) => {
                warn!(error = %remote_err, "Remote progress save failed, caching locally");
                match self.local.save(record).await {
                    Ok(()) => SaveOutcome::Local,
                    Err(local_err) => {
                        error!(error = %local_err, "Local progress save failed");
                        self.emit(ProgressEvent::SaveFailed {
                            user_id: record.user_id.clone(),
                            video_id: record.video_id.clone(),
                            message: local_err.to_string(),
                        });
                        return SaveOutcome::Failed;
                    }
                }
            }
        };

        self.emit(ProgressEvent::Saved {
            user_id: record.user_id.clone(),
            video_id: record.video_id.clone(),
            position_seconds: record.progress_seconds,
            completed: record.completed,
            store: match outcome {
                SaveOutcome::Remote => ProgressStoreKind::Remote,
                _ => ProgressStoreKind::Local,
            },
        });
        outcome
    }

    /// Saved progress for `(user_id, video_id)`.
    ///
    /// Remote first; on a miss or an error the local cache is consulted.
    /// `None` only when neither has a record.
    #[instrument(skip(self, user_id))]
    pub async fn get_progress(&self, user_id: &str, video_id: &str) -> Option<ProgressRecord> {
        match self.remote.query(user_id, video_id).await {
            Ok(Some(record)) => return Some(record),
            Ok(None) => debug!("No remote progress, checking local cache"),
            Err(e) => warn!(error = %e, "Remote progress read failed, checking local cache"),
        }

        match self.local.load(video_id).await {
            Ok(record) => record.filter(|r| r.user_id == user_id),
            Err(e) => {
                warn!(error = %e, "Local progress read failed");
                None
            }
        }
    }

    /// Position to resume from, if the learner is far enough in and has not
    /// finished the video.
    pub async fn resume_position(&self, user_id: &str, video_id: &str) -> Option<f64> {
        self.get_progress(user_id, video_id)
            .await
            .filter(|r| !r.completed && r.progress_seconds >= self.config.resume_threshold_seconds)
            .map(|r| r.progress_seconds)
    }

    /// Replay locally cached snapshots of `user_id` to the remote store.
    ///
    /// Each entry is removed once the remote store holds it or something
    /// newer. Stops at the first remote failure. Returns how many entries
    /// were uploaded.
    #[instrument(skip(self, user_id))]
    pub async fn sync_pending(&self, user_id: &str) -> Result<usize> {
        let pending: Vec<ProgressRecord> = self
            .local
            .pending()
            .await?
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .collect();

        if pending.is_empty() {
            return Ok(0);
        }

        let mut uploaded = 0;
        for record in pending {
            match self.remote.query(&record.user_id, &record.video_id).await {
                Ok(Some(remote)) if !record.supersedes(&remote) => {
                    debug!(
                        video_id = %record.video_id,
                        "Remote progress is newer, dropping cached copy"
                    );
                    self.local.discard_superseded(&remote).await?;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "Remote store still unavailable, stopping sync");
                    break;
                }
            }

            if let Err(e) = self.remote.upsert(&record).await {
                warn!(error = %e, "Remote store still unavailable, stopping sync");
                break;
            }

            self.local.discard_superseded(&record).await?;
            uploaded += 1;
            self.emit(ProgressEvent::PendingSynced {
                user_id: record.user_id.clone(),
                video_id: record.video_id.clone(),
            });
        }

        if uploaded > 0 {
            info!(uploaded, "Synced cached progress");
        }
        Ok(uploaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlaybackError;
    use crate::progress::record::ProgressSnapshot;
    use crate::progress::remote::InMemoryProgressRepository;
    use async_trait::async_trait;
    use bridge_traits::storage::MemorySettingsStore;
    use chrono::{Duration, TimeZone, Utc};
    use core_runtime::events::EventStream;

    struct DownRepository;

    #[async_trait]
    impl ProgressRepository for DownRepository {
        async fn upsert(&self, _record: &ProgressRecord) -> Result<()> {
            Err(PlaybackError::RemoteUnavailable("connection refused".into()))
        }

        async fn query(&self, _user_id: &str, _video_id: &str) -> Result<Option<ProgressRecord>> {
            Err(PlaybackError::RemoteUnavailable("connection refused".into()))
        }
    }

    fn record(user: &str, video: &str, position: f64, minute: i64) -> ProgressRecord {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minute);
        ProgressRecord::new(
            user,
            video,
            ProgressSnapshot::new(position, Some(600.0)).unwrap(),
            0.9,
            at,
        )
    }

    fn store(
        remote: Arc<dyn ProgressRepository>,
        settings: Arc<MemorySettingsStore>,
    ) -> ProgressStore {
        ProgressStore::new(
            remote,
            LocalProgressCache::new(settings),
            ProgressConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_save_prefers_remote_and_clears_stale_cache() {
        let remote = Arc::new(InMemoryProgressRepository::new());
        let settings = Arc::new(MemorySettingsStore::new());
        let store = store(remote.clone(), settings.clone());

        let cache = LocalProgressCache::new(settings);
        cache.save(&record("u1", "v1", 20.0, 0)).await.unwrap();

        assert_eq!(store.save(&record("u1", "v1", 40.0, 1)).await, SaveOutcome::Remote);
        assert_eq!(cache.load("v1").await.unwrap(), None);
        assert_eq!(remote.len(), 1);
    }

    #[tokio::test]
    async fn test_remote_outage_uses_local_cache() {
        let settings = Arc::new(MemorySettingsStore::new());
        let bus = Arc::new(EventBus::new(16));
        let mut events = EventStream::new(bus.subscribe());
        let store = store(Arc::new(DownRepository), settings).with_event_bus(bus);

        assert_eq!(store.save(&record("u1", "v1", 75.0, 0)).await, SaveOutcome::Local);
        let found = store.get_progress("u1", "v1").await.unwrap();
        assert_eq!(found.progress_seconds, 75.0);

        // Cached records belong to one learner
        assert_eq!(store.get_progress("u2", "v1").await, None);

        match events.recv().await.unwrap() {
            CoreEvent::Progress(ProgressEvent::Saved { store, .. }) => {
                assert_eq!(store, ProgressStoreKind::Local)
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_both_stores_failing_emits_save_failed() {
        let settings = Arc::new(MemorySettingsStore::new().with_quota(8));
        let bus = Arc::new(EventBus::new(16));
        let mut events = EventStream::new(bus.subscribe());
        let store = store(Arc::new(DownRepository), settings).with_event_bus(bus);

        assert_eq!(store.save(&record("u1", "v1", 75.0, 0)).await, SaveOutcome::Failed);
        assert!(matches!(
            events.recv().await.unwrap(),
            CoreEvent::Progress(ProgressEvent::SaveFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_sync_pending_skips_newer_remote() {
        let remote = Arc::new(InMemoryProgressRepository::new());
        let settings = Arc::new(MemorySettingsStore::new());
        let store = store(remote.clone(), settings.clone());
        let cache = LocalProgressCache::new(settings);

        // v1: remote already has a later save. v2: only cached.
        remote.upsert(&record("u1", "v1", 300.0, 10)).await.unwrap();
        cache.save(&record("u1", "v1", 100.0, 0)).await.unwrap();
        cache.save(&record("u1", "v2", 50.0, 0)).await.unwrap();
        cache.save(&record("u2", "v3", 10.0, 0)).await.unwrap();

        assert_eq!(store.sync_pending("u1").await.unwrap(), 1);

        let v1 = remote.query("u1", "v1").await.unwrap().unwrap();
        assert_eq!(v1.progress_seconds, 300.0);
        let v2 = remote.query("u1", "v2").await.unwrap().unwrap();
        assert_eq!(v2.progress_seconds, 50.0);

        let left: Vec<String> = cache
            .pending()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.video_id)
            .collect();
        assert_eq!(left, vec!["v3"]);
    }

    #[tokio::test]
    async fn test_sync_pending_keeps_cache_while_remote_down() {
        let settings = Arc::new(MemorySettingsStore::new());
        let store = store(Arc::new(DownRepository), settings.clone());
        LocalProgressCache::new(settings)
            .save(&record("u1", "v1", 100.0, 0))
            .await
            .unwrap();

        assert_eq!(store.sync_pending("u1").await.unwrap(), 0);
        assert!(store.get_progress("u1", "v1").await.is_some());
    }

    #[tokio::test]
    async fn test_resume_position_rules() {
        let remote = Arc::new(InMemoryProgressRepository::new());
        let store = store(remote.clone(), Arc::new(MemorySettingsStore::new()));

        remote.upsert(&record("u1", "early", 4.0, 0)).await.unwrap();
        remote.upsert(&record("u1", "middle", 120.0, 0)).await.unwrap();
        remote.upsert(&record("u1", "done", 590.0, 0)).await.unwrap();

        assert_eq!(store.resume_position("u1", "early").await, None);
        assert_eq!(store.resume_position("u1", "middle").await, Some(120.0));
        assert_eq!(store.resume_position("u1", "done").await, None);
        assert_eq!(store.resume_position("u1", "unknown").await, None);
    }
}
