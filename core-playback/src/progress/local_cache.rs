//! Device-local progress cache.
//!
//! Holds the latest snapshot per video when the remote store could not take
//! it. Entries live under `video_progress_<videoId>` as camelCase JSON and
//! never expire; they are removed once replayed to the remote store.

use std::sync::Arc;

use bridge_traits::{BridgeError, SettingsStore};
use tracing::{debug, warn};

use super::record::ProgressRecord;
use crate::error::{PlaybackError, Result};

/// Key prefix shared by every cached progress entry.
pub const LOCAL_KEY_PREFIX: &str = "video_progress_";

/// Progress cache over the host's key-value store.
#[derive(Clone)]
pub struct LocalProgressCache {
    store: Arc<dyn SettingsStore>,
}

impl LocalProgressCache {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    pub fn key_for(video_id: &str) -> String {
        format!("{}{}", LOCAL_KEY_PREFIX, video_id)
    }

    /// Store `record`, replacing any earlier snapshot for the same video.
    pub async fn save(&self, record: &ProgressRecord) -> Result<()> {
        let key = Self::key_for(&record.video_id);
        let value = serde_json::to_string(record)?;

        self.store
            .set_string(&key, &value)
            .await
            .map_err(|e| match e {
                BridgeError::QuotaExceeded { key } => PlaybackError::QuotaExceeded { key },
                other => PlaybackError::LocalCache(other.to_string()),
            })?;

        debug!(video_id = %record.video_id, "Cached progress locally");
        Ok(())
    }

    pub async fn load(&self, video_id: &str) -> Result<Option<ProgressRecord>> {
        let key = Self::key_for(video_id);
        let Some(value) = self
            .store
            .get_string(&key)
            .await
            .map_err(|e| PlaybackError::LocalCache(e.to_string()))?
        else {
            return Ok(None);
        };

        Ok(Some(serde_json::from_str(&value)?))
    }

    pub async fn remove(&self, video_id: &str) -> Result<()> {
        self.store
            .delete(&Self::key_for(video_id))
            .await
            .map_err(|e| PlaybackError::LocalCache(e.to_string()))
    }

    /// Drop the cached entry for `record.video_id` unless it is newer than
    /// `record`. Returns whether an entry was removed.
    pub async fn discard_superseded(&self, record: &ProgressRecord) -> Result<bool> {
        match self.load(&record.video_id).await {
            Ok(Some(cached)) if cached.last_watched_at > record.last_watched_at => Ok(false),
            Ok(None) => Ok(false),
            // Unreadable entries are dropped too
            Ok(Some(_)) | Err(PlaybackError::Serialization(_)) => {
                self.remove(&record.video_id).await?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Every cached record. Unreadable entries are skipped.
    pub async fn pending(&self) -> Result<Vec<ProgressRecord>> {
        let keys = self
            .store
            .list_keys_with_prefix(LOCAL_KEY_PREFIX)
            .await
            .map_err(|e| PlaybackError::LocalCache(e.to_string()))?;

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            let video_id = &key[LOCAL_KEY_PREFIX.len()..];
            match self.load(video_id).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable cached progress"),
            }
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::record::ProgressSnapshot;
    use bridge_desktop::SqliteSettingsStore;

    fn record(video_id: &str, position: f64) -> ProgressRecord {
        ProgressRecord::new(
            "user-1",
            video_id,
            ProgressSnapshot::new(position, Some(600.0)).unwrap(),
            0.9,
            "2026-03-01T10:00:00Z".parse().unwrap(),
        )
    }

    async fn cache() -> (LocalProgressCache, Arc<SqliteSettingsStore>) {
        let store = Arc::new(SqliteSettingsStore::in_memory().await.unwrap());
        (LocalProgressCache::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let (cache, store) = cache().await;

        cache.save(&record("v1", 42.0)).await.unwrap();
        assert_eq!(cache.load("v1").await.unwrap(), Some(record("v1", 42.0)));
        assert!(store.has_key("video_progress_v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_save_supersedes_previous_snapshot() {
        let (cache, _) = cache().await;

        cache.save(&record("v1", 42.0)).await.unwrap();
        cache.save(&record("v1", 84.0)).await.unwrap();

        let loaded = cache.load("v1").await.unwrap().unwrap();
        assert_eq!(loaded.progress_seconds, 84.0);
        assert_eq!(cache.pending().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_entry_is_none() {
        let (cache, _) = cache().await;
        assert_eq!(cache.load("nothing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_pending_skips_corrupt_and_foreign_keys() {
        let (cache, store) = cache().await;

        cache.save(&record("v1", 10.0)).await.unwrap();
        store
            .set_string("video_progress_broken", "{not json")
            .await
            .unwrap();
        store.set_string("player.volume", "0.8").await.unwrap();

        let pending = cache.pending().await.unwrap();
        assert_eq!(pending, vec![record("v1", 10.0)]);

        cache.remove("v1").await.unwrap();
        assert_eq!(cache.load("v1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_discard_superseded_keeps_newer_entries() {
        let (cache, _) = cache().await;
        let older = record("v1", 10.0);
        let mut newer = record("v1", 20.0);
        newer.last_watched_at = older.last_watched_at + chrono::Duration::seconds(30);

        cache.save(&newer).await.unwrap();
        assert!(!cache.discard_superseded(&older).await.unwrap());
        assert!(cache.load("v1").await.unwrap().is_some());

        assert!(cache.discard_superseded(&newer).await.unwrap());
        assert_eq!(cache.load("v1").await.unwrap(), None);
        assert!(!cache.discard_superseded(&newer).await.unwrap());
    }

    #[tokio::test]
    async fn test_quota_surfaces_as_quota_error() {
        let store = Arc::new(SqliteSettingsStore::in_memory().await.unwrap().with_quota(32));
        let cache = LocalProgressCache::new(store);

        let err = cache.save(&record("v1", 10.0)).await.unwrap_err();
        assert!(err.is_quota_error());
    }
}
