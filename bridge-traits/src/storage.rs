//! Device-local Storage Abstraction
//!
//! Provides the key-value store the core uses for data that must survive a
//! page reload or app restart without the remote backend (e.g. progress
//! snapshots that could not be uploaded).

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{BridgeError, Result};

/// Key-value settings storage trait
///
/// Abstracts platform-specific device storage:
/// - Web: `localStorage`
/// - Desktop: SQLite-backed key-value table
/// - Mobile: `UserDefaults` / `SharedPreferences`
///
/// Values are plain strings; callers that need structure store JSON.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::SettingsStore;
///
/// async fn remember_volume(store: &dyn SettingsStore) -> Result<()> {
///     store.set_string("player.volume", "0.8").await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Store a string value, replacing any previous value for `key`
    ///
    /// # Errors
    ///
    /// Implementations report a full device store as
    /// [`BridgeError::QuotaExceeded`](crate::error::BridgeError::QuotaExceeded).
    async fn set_string(&self, key: &str, value: &str) -> Result<()>;

    /// Retrieve a string value
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Delete a value. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if a key exists
    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get_string(key).await?.is_some())
    }

    /// List all keys
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// List keys starting with `prefix`
    async fn list_keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .list_keys()
            .await?
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect())
    }

    /// Clear all values
    async fn clear_all(&self) -> Result<()>;
}

/// Process-local [`SettingsStore`] for tests and hosts without durable storage.
///
/// Values are lost when the store is dropped. An optional byte quota counts
/// key and value lengths the way a browser's `localStorage` limit does.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    entries: RwLock<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    fn poisoned() -> BridgeError {
        BridgeError::StorageError("settings lock poisoned".to_string())
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        if let Some(quota) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + value.len() > quota {
                return Err(BridgeError::QuotaExceeded {
                    key: key.to_string(),
                });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries.keys().cloned().collect())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemorySettingsStore::new();
        store.set_string("video_progress_b", "1").await.unwrap();
        store.set_string("video_progress_a", "2").await.unwrap();
        store.set_string("player.volume", "0.5").await.unwrap();

        assert_eq!(
            store.list_keys_with_prefix("video_progress_").await.unwrap(),
            vec!["video_progress_a", "video_progress_b"]
        );

        store.delete("video_progress_a").await.unwrap();
        assert!(!store.has_key("video_progress_a").await.unwrap());

        store.clear_all().await.unwrap();
        assert!(store.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_quota() {
        let store = MemorySettingsStore::new().with_quota(10);
        store.set_string("a", "1234").await.unwrap();

        let err = store.set_string("b", "123456789").await.unwrap_err();
        assert!(matches!(err, BridgeError::QuotaExceeded { key } if key == "b"));

        // Replacing a value only counts its new size
        store.set_string("a", "12345678").await.unwrap();
    }
}
