//! Device-local key-value storage using SQLite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::SettingsStore,
};
use sqlx::{sqlite::SqlitePool, Row};
use std::path::PathBuf;
use tracing::debug;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS kv_store (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
"#;

/// SQLite-backed implementation of [`SettingsStore`].
///
/// Plays the role `localStorage` plays in a browser: string keys, string
/// values, no expiry. An optional byte quota mimics the browser's storage
/// limit so callers can exercise their quota handling on desktop too.
pub struct SqliteSettingsStore {
    pool: SqlitePool,
    quota_bytes: Option<usize>,
}

impl SqliteSettingsStore {
    /// Create a new store backed by the database at `db_path`
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        // SQLite URLs want forward slashes even on Windows
        let path_str = db_path.to_string_lossy().replace('\\', "/");
        let db_url = format!("sqlite://{}?mode=rwc", path_str);

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to connect to DB: {}", e)))?;
        Self::create_schema(&pool).await?;

        debug!(path = ?db_path, "Initialized local key-value store");
        Ok(Self {
            pool,
            quota_bytes: None,
        })
    }

    /// Open the store from synchronous code.
    ///
    /// Runs the async constructor on a private runtime. Inside an existing
    /// runtime the work moves to a helper thread so the caller's runtime is not
    /// nested.
    pub fn open_blocking(db_path: PathBuf) -> Result<Self> {
        let open = |path: PathBuf| -> Result<Self> {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(BridgeError::Io)?;
            runtime.block_on(Self::new(path))
        };

        match tokio::runtime::Handle::try_current() {
            Ok(_) => std::thread::spawn(move || open(db_path))
                .join()
                .map_err(|_| {
                    BridgeError::OperationFailed(
                        "Settings store initialisation thread panicked".to_string(),
                    )
                })?,
            Err(_) => open(db_path),
        }
    }

    /// Create an in-memory store (for testing)
    pub async fn in_memory() -> Result<Self> {
        // A single connection keeps every query on the same in-memory database
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to connect to DB: {}", e)))?;
        Self::create_schema(&pool).await?;

        Ok(Self {
            pool,
            quota_bytes: None,
        })
    }

    /// Default on-disk location under the user's local data directory
    pub fn default_path() -> Result<PathBuf> {
        dirs::data_local_dir()
            .map(|dir| dir.join("academy").join("local-store.db"))
            .ok_or_else(|| {
                BridgeError::NotAvailable("No local data directory on this platform".to_string())
            })
    }

    /// Limit the total size of stored keys and values
    pub fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = Some(quota_bytes);
        self
    }

    async fn create_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(CREATE_TABLE)
            .execute(pool)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to create table: {}", e)))?;
        Ok(())
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    /// Bytes used by every entry except `key`
    async fn used_bytes_excluding(&self, key: &str) -> Result<usize> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(LENGTH(key) + LENGTH(value)), 0) FROM kv_store WHERE key != ?",
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| BridgeError::StorageError(format!("Failed to measure store: {}", e)))?;

        let used: i64 = row.get(0);
        Ok(used.max(0) as usize)
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn set_string(&self, key: &str, value: &str) -> Result<()> {
        if let Some(quota) = self.quota_bytes {
            let used = self.used_bytes_excluding(key).await?;
            if used + key.len() + value.len() > quota {
                return Err(BridgeError::QuotaExceeded {
                    key: key.to_string(),
                });
            }
        }

        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Self::now())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::StorageError(format!("Failed to set value: {}", e)))?;

        debug!(key = key, "Stored local value");
        Ok(())
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to get value: {}", e)))?;

        Ok(row.map(|row| row.get(0)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to delete value: {}", e)))?;

        debug!(key = key, "Deleted local value");
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT key FROM kv_store ORDER BY key")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to list keys: {}", e)))?;

        Ok(rows.into_iter().map(|row| row.get(0)).collect())
    }

    async fn clear_all(&self) -> Result<()> {
        sqlx::query("DELETE FROM kv_store")
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::StorageError(format!("Failed to clear store: {}", e)))?;

        debug!("Cleared local key-value store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_string_operations() {
        let store = SqliteSettingsStore::in_memory().await.unwrap();

        store.set_string("video_progress_a", "{}").await.unwrap();
        assert_eq!(
            store.get_string("video_progress_a").await.unwrap(),
            Some("{}".to_string())
        );
        assert!(store.has_key("video_progress_a").await.unwrap());

        store.delete("video_progress_a").await.unwrap();
        assert_eq!(store.get_string("video_progress_a").await.unwrap(), None);

        // Deleting again is fine
        store.delete("video_progress_a").await.unwrap();
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let store = SqliteSettingsStore::in_memory().await.unwrap();

        store.set_string("k", "first").await.unwrap();
        store.set_string("k", "second").await.unwrap();

        assert_eq!(store.get_string("k").await.unwrap(), Some("second".into()));
        assert_eq!(store.list_keys().await.unwrap(), vec!["k"]);
    }

    #[tokio::test]
    async fn test_list_keys_with_prefix() {
        let store = SqliteSettingsStore::in_memory().await.unwrap();

        store.set_string("video_progress_b", "1").await.unwrap();
        store.set_string("video_progress_a", "2").await.unwrap();
        store.set_string("player.volume", "0.5").await.unwrap();

        let keys = store.list_keys_with_prefix("video_progress_").await.unwrap();
        assert_eq!(keys, vec!["video_progress_a", "video_progress_b"]);

        store.clear_all().await.unwrap();
        assert!(store.list_keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_quota_rejects_oversized_writes() {
        let store = SqliteSettingsStore::in_memory().await.unwrap().with_quota(16);

        store.set_string("a", "12345").await.unwrap();
        let err = store
            .set_string("b", "this value is far too long")
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::QuotaExceeded { key } if key == "b"));

        // Rewriting an existing key only counts its new size
        store.set_string("a", "1234567890").await.unwrap();
    }

    #[test]
    fn test_open_blocking_outside_runtime() {
        let dir = std::env::temp_dir().join(format!("academy-settings-{}", uuid::Uuid::new_v4()));
        let path = dir.join("local-store.db");

        let store = SqliteSettingsStore::open_blocking(path.clone()).unwrap();
        assert!(path.exists());
        drop(store);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_open_blocking_inside_runtime() {
        let dir = std::env::temp_dir().join(format!("academy-settings-{}", uuid::Uuid::new_v4()));
        let store = SqliteSettingsStore::open_blocking(dir.join("local-store.db")).unwrap();

        store.set_string("video_progress_x", "{}").await.unwrap();
        assert!(store.has_key("video_progress_x").await.unwrap());

        drop(store);
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
