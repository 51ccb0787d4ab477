//! Remote progress store.
//!
//! [`RestProgressRepository`] talks to a PostgREST-style table endpoint:
//!
//! ```text
//! POST {base}/rest/v1/video_progress?on_conflict=user_id,video_id
//!      Prefer: resolution=merge-duplicates,return=minimal
//! GET  {base}/rest/v1/video_progress?user_id=eq.U&video_id=eq.V&limit=1
//! ```
//!
//! [`InMemoryProgressRepository`] keeps records in process and applies
//! last-write-wins by `last_watched_at`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use chrono::{DateTime, Utc};
use core_runtime::config::CoreConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::record::ProgressRecord;
use crate::error::{PlaybackError, Result};

/// Durable per-user progress storage.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Insert or replace the record for `(user_id, video_id)`.
    async fn upsert(&self, record: &ProgressRecord) -> Result<()>;

    async fn query(&self, user_id: &str, video_id: &str) -> Result<Option<ProgressRecord>>;
}

/// Row shape of the progress table.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProgressRow {
    user_id: String,
    video_id: String,
    progress_seconds: f64,
    #[serde(default)]
    duration_seconds: Option<f64>,
    completed: bool,
    last_watched_at: DateTime<Utc>,
}

impl From<&ProgressRecord> for ProgressRow {
    fn from(record: &ProgressRecord) -> Self {
        Self {
            user_id: record.user_id.clone(),
            video_id: record.video_id.clone(),
            progress_seconds: record.progress_seconds,
            duration_seconds: record.duration_seconds,
            completed: record.completed,
            last_watched_at: record.last_watched_at,
        }
    }
}

impl From<ProgressRow> for ProgressRecord {
    fn from(row: ProgressRow) -> Self {
        Self {
            user_id: row.user_id,
            video_id: row.video_id,
            progress_seconds: row.progress_seconds,
            duration_seconds: row.duration_seconds,
            completed: row.completed,
            last_watched_at: row.last_watched_at,
        }
    }
}

// ============================================================================
// REST implementation
// ============================================================================

/// Progress repository backed by the hosted REST table.
pub struct RestProgressRepository {
    http_client: Arc<dyn HttpClient>,
    table_url: String,
    api_key: Option<String>,
    access_token: Option<String>,
    retry_policy: RetryPolicy,
}

impl RestProgressRepository {
    /// `table_url` is the table endpoint, e.g. `https://x.example.co/rest/v1/video_progress`.
    pub fn new(http_client: Arc<dyn HttpClient>, table_url: impl Into<String>) -> Self {
        Self {
            http_client,
            table_url: table_url.into(),
            api_key: None,
            access_token: None,
            // Failed saves fall back to the local cache, so fail fast
            retry_policy: RetryPolicy::no_retry(),
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        let mut repository = Self::new(config.http_client.clone(), config.progress_table_url());
        repository.api_key = config.api_key.clone();
        repository.access_token = config.access_token.clone();
        repository
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn authorize(&self, mut request: HttpRequest) -> HttpRequest {
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key.clone());
        }
        match (&self.access_token, &self.api_key) {
            (Some(token), _) | (None, Some(token)) => request.bearer_token(token.clone()),
            (None, None) => request,
        }
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let response = self
            .http_client
            .execute_with_retry(self.authorize(request), self.retry_policy.clone())
            .await
            .map_err(|e| PlaybackError::RemoteUnavailable(e.to_string()))?;

        if response.is_success() {
            return Ok(response);
        }

        let message = response.text().unwrap_or_default();
        if response.is_server_error() {
            Err(PlaybackError::RemoteUnavailable(format!(
                "HTTP {}: {}",
                response.status, message
            )))
        } else {
            Err(PlaybackError::RemoteRejected {
                status: response.status,
                message,
            })
        }
    }
}

#[async_trait]
impl ProgressRepository for RestProgressRepository {
    #[instrument(skip(self, record), fields(video_id = %record.video_id))]
    async fn upsert(&self, record: &ProgressRecord) -> Result<()> {
        let url = format!("{}?on_conflict=user_id,video_id", self.table_url);
        let request = HttpRequest::new(HttpMethod::Post, url)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&ProgressRow::from(record))?;

        self.send(request).await?;
        debug!(position = record.progress_seconds, "Upserted remote progress");
        Ok(())
    }

    #[instrument(skip(self, user_id))]
    async fn query(&self, user_id: &str, video_id: &str) -> Result<Option<ProgressRecord>> {
        let url = format!(
            "{}?select=*&user_id=eq.{}&video_id=eq.{}&limit=1",
            self.table_url,
            urlencoding::encode(user_id),
            urlencoding::encode(video_id)
        );
        let request = HttpRequest::new(HttpMethod::Get, url).header("Accept", "application/json");

        let response = self.send(request).await?;
        let rows: Vec<ProgressRow> = response
            .json()
            .map_err(|e| PlaybackError::InvalidResponse(e.to_string()))?;

        Ok(rows.into_iter().next().map(ProgressRecord::from))
    }
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// Process-local repository with last-write-wins semantics.
#[derive(Default)]
pub struct InMemoryProgressRepository {
    records: Mutex<HashMap<(String, String), ProgressRecord>>,
}

impl InMemoryProgressRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl ProgressRepository for InMemoryProgressRepository {
    async fn upsert(&self, record: &ProgressRecord) -> Result<()> {
        let key = (record.user_id.clone(), record.video_id.clone());
        let mut records = self.records.lock();

        match records.get(&key) {
            Some(existing) if !record.supersedes(existing) => {
                debug!(video_id = %record.video_id, "Ignoring older progress write");
            }
            _ => {
                records.insert(key, record.clone());
            }
        }
        Ok(())
    }

    async fn query(&self, user_id: &str, video_id: &str) -> Result<Option<ProgressRecord>> {
        Ok(self
            .records
            .lock()
            .get(&(user_id.to_string(), video_id.to_string()))
            .cloned())
    }
}
