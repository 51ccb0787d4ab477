//! # Core Configuration Module
//!
//! Configuration for the lesson playback core.
//!
//! ## Overview
//!
//! A builder collects the host bridges and service endpoints, fills in
//! defaults, and validates everything before any component starts. Missing
//! capabilities fail fast with an actionable message.
//!
//! ## Required Dependencies
//!
//! - `HttpClient` - remote progress store and URL refresh endpoint
//! - `SettingsStore` - device-local progress cache
//! - `NetworkMonitor` - online/offline signals for the connection monitor
//!
//! With the `desktop-shims` feature the builder injects
//! `ReqwestHttpClient`, `SqliteSettingsStore` and `DesktopNetworkMonitor` when
//! none are provided.
//!
//! ## Optional Dependencies
//!
//! - `LifecycleObserver` - page hidden / unload signals (forced saves)
//! - `Clock` - time source, defaults to [`SystemClock`]
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, ProgressConfig};
//!
//! let config = CoreConfig::builder()
//!     .api_base_url("https://project.example.co")
//!     .api_key("public-anon-key")
//!     .progress(ProgressConfig {
//!         save_debounce_ms: 500,
//!         ..ProgressConfig::default()
//!     })
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    Clock, HttpClient, LifecycleObserver, NetworkMonitor, SettingsStore, SystemClock,
};
use serde::{Deserialize, Serialize};
#[cfg(feature = "desktop-shims")]
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Table holding one progress row per `(user_id, video_id)`.
pub const DEFAULT_PROGRESS_TABLE: &str = "video_progress";

/// Path of the signed URL refresh function, relative to the API base URL.
pub const DEFAULT_REFRESH_PATH: &str = "/functions/v1/refresh-video-url";

/// `min(base × 2^(attempt − 1), cap)`. Attempt 0 is treated as attempt 1.
pub fn exponential_backoff(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .map_or(cap, |delay| delay.min(cap))
}

// ============================================================================
// Tuning blocks
// ============================================================================

/// Progress tracker tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Minimum distance from the last saved position before a time update
    /// schedules a save.
    pub save_threshold_seconds: f64,
    /// Fraction of the duration at which a video counts as completed.
    pub completion_ratio: f64,
    /// Quiet window that coalesces qualifying time updates into one save.
    pub save_debounce_ms: u64,
    /// Saved positions below this are not offered as a resume point.
    pub resume_threshold_seconds: f64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            save_threshold_seconds: 5.0,
            completion_ratio: 0.9,
            save_debounce_ms: 1_000,
            resume_threshold_seconds: 10.0,
        }
    }
}

impl ProgressConfig {
    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.save_threshold_seconds.is_finite() || self.save_threshold_seconds < 0.0 {
            return Err(Error::Config(
                "progress.save_threshold_seconds must be a non-negative number".to_string(),
            ));
        }

        if !(self.completion_ratio > 0.0 && self.completion_ratio <= 1.0) {
            return Err(Error::Config(
                "progress.completion_ratio must be in (0, 1]".to_string(),
            ));
        }

        if !self.resume_threshold_seconds.is_finite() || self.resume_threshold_seconds < 0.0 {
            return Err(Error::Config(
                "progress.resume_threshold_seconds must be a non-negative number".to_string(),
            ));
        }

        Ok(())
    }
}

/// Connection monitor tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Retries allowed before the monitor settles offline.
    pub max_retries: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            retry_base_delay_ms: 2_000,
            retry_max_delay_ms: 30_000,
            max_retries: 5,
        }
    }
}

impl ConnectionConfig {
    /// Delay before reconnect attempt `retry_count`.
    pub fn retry_delay(&self, retry_count: u32) -> Duration {
        exponential_backoff(
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
            retry_count,
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry_base_delay_ms == 0 {
            return Err(Error::Config(
                "connection.retry_base_delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(Error::Config(
                "connection.retry_max_delay_ms must not be below retry_base_delay_ms".to_string(),
            ));
        }

        Ok(())
    }
}

/// Signed URL refresh tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlRefreshConfig {
    /// How long before expiry the refresh fires.
    pub refresh_buffer_secs: u64,
    /// Failed refreshes retried before the lease is left stale.
    pub max_refresh_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for UrlRefreshConfig {
    fn default() -> Self {
        Self {
            refresh_buffer_secs: 5 * 60,
            max_refresh_retries: 5,
            retry_base_delay_ms: 2_000,
            retry_max_delay_ms: 30_000,
        }
    }
}

impl UrlRefreshConfig {
    pub fn refresh_buffer(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_buffer_secs.min(i64::MAX as u64 / 1_000) as i64)
    }

    pub fn retry_delay(&self, attempt: u32) -> Duration {
        exponential_backoff(
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
            attempt,
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry_base_delay_ms == 0 {
            return Err(Error::Config(
                "url_refresh.retry_base_delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(Error::Config(
                "url_refresh.retry_max_delay_ms must not be below retry_base_delay_ms"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// CoreConfig
// ============================================================================

/// Core configuration for the lesson playback core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Base URL of the backend (REST tables and functions live below it)
    pub api_base_url: String,
    /// Public API key sent as the `apikey` header
    pub api_key: Option<String>,
    /// Bearer token of the signed-in learner, when the host has one
    pub access_token: Option<String>,
    /// Absolute URL of the signed URL refresh endpoint
    pub refresh_endpoint: String,
    pub progress_table: String,

    pub http_client: Arc<dyn HttpClient>,
    pub settings_store: Arc<dyn SettingsStore>,
    pub network_monitor: Arc<dyn NetworkMonitor>,
    pub lifecycle_observer: Option<Arc<dyn LifecycleObserver>>,
    pub clock: Arc<dyn Clock>,

    pub progress: ProgressConfig,
    pub connection: ConnectionConfig,
    pub url_refresh: UrlRefreshConfig,
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("refresh_endpoint", &self.refresh_endpoint)
            .field("progress_table", &self.progress_table)
            .field("lifecycle_observer", &self.lifecycle_observer.is_some())
            .field("progress", &self.progress)
            .field("connection", &self.connection)
            .field("url_refresh", &self.url_refresh)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish_non_exhaustive()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates endpoints and tuning blocks.
    pub fn validate(&self) -> Result<()> {
        if !is_http_url(&self.api_base_url) {
            return Err(Error::Config(format!(
                "API base URL must start with http:// or https:// (got '{}')",
                self.api_base_url
            )));
        }

        if !is_http_url(&self.refresh_endpoint) {
            return Err(Error::Config(format!(
                "Refresh endpoint must start with http:// or https:// (got '{}')",
                self.refresh_endpoint
            )));
        }

        if self.progress_table.trim().is_empty() {
            return Err(Error::Config("Progress table cannot be empty".to_string()));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        self.progress.validate()?;
        self.connection.validate()?;
        self.url_refresh.validate()?;

        Ok(())
    }

    /// `{api_base_url}/rest/v1/{progress_table}`
    pub fn progress_table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.api_base_url, self.progress_table)
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

// ============================================================================
// Platform defaults
// ============================================================================

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Ok(Arc::new(bridge_desktop::ReqwestHttpClient::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for the remote progress store \
                 and URL refresh endpoint. Desktop: enable the 'desktop-shims' feature to use \
                 ReqwestHttpClient. Web: inject a fetch-based client."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_settings_store(
    local_store_path: Option<PathBuf>,
) -> Result<Arc<dyn SettingsStore>> {
    use bridge_desktop::SqliteSettingsStore;

    let path = match local_store_path {
        Some(path) => path,
        None => SqliteSettingsStore::default_path().map_err(|e| Error::CapabilityMissing {
            capability: "SettingsStore".to_string(),
            message: format!("Cannot place the default local store: {}", e),
        })?,
    };

    let store = SqliteSettingsStore::open_blocking(path)?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_settings_store() -> Result<Arc<dyn SettingsStore>> {
    Err(Error::CapabilityMissing {
        capability: "SettingsStore".to_string(),
        message: "SettingsStore implementation is required for the local progress cache. \
                 Desktop: enable the 'desktop-shims' feature to use SqliteSettingsStore. \
                 Web: inject a localStorage-backed store."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_network_monitor() -> Result<Arc<dyn NetworkMonitor>> {
    Ok(Arc::new(bridge_desktop::DesktopNetworkMonitor::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_network_monitor() -> Result<Arc<dyn NetworkMonitor>> {
    Err(Error::CapabilityMissing {
        capability: "NetworkMonitor".to_string(),
        message: "NetworkMonitor implementation is required for connection state. \
                 Desktop: enable the 'desktop-shims' feature to use DesktopNetworkMonitor. \
                 Web: inject a monitor fed by the window online/offline events."
            .to_string(),
    })
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    api_base_url: Option<String>,
    api_key: Option<String>,
    access_token: Option<String>,
    refresh_endpoint: Option<String>,
    progress_table: Option<String>,
    #[cfg(feature = "desktop-shims")]
    local_store_path: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    settings_store: Option<Arc<dyn SettingsStore>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    lifecycle_observer: Option<Arc<dyn LifecycleObserver>>,
    clock: Option<Arc<dyn Clock>>,
    progress: ProgressConfig,
    connection: ConnectionConfig,
    url_refresh: UrlRefreshConfig,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the backend base URL. A trailing slash is dropped.
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        let url: String = url.into();
        self.api_base_url = Some(url.trim_end_matches('/').to_string());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Overrides the refresh endpoint.
    ///
    /// A value starting with `/` is resolved against the API base URL.
    pub fn refresh_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.refresh_endpoint = Some(endpoint.into());
        self
    }

    pub fn progress_table(mut self, table: impl Into<String>) -> Self {
        self.progress_table = Some(table.into());
        self
    }

    /// Location of the default SQLite local store.
    #[cfg(feature = "desktop-shims")]
    pub fn local_store_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.local_store_path = Some(path.into());
        self
    }

    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings_store = Some(store);
        self
    }

    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    pub fn lifecycle_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.lifecycle_observer = Some(observer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn progress(mut self, progress: ProgressConfig) -> Self {
        self.progress = progress;
        self
    }

    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    pub fn url_refresh(mut self, url_refresh: UrlRefreshConfig) -> Self {
        self.url_refresh = url_refresh;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds and validates the final `CoreConfig`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when the base URL is missing or a value is invalid
    /// - [`Error::CapabilityMissing`] when a required bridge has no default
    pub fn build(self) -> Result<CoreConfig> {
        let api_base_url = self.api_base_url.ok_or_else(|| {
            Error::Config("API base URL is required. Use .api_base_url() to set it.".to_string())
        })?;

        let refresh_endpoint = match self.refresh_endpoint {
            Some(endpoint) if endpoint.starts_with('/') => {
                format!("{}{}", api_base_url, endpoint)
            }
            Some(endpoint) => endpoint,
            None => format!("{}{}", api_base_url, DEFAULT_REFRESH_PATH),
        };

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let settings_store = match self.settings_store {
            Some(store) => store,
            #[cfg(feature = "desktop-shims")]
            None => provide_default_settings_store(self.local_store_path)?,
            #[cfg(not(feature = "desktop-shims"))]
            None => provide_default_settings_store()?,
        };

        let network_monitor = match self.network_monitor {
            Some(monitor) => monitor,
            None => provide_default_network_monitor()?,
        };

        let config = CoreConfig {
            api_base_url,
            api_key: self.api_key,
            access_token: self.access_token,
            refresh_endpoint,
            progress_table: self
                .progress_table
                .unwrap_or_else(|| DEFAULT_PROGRESS_TABLE.to_string()),
            http_client,
            settings_store,
            network_monitor,
            lifecycle_observer: self.lifecycle_observer,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            progress: self.progress,
            connection: self.connection,
            url_refresh: self.url_refresh,
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use bridge_traits::network::{NetworkChangeStream, NetworkInfo};
    use mockall::mock;

    mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        }
    }

    mock! {
        Settings {}

        #[async_trait]
        impl SettingsStore for Settings {
            async fn set_string(&self, key: &str, value: &str) -> BridgeResult<()>;
            async fn get_string(&self, key: &str) -> BridgeResult<Option<String>>;
            async fn delete(&self, key: &str) -> BridgeResult<()>;
            async fn list_keys(&self) -> BridgeResult<Vec<String>>;
            async fn clear_all(&self) -> BridgeResult<()>;
        }
    }

    mock! {
        Network {}

        #[async_trait]
        impl NetworkMonitor for Network {
            async fn get_network_info(&self) -> BridgeResult<NetworkInfo>;
            async fn subscribe_changes(&self) -> BridgeResult<Box<dyn NetworkChangeStream>>;
        }
    }

    fn builder_with_mocks() -> CoreConfigBuilder {
        CoreConfig::builder()
            .api_base_url("https://project.example.co/")
            .http_client(Arc::new(MockHttp::new()))
            .settings_store(Arc::new(MockSettings::new()))
            .network_monitor(Arc::new(MockNetwork::new()))
    }

    #[test]
    fn test_backoff_sequence() {
        let config = ConnectionConfig::default();
        let delays: Vec<u128> = (1..=5).map(|n| config.retry_delay(n).as_millis()).collect();
        assert_eq!(delays, vec![2000, 4000, 8000, 16000, 30000]);
    }

    #[test]
    fn test_backoff_saturates_at_cap() {
        let base = Duration::from_secs(2);
        let cap = Duration::from_secs(30);
        assert_eq!(exponential_backoff(base, cap, 0), base);
        assert_eq!(exponential_backoff(base, cap, 40), cap);
        assert_eq!(exponential_backoff(base, cap, u32::MAX), cap);
    }

    #[test]
    fn test_tuning_defaults() {
        let progress = ProgressConfig::default();
        assert_eq!(progress.save_threshold_seconds, 5.0);
        assert_eq!(progress.completion_ratio, 0.9);
        assert_eq!(progress.save_debounce(), Duration::from_secs(1));

        let refresh = UrlRefreshConfig::default();
        assert_eq!(refresh.refresh_buffer(), chrono::Duration::minutes(5));
        assert_eq!(refresh.max_refresh_retries, 5);
    }

    #[test]
    fn test_tuning_deserializes_partial_json() {
        let progress: ProgressConfig =
            serde_json::from_str(r#"{"save_debounce_ms": 250}"#).unwrap();
        assert_eq!(progress.save_debounce_ms, 250);
        assert_eq!(progress.save_threshold_seconds, 5.0);

        let connection: ConnectionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(connection, ConnectionConfig::default());
    }

    #[test]
    fn test_builder_requires_base_url() {
        let result = CoreConfig::builder()
            .http_client(Arc::new(MockHttp::new()))
            .settings_store(Arc::new(MockSettings::new()))
            .network_monitor(Arc::new(MockNetwork::new()))
            .build();

        let err = result.unwrap_err().to_string();
        assert!(err.contains("API base URL is required"));
    }

    #[test]
    fn test_builder_with_mocks_fills_defaults() {
        let config = builder_with_mocks().build().unwrap();

        assert_eq!(config.api_base_url, "https://project.example.co");
        assert_eq!(config.progress_table, DEFAULT_PROGRESS_TABLE);
        assert_eq!(
            config.refresh_endpoint,
            "https://project.example.co/functions/v1/refresh-video-url"
        );
        assert_eq!(
            config.progress_table_url(),
            "https://project.example.co/rest/v1/video_progress"
        );
        assert_eq!(config.event_buffer_size, crate::events::DEFAULT_EVENT_BUFFER_SIZE);
        assert!(config.lifecycle_observer.is_none());
    }

    #[test]
    fn test_relative_refresh_endpoint_is_resolved() {
        let config = builder_with_mocks()
            .refresh_endpoint("/api/video/refresh")
            .build()
            .unwrap();
        assert_eq!(
            config.refresh_endpoint,
            "https://project.example.co/api/video/refresh"
        );

        let config = builder_with_mocks()
            .refresh_endpoint("https://edge.example.com/refresh")
            .build()
            .unwrap();
        assert_eq!(config.refresh_endpoint, "https://edge.example.com/refresh");
    }

    #[test]
    fn test_validate_rejects_non_http_base_url() {
        let err = builder_with_mocks()
            .api_base_url("ftp://files.example.com")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("http:// or https://"));
    }

    #[test]
    fn test_validate_rejects_bad_completion_ratio() {
        let err = builder_with_mocks()
            .progress(ProgressConfig {
                completion_ratio: 1.5,
                ..ProgressConfig::default()
            })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("completion_ratio"));
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let err = builder_with_mocks()
            .connection(ConnectionConfig {
                retry_base_delay_ms: 5_000,
                retry_max_delay_ms: 1_000,
                max_retries: 5,
            })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("retry_max_delay_ms"));
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let config = builder_with_mocks()
            .api_key("anon-key-value")
            .access_token("learner-jwt")
            .build()
            .unwrap();

        let debug = format!("{:?}", config);
        assert!(!debug.contains("anon-key-value"));
        assert!(!debug.contains("learner-jwt"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_http_client() {
        let err = CoreConfig::builder()
            .api_base_url("https://project.example.co")
            .settings_store(Arc::new(MockSettings::new()))
            .network_monitor(Arc::new(MockNetwork::new()))
            .build()
            .unwrap_err();

        assert!(matches!(err, Error::CapabilityMissing { ref capability, .. } if capability == "HttpClient"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_settings_store() {
        let err = CoreConfig::builder()
            .api_base_url("https://project.example.co")
            .http_client(Arc::new(MockHttp::new()))
            .network_monitor(Arc::new(MockNetwork::new()))
            .build()
            .unwrap_err();

        let message = err.to_string();
        assert!(message.contains("SettingsStore"));
        assert!(message.contains("local progress cache"));
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_build_with_desktop_defaults() {
        let base = std::env::temp_dir().join(format!("core-runtime-test-{}", uuid::Uuid::new_v4()));

        let config = CoreConfig::builder()
            .api_base_url("https://project.example.co")
            .local_store_path(base.join("local-store.db"))
            .build()
            .expect("desktop defaults should succeed");

        let settings = config.settings_store.clone();
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        runtime.block_on(async {
            settings.set_string("video_progress_v1", "{}").await.unwrap();
            let value = settings.get_string("video_progress_v1").await.unwrap();
            assert_eq!(value.as_deref(), Some("{}"));
        });

        drop(config);
        let _ = std::fs::remove_dir_all(&base);
    }
}
