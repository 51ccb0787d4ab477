//! Proactive renewal of time-limited streaming URLs.
//!
//! A signed URL stops working at `expires_at`. The manager asks the refresh
//! endpoint for a new one `refresh_buffer` before that instant, hands the new
//! URL to the player through a callback and schedules the next renewal from
//! the new expiry.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, RetryPolicy};
use bridge_traits::time::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use core_runtime::config::{CoreConfig, UrlRefreshConfig};
use core_runtime::events::{CoreEvent, EventBus, LeaseEvent};
use core_runtime::logging::redact_signed_url;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::connection::ConnectionMonitor;
use crate::error::{PlaybackError, Result};

/// A signed streaming URL and the instant it stops working.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedUrlLease {
    pub url: String,
    pub expires_at: DateTime<Utc>,
    pub video_id: String,
}

/// Body returned by the refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Source of fresh signed URLs.
#[async_trait]
pub trait UrlRefresher: Send + Sync {
    async fn refresh(&self, video_id: &str) -> Result<RefreshedUrl>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    video_id: &'a str,
}

/// [`UrlRefresher`] calling the platform's refresh function over HTTP.
pub struct HttpUrlRefresher {
    http_client: Arc<dyn HttpClient>,
    endpoint: String,
    api_key: Option<String>,
    access_token: Option<String>,
}

impl HttpUrlRefresher {
    pub fn new(http_client: Arc<dyn HttpClient>, endpoint: impl Into<String>) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
            api_key: None,
            access_token: None,
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self {
            http_client: config.http_client.clone(),
            endpoint: config.refresh_endpoint.clone(),
            api_key: config.api_key.clone(),
            access_token: config.access_token.clone(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

#[async_trait]
impl UrlRefresher for HttpUrlRefresher {
    #[instrument(skip(self))]
    async fn refresh(&self, video_id: &str) -> Result<RefreshedUrl> {
        let mut request = HttpRequest::new(HttpMethod::Post, self.endpoint.clone())
            .json(&RefreshRequest { video_id })?;
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key.clone());
        }
        if let Some(token) = self.access_token.as_ref().or(self.api_key.as_ref()) {
            request = request.bearer_token(token.clone());
        }

        // Retries are scheduled by the manager
        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::no_retry())
            .await
            .map_err(|e| PlaybackError::RefreshFailed(e.to_string()))?;

        if !response.is_success() {
            return Err(PlaybackError::RefreshRejected {
                status: response.status,
                message: response.text().unwrap_or_default(),
            });
        }

        response
            .json::<RefreshedUrl>()
            .map_err(|e| PlaybackError::InvalidResponse(e.to_string()))
    }
}

type RefreshCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Keeps one signed URL lease fresh.
///
/// At most one timer is outstanding: setting a lease, refreshing manually
/// and destroying all cancel the pending one. At most one refresh request is
/// outstanding as well; [`refresh_now`](Self::refresh_now) joins a request
/// already on the wire instead of sending another.
///
/// Transient failures are retried with exponential backoff up to
/// `max_refresh_retries` times, after which the lease is left stale until the
/// next [`set_url`](Self::set_url) or [`refresh_now`](Self::refresh_now).
/// Rejections are not retried. A renewal that comes back already inside the
/// refresh buffer is adopted, but the next one waits out the same backoff.
/// Dropping the manager destroys it.
pub struct UrlRefreshManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    refresher: Arc<dyn UrlRefresher>,
    config: UrlRefreshConfig,
    clock: Arc<dyn Clock>,
    monitor: Option<ConnectionMonitor>,
    event_bus: Option<Arc<EventBus>>,
    state: Mutex<ManagerState>,
}

#[derive(Default)]
struct ManagerState {
    lease: Option<SignedUrlLease>,
    on_refresh: Option<RefreshCallback>,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever scheduled or in-flight work becomes obsolete.
    generation: u64,
    /// Consecutive renewals that expired within the refresh buffer.
    short_leases: u32,
    in_flight: Option<InFlight>,
    next_refresh_id: u64,
}

#[derive(Debug, Clone)]
enum RefreshStatus {
    Running,
    Succeeded(SignedUrlLease),
    Failed,
}

struct InFlight {
    id: u64,
    done: watch::Receiver<RefreshStatus>,
}

/// Marks a refresh request as outstanding until it is finished or dropped.
///
/// Must not be finished or dropped while the state lock is held.
struct RefreshTicket {
    inner: Arc<ManagerInner>,
    id: u64,
    done: watch::Sender<RefreshStatus>,
}

impl RefreshTicket {
    fn finish(self, status: RefreshStatus) {
        self.release();
        self.done.send_replace(status);
    }

    fn release(&self) {
        let mut state = self.inner.state.lock();
        if state.in_flight.as_ref().is_some_and(|f| f.id == self.id) {
            state.in_flight = None;
        }
    }
}

impl Drop for RefreshTicket {
    fn drop(&mut self) {
        self.release();
    }
}

impl UrlRefreshManager {
    pub fn builder(refresher: Arc<dyn UrlRefresher>) -> UrlRefreshManagerBuilder {
        UrlRefreshManagerBuilder {
            refresher,
            config: UrlRefreshConfig::default(),
            clock: Arc::new(SystemClock),
            monitor: None,
            event_bus: None,
        }
    }

    /// Manager wired from the runtime configuration.
    pub fn from_config(config: &CoreConfig) -> UrlRefreshManagerBuilder {
        Self::builder(Arc::new(HttpUrlRefresher::from_config(config)))
            .config(config.url_refresh.clone())
            .clock(config.clock.clone())
    }

    /// Adopt a new lease and schedule its renewal.
    ///
    /// `on_refresh` receives every renewed URL until the lease is replaced or
    /// the manager is destroyed.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, since the renewal timer is
    /// spawned onto the current one.
    pub fn set_url<F>(
        &self,
        url: impl Into<String>,
        expires_at: DateTime<Utc>,
        video_id: impl Into<String>,
        on_refresh: F,
    ) where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let lease = SignedUrlLease {
            url: url.into(),
            expires_at,
            video_id: video_id.into(),
        };
        debug!(
            url = %redact_signed_url(&lease.url),
            video_id = %lease.video_id,
            %expires_at,
            "Adopting signed URL lease"
        );

        let mut state = self.inner.state.lock();
        state.on_refresh = Some(Arc::new(on_refresh));
        state.short_leases = 0;
        ManagerInner::install(&self.inner, &mut state, lease);
    }

    /// The current lease, if any.
    pub fn lease(&self) -> Option<SignedUrlLease> {
        self.inner.state.lock().lease.clone()
    }

    pub fn current_url(&self) -> Option<String> {
        self.inner.state.lock().lease.as_ref().map(|l| l.url.clone())
    }

    /// Whether the lease expires within the refresh buffer. True without a lease.
    pub fn is_expiring_soon(&self) -> bool {
        let state = self.inner.state.lock();
        match &state.lease {
            Some(lease) => {
                lease.expires_at - self.inner.clock.now() < self.inner.config.refresh_buffer()
            }
            None => true,
        }
    }

    /// Whether a refresh or retry is scheduled.
    pub fn has_pending_refresh(&self) -> bool {
        self.inner.state.lock().timer.is_some()
    }

    /// Renew the lease now, cancelling the scheduled renewal.
    ///
    /// If a refresh is already on the wire its result is awaited instead; only
    /// when that one fails is a new request sent. On failure the usual retry
    /// schedule still applies.
    pub async fn refresh_now(&self) -> Result<SignedUrlLease> {
        loop {
            let mut done = {
                let mut state = self.inner.state.lock();
                let video_id = state
                    .lease
                    .as_ref()
                    .map(|lease| lease.video_id.clone())
                    .ok_or(PlaybackError::NoActiveLease)?;
                let outstanding = state.in_flight.as_ref().map(|f| f.done.clone());
                match outstanding {
                    Some(done) => done,
                    None => {
                        ManagerInner::cancel_timer(&mut state);
                        let generation = state.generation;
                        let ticket = ManagerInner::begin_refresh(&self.inner, &mut state);
                        drop(state);
                        return ManagerInner::run_refresh(
                            &self.inner,
                            generation,
                            video_id,
                            1,
                            ticket,
                        )
                        .await;
                    }
                }
            };

            debug!("Joining in-flight URL refresh");
            let status = done
                .wait_for(|status| !matches!(status, RefreshStatus::Running))
                .await
                .map(|status| status.clone());
            if let Ok(RefreshStatus::Succeeded(lease)) = status {
                return Ok(lease);
            }
        }
    }

    /// Cancel timers and forget the lease and callback.
    pub fn destroy(&self) {
        let mut state = self.inner.state.lock();
        ManagerInner::cancel_timer(&mut state);
        state.lease = None;
        state.on_refresh = None;
    }
}

impl Drop for UrlRefreshManager {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl ManagerInner {
    /// Replace the lease and schedule its renewal. Caller holds the lock.
    fn install(this: &Arc<Self>, state: &mut ManagerState, lease: SignedUrlLease) {
        let now = this.clock.now();
        let refresh_at = lease.expires_at - this.config.refresh_buffer();
        let delay = (refresh_at - now).to_std().unwrap_or(Duration::ZERO);

        this.emit(LeaseEvent::Scheduled {
            video_id: lease.video_id.clone(),
            expires_at: lease.expires_at,
            refresh_at,
        });
        debug!(
            video_id = %lease.video_id,
            delay_ms = delay.as_millis() as u64,
            "Scheduled URL refresh"
        );

        state.lease = Some(lease);
        Self::schedule(this, state, delay, 1);
    }

    /// Adopt a renewed lease. One already inside the refresh buffer is renewed
    /// on the backoff schedule instead of immediately, and not at all once
    /// `max_refresh_retries` such renewals came back in a row.
    fn install_renewed(this: &Arc<Self>, state: &mut ManagerState, lease: SignedUrlLease) {
        let refresh_at = lease.expires_at - this.config.refresh_buffer();
        if refresh_at > this.clock.now() {
            state.short_leases = 0;
            Self::install(this, state, lease);
            return;
        }

        state.short_leases += 1;
        let streak = state.short_leases;
        if streak > this.config.max_refresh_retries {
            warn!(
                video_id = %lease.video_id,
                expires_at = %lease.expires_at,
                streak,
                "Renewed URL keeps expiring within the refresh buffer, not renewing again"
            );
            state.lease = Some(lease);
            return;
        }

        let delay = this.config.retry_delay(streak);
        warn!(
            video_id = %lease.video_id,
            expires_at = %lease.expires_at,
            retry_in_ms = delay.as_millis() as u64,
            "Renewed URL expires within the refresh buffer, backing off"
        );
        this.emit(LeaseEvent::Scheduled {
            video_id: lease.video_id.clone(),
            expires_at: lease.expires_at,
            refresh_at: this.clock.now()
                + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero()),
        });
        state.lease = Some(lease);
        Self::schedule(this, state, delay, 1);
    }

    fn begin_refresh(this: &Arc<Self>, state: &mut ManagerState) -> RefreshTicket {
        let id = state.next_refresh_id;
        state.next_refresh_id += 1;
        let (done, receiver) = watch::channel(RefreshStatus::Running);
        state.in_flight = Some(InFlight { id, done: receiver });
        RefreshTicket {
            inner: Arc::clone(this),
            id,
            done,
        }
    }

    fn schedule(this: &Arc<Self>, state: &mut ManagerState, delay: Duration, attempt: u32) {
        Self::cancel_timer(state);
        let generation = state.generation;
        let weak = Arc::downgrade(this);
        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            ManagerInner::fire(weak, generation, attempt).await;
        }));
    }

    fn cancel_timer(state: &mut ManagerState) {
        state.generation = state.generation.wrapping_add(1);
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }

    async fn fire(weak: Weak<Self>, generation: u64, attempt: u32) {
        let Some(this) = weak.upgrade() else {
            return;
        };
        let (video_id, ticket) = {
            let mut state = this.state.lock();
            if state.generation != generation {
                return;
            }
            // This task is the timer being consumed
            state.timer = None;
            let video_id = match &state.lease {
                Some(lease) => lease.video_id.clone(),
                None => return,
            };
            (video_id, Self::begin_refresh(&this, &mut state))
        };
        // Failures are reported through events and the retry schedule
        let _ = Self::run_refresh(&this, generation, video_id, attempt, ticket).await;
    }

    async fn run_refresh(
        this: &Arc<Self>,
        generation: u64,
        video_id: String,
        attempt: u32,
        ticket: RefreshTicket,
    ) -> Result<SignedUrlLease> {
        this.emit(LeaseEvent::Refreshing {
            video_id: video_id.clone(),
        });
        let result = this.refresher.refresh(&video_id).await;

        let mut state = this.state.lock();
        if state.generation != generation {
            drop(state);
            ticket.finish(RefreshStatus::Failed);
            debug!(%video_id, "Discarding refresh result for a replaced lease");
            return result.map(|refreshed| SignedUrlLease {
                url: refreshed.url,
                expires_at: refreshed.expires_at,
                video_id,
            });
        }

        match result {
            Ok(refreshed) => {
                let lease = SignedUrlLease {
                    url: refreshed.url,
                    expires_at: refreshed.expires_at,
                    video_id: video_id.clone(),
                };
                Self::install_renewed(this, &mut state, lease.clone());
                let callback = state.on_refresh.clone();
                drop(state);
                ticket.finish(RefreshStatus::Succeeded(lease.clone()));

                info!(
                    %video_id,
                    url = %redact_signed_url(&lease.url),
                    expires_at = %lease.expires_at,
                    "Signed URL refreshed"
                );
                this.emit(LeaseEvent::Refreshed {
                    video_id,
                    expires_at: lease.expires_at,
                });
                if let Some(monitor) = &this.monitor {
                    monitor.report_connection_success();
                }
                if let Some(callback) = callback {
                    callback(&lease.url);
                }
                Ok(lease)
            }
            Err(e) => {
                let will_retry = e.is_transient() && attempt <= this.config.max_refresh_retries;
                if will_retry {
                    let delay = this.config.retry_delay(attempt);
                    Self::schedule(this, &mut state, delay, attempt + 1);
                    drop(state);
                    warn!(
                        %video_id,
                        attempt,
                        retry_in_ms = delay.as_millis() as u64,
                        error = %e,
                        "URL refresh failed, will retry"
                    );
                } else if e.is_transient() {
                    drop(state);
                    warn!(%video_id, attempt, error = %e, "URL refresh failed, giving up");
                } else {
                    drop(state);
                    warn!(%video_id, error = %e, "URL refresh rejected, not retrying");
                }
                ticket.finish(RefreshStatus::Failed);

                this.emit(LeaseEvent::RefreshFailed {
                    video_id,
                    message: e.to_string(),
                    attempt,
                    will_retry,
                });
                if let Some(monitor) = this.monitor.as_ref().filter(|_| e.is_network_error()) {
                    monitor.report_connection_issue();
                }
                Err(e)
            }
        }
    }

    fn emit(&self, event: LeaseEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Lease(event)).ok();
        }
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().timer.take() {
            timer.abort();
        }
    }
}

/// Builder for [`UrlRefreshManager`].
pub struct UrlRefreshManagerBuilder {
    refresher: Arc<dyn UrlRefresher>,
    config: UrlRefreshConfig,
    clock: Arc<dyn Clock>,
    monitor: Option<ConnectionMonitor>,
    event_bus: Option<Arc<EventBus>>,
}

impl UrlRefreshManagerBuilder {
    pub fn config(mut self, config: UrlRefreshConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Report refresh outcomes to `monitor`.
    pub fn connection_monitor(mut self, monitor: ConnectionMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn build(self) -> UrlRefreshManager {
        UrlRefreshManager {
            inner: Arc::new(ManagerInner {
                refresher: self.refresher,
                config: self.config,
                clock: self.clock,
                monitor: self.monitor,
                event_bus: self.event_bus,
                state: Mutex::new(ManagerState::default()),
            }),
        }
    }
}
