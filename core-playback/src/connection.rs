//! Network reachability state machine with bounded automatic retry.
//!
//! ```text
//!   online ──offline signal──▶ offline
//!     │  ▲                        │
//!  slow  │ success / live probe   │ reported issue
//!     │  │                        ▼
//!     └──┴──reported issue──▶ reconnecting ──retries exhausted──▶ offline
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bridge_traits::network::{NetworkMonitor, NetworkStatus};
use core_runtime::config::ConnectionConfig;
use core_runtime::events::{ConnectionEvent, CoreEvent, EventBus};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use core_runtime::events::ConnectionState;

use crate::error::Result;

/// What subscribers see on every transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionSnapshot {
    pub status: ConnectionState,
    /// Retries attempted in the current reconnect cycle.
    pub retry_count: u32,
    /// Delay before the scheduled retry fires, 0 when none is scheduled.
    pub retry_in_seconds: f64,
}

impl ConnectionSnapshot {
    fn online() -> Self {
        Self {
            status: ConnectionState::Online,
            retry_count: 0,
            retry_in_seconds: 0.0,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == ConnectionState::Online
    }
}

type Listener = Arc<dyn Fn(ConnectionSnapshot) + Send + Sync>;

/// Connectivity state shared by everything in one session context.
///
/// Cloning is cheap; clones observe and drive the same state machine.
#[derive(Clone)]
pub struct ConnectionMonitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    config: ConnectionConfig,
    network: Arc<dyn NetworkMonitor>,
    event_bus: Option<Arc<EventBus>>,
    state: Mutex<MonitorState>,
    listeners: Mutex<BTreeMap<u64, Listener>>,
}

struct MonitorState {
    snapshot: ConnectionSnapshot,
    retry_timer: Option<JoinHandle<()>>,
    /// Bumped whenever a scheduled retry becomes obsolete.
    generation: u64,
    watcher: Option<JoinHandle<()>>,
    next_listener_id: u64,
}

impl ConnectionMonitor {
    pub fn new(network: Arc<dyn NetworkMonitor>, config: ConnectionConfig) -> Self {
        Self::build(network, config, None)
    }

    /// Monitor that also publishes transitions on `event_bus`.
    pub fn with_event_bus(
        network: Arc<dyn NetworkMonitor>,
        config: ConnectionConfig,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self::build(network, config, Some(event_bus))
    }

    fn build(
        network: Arc<dyn NetworkMonitor>,
        config: ConnectionConfig,
        event_bus: Option<Arc<EventBus>>,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                config,
                network,
                event_bus,
                state: Mutex::new(MonitorState {
                    snapshot: ConnectionSnapshot::online(),
                    retry_timer: None,
                    generation: 0,
                    watcher: None,
                    next_listener_id: 0,
                }),
                listeners: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.inner.state.lock().snapshot
    }

    pub fn status(&self) -> ConnectionState {
        self.snapshot().status
    }

    pub fn is_online(&self) -> bool {
        self.snapshot().is_online()
    }

    /// Follow online/offline signals from the network bridge.
    ///
    /// Replaces any previous watcher. The watcher ends with the bridge's
    /// stream or when the monitor is destroyed.
    pub async fn start_watching(&self) -> Result<()> {
        let mut changes = self.inner.network.subscribe_changes().await?;
        let weak = Arc::downgrade(&self.inner);

        let watcher = tokio::spawn(async move {
            while let Some(info) = changes.next().await {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                match info.status {
                    NetworkStatus::Connected => inner.handle_online_signal(),
                    NetworkStatus::Disconnected => inner.handle_offline_signal(),
                    NetworkStatus::Indeterminate => {
                        debug!("Ignoring indeterminate network status")
                    }
                }
            }
            debug!("Network watcher stopped");
        });

        if let Some(previous) = self.inner.state.lock().watcher.replace(watcher) {
            previous.abort();
        }
        Ok(())
    }

    /// Platform reported the device back online.
    pub fn handle_online_signal(&self) {
        self.inner.handle_online_signal();
    }

    /// Platform reported the device offline.
    pub fn handle_offline_signal(&self) {
        self.inner.handle_offline_signal();
    }

    /// A request failed in a way that suggests lost connectivity.
    ///
    /// Starts a reconnect cycle unless one is already running.
    ///
    /// # Panics
    ///
    /// Panics outside a Tokio runtime, where the retry timer cannot be spawned.
    pub fn report_connection_issue(&self) {
        MonitorInner::report_issue(&self.inner);
    }

    /// A request succeeded; connectivity is back.
    pub fn report_connection_success(&self) {
        self.inner.go_online("connection success reported");
    }

    /// Requests succeed but slowly (e.g. buffering stalls).
    pub fn report_slow_connection(&self) {
        let mut state = self.inner.state.lock();
        if state.snapshot.status != ConnectionState::Online {
            return;
        }
        let previous = state.snapshot;
        state.snapshot.status = ConnectionState::Slow;
        let current = state.snapshot;
        drop(state);

        info!("Connection degraded");
        self.inner.publish(previous, current);
    }

    /// Register `listener`. It runs once right away with the current state and
    /// then on every transition until the returned subscription is dropped.
    pub fn subscribe<F>(&self, listener: F) -> ConnectionSubscription
    where
        F: Fn(ConnectionSnapshot) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let (id, current) = {
            let mut state = self.inner.state.lock();
            let id = state.next_listener_id;
            state.next_listener_id += 1;
            (id, state.snapshot)
        };
        self.inner.listeners.lock().insert(id, Arc::clone(&listener));
        listener(current);

        ConnectionSubscription {
            monitor: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Cancel timers and the network watcher and drop all subscribers.
    pub fn destroy(&self) {
        self.inner.shutdown();
        self.inner.listeners.lock().clear();
    }
}

impl MonitorInner {
    fn handle_online_signal(&self) {
        self.go_online("online signal");
    }

    fn handle_offline_signal(&self) {
        let mut state = self.state.lock();
        Self::cancel_retry(&mut state);
        let previous = state.snapshot;
        state.snapshot = ConnectionSnapshot {
            status: ConnectionState::Offline,
            retry_count: 0,
            retry_in_seconds: 0.0,
        };
        let current = state.snapshot;
        drop(state);

        if previous != current {
            info!("Connection lost");
            self.publish(previous, current);
        }
    }

    fn go_online(&self, reason: &str) {
        let mut state = self.state.lock();
        if state.snapshot.status == ConnectionState::Online {
            return;
        }
        Self::cancel_retry(&mut state);
        let previous = state.snapshot;
        state.snapshot = ConnectionSnapshot::online();
        let current = state.snapshot;
        drop(state);

        info!(reason, "Connection restored");
        self.publish(previous, current);
    }

    fn report_issue(this: &Arc<Self>) {
        let mut state = this.state.lock();
        let previous = state.snapshot;
        if previous.status == ConnectionState::Reconnecting {
            return;
        }

        // A settled offline state starts a fresh cycle
        let retry_count = match previous.status {
            ConnectionState::Offline => 1,
            _ => previous.retry_count + 1,
        };
        state.snapshot.status = ConnectionState::Reconnecting;
        state.snapshot.retry_count = retry_count;
        let delay = Self::schedule_retry(this, &mut state);
        let current = state.snapshot;
        drop(state);

        info!(retry_count, "Connection issue reported, reconnecting");
        this.publish(previous, current);
        this.emit_retry_scheduled(retry_count, delay);
    }

    /// Arm the retry timer for the current `retry_count`. Caller holds the lock.
    fn schedule_retry(this: &Arc<Self>, state: &mut MonitorState) -> Duration {
        Self::cancel_retry(state);
        let delay = this.config.retry_delay(state.snapshot.retry_count);
        state.snapshot.retry_in_seconds = delay.as_secs_f64();

        let generation = state.generation;
        let weak = Arc::downgrade(this);
        state.retry_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            MonitorInner::run_retry(weak, generation).await;
        }));
        delay
    }

    fn cancel_retry(state: &mut MonitorState) {
        state.generation = state.generation.wrapping_add(1);
        state.snapshot.retry_in_seconds = 0.0;
        if let Some(timer) = state.retry_timer.take() {
            timer.abort();
        }
    }

    async fn run_retry(weak: Weak<Self>, generation: u64) {
        let Some(this) = weak.upgrade() else {
            return;
        };

        let connected = this.network.is_connected().await;

        let mut state = this.state.lock();
        if state.generation != generation
            || state.snapshot.status != ConnectionState::Reconnecting
        {
            return;
        }
        // This task is the timer being consumed
        state.retry_timer = None;

        if connected {
            drop(state);
            this.go_online("reconnect probe succeeded");
            return;
        }

        let previous = state.snapshot;
        let retry_count = previous.retry_count + 1;
        if retry_count > this.config.max_retries {
            state.generation = state.generation.wrapping_add(1);
            state.snapshot = ConnectionSnapshot {
                status: ConnectionState::Offline,
                retry_count,
                retry_in_seconds: 0.0,
            };
            let current = state.snapshot;
            drop(state);

            warn!(attempts = this.config.max_retries, "Reconnect retries exhausted");
            this.emit(ConnectionEvent::RetriesExhausted {
                attempts: this.config.max_retries,
            });
            this.publish(previous, current);
            return;
        }

        state.snapshot.retry_count = retry_count;
        let delay = Self::schedule_retry(&this, &mut state);
        let current = state.snapshot;
        drop(state);

        debug!(retry_count, delay_ms = delay.as_millis() as u64, "Still unreachable");
        this.notify(current);
        this.emit_retry_scheduled(retry_count, delay);
    }

    /// Notify listeners and emit a state change event.
    fn publish(&self, previous: ConnectionSnapshot, current: ConnectionSnapshot) {
        if previous.status != current.status {
            self.emit(ConnectionEvent::StateChanged {
                previous: previous.status,
                current: current.status,
                retry_count: current.retry_count,
            });
        }
        self.notify(current);
    }

    fn notify(&self, snapshot: ConnectionSnapshot) {
        // Listeners may call back into the monitor, so run them unlocked
        let listeners: Vec<Listener> = self.listeners.lock().values().cloned().collect();
        for listener in listeners {
            listener(snapshot);
        }
    }

    fn emit_retry_scheduled(&self, attempt: u32, delay: Duration) {
        self.emit(ConnectionEvent::RetryScheduled {
            attempt,
            delay_ms: delay.as_millis() as u64,
        });
    }

    fn emit(&self, event: ConnectionEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Connection(event)).ok();
        }
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        Self::cancel_retry(&mut state);
        if let Some(watcher) = state.watcher.take() {
            watcher.abort();
        }
    }
}

impl Drop for MonitorInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(timer) = state.retry_timer.take() {
            timer.abort();
        }
        if let Some(watcher) = state.watcher.take() {
            watcher.abort();
        }
    }
}

/// Keeps a [`ConnectionMonitor::subscribe`] listener registered.
///
/// Dropping it unsubscribes.
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct ConnectionSubscription {
    monitor: Weak<MonitorInner>,
    id: Option<u64>,
}

impl ConnectionSubscription {
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if let (Some(id), Some(monitor)) = (self.id.take(), self.monitor.upgrade()) {
            monitor.listeners.lock().remove(&id);
        }
    }
}

impl Drop for ConnectionSubscription {
    fn drop(&mut self) {
        self.remove();
    }
}
