//! Page / App Lifecycle Abstraction
//!
//! Delivers the visibility and unload transitions the core needs to flush
//! state before the host stops running it.

use async_trait::async_trait;

use crate::error::Result;

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Page or window is visible
    Visible,
    /// Page is hidden (tab switched, window minimised, app backgrounded)
    Hidden,
    /// Page is unloading or the app is about to terminate
    Terminating,
}

/// Lifecycle observer trait
///
/// # Platform Support
///
/// - **Web**: `visibilitychange` + `pagehide`/`beforeunload`
/// - **Desktop**: Window minimise / close requests
/// - **Mobile**: Activity / UIApplication lifecycle callbacks
///
/// # Example
///
/// ```ignore
/// use bridge_traits::lifecycle::{LifecycleObserver, LifecycleState};
///
/// async fn flush_on_hide(observer: &dyn LifecycleObserver) -> Result<()> {
///     let mut stream = observer.subscribe_changes().await?;
///     while let Some(state) = stream.next().await {
///         if state != LifecycleState::Visible {
///             flush().await;
///         }
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait LifecycleObserver: Send + Sync {
    /// Get current lifecycle state
    async fn get_state(&self) -> Result<LifecycleState>;

    /// Subscribe to lifecycle state changes
    async fn subscribe_changes(&self) -> Result<Box<dyn LifecycleChangeStream>>;
}

/// Stream of lifecycle state changes
#[async_trait]
pub trait LifecycleChangeStream: Send {
    /// Get the next lifecycle state update
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<LifecycleState>;
}
