//! Network Reachability Abstraction
//!
//! Provides the online/offline signals a browser exposes through
//! `navigator.onLine` and the `online`/`offline` window events.

use async_trait::async_trait;

use crate::error::Result;

/// Network connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    /// Connected to network
    Connected,
    /// Not connected to any network
    Disconnected,
    /// Connection status unknown or indeterminate
    Indeterminate,
}

/// Network information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    pub status: NetworkStatus,
    /// Whether the platform considers the link constrained (e.g. 2G,
    /// data saver). Advisory only.
    pub is_constrained: bool,
}

impl NetworkInfo {
    pub fn connected() -> Self {
        Self {
            status: NetworkStatus::Connected,
            is_constrained: false,
        }
    }

    pub fn disconnected() -> Self {
        Self {
            status: NetworkStatus::Disconnected,
            is_constrained: false,
        }
    }
}

/// Network monitor trait
///
/// The core uses this to:
/// - Probe live connectivity when a reconnect attempt fires
/// - React to platform online/offline transitions
///
/// # Platform Support
///
/// - **Web**: `navigator.onLine` + `online`/`offline` events
/// - **Desktop**: Periodic reachability probe
/// - **Mobile**: ConnectivityManager / NWPathMonitor
///
/// # Example
///
/// ```ignore
/// use bridge_traits::network::NetworkMonitor;
///
/// async fn can_upload(monitor: &dyn NetworkMonitor) -> bool {
///     monitor.is_connected().await
/// }
/// ```
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    /// Get current network information
    async fn get_network_info(&self) -> Result<NetworkInfo>;

    /// Check if currently connected to any network
    ///
    /// `Indeterminate` is treated as connected, matching `navigator.onLine`
    /// which only reports `false` when the platform is certain.
    async fn is_connected(&self) -> bool {
        matches!(
            self.get_network_info().await,
            Ok(NetworkInfo {
                status: NetworkStatus::Connected | NetworkStatus::Indeterminate,
                ..
            })
        )
    }

    /// Subscribe to network status changes
    ///
    /// Implementations should emit an item whenever the status changes.
    async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>>;
}

/// Stream of network status changes
#[async_trait]
pub trait NetworkChangeStream: Send {
    /// Get the next network info update
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<NetworkInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedMonitor(NetworkStatus);

    struct ClosedStream;

    #[async_trait]
    impl NetworkChangeStream for ClosedStream {
        async fn next(&mut self) -> Option<NetworkInfo> {
            None
        }
    }

    #[async_trait]
    impl NetworkMonitor for FixedMonitor {
        async fn get_network_info(&self) -> Result<NetworkInfo> {
            Ok(NetworkInfo {
                status: self.0,
                is_constrained: false,
            })
        }

        async fn subscribe_changes(&self) -> Result<Box<dyn NetworkChangeStream>> {
            Ok(Box::new(ClosedStream))
        }
    }

    #[test]
    fn test_network_info_constructors() {
        assert_eq!(NetworkInfo::connected().status, NetworkStatus::Connected);
        assert_eq!(
            NetworkInfo::disconnected().status,
            NetworkStatus::Disconnected
        );
    }

    #[tokio::test]
    async fn test_indeterminate_counts_as_connected() {
        assert!(FixedMonitor(NetworkStatus::Indeterminate).is_connected().await);
        assert!(FixedMonitor(NetworkStatus::Connected).is_connected().await);
        assert!(!FixedMonitor(NetworkStatus::Disconnected).is_connected().await);
    }
}
