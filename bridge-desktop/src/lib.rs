//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`
//! - `SettingsStore` using a SQLite-backed key-value table
//! - `NetworkMonitor` using a periodic TCP reachability probe
//! - `LifecycleObserver` fed by the desktop shell (window hidden / closing)
//! - `MediaEventSource` fed by the embedded player
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopNetworkMonitor, ReqwestHttpClient, SqliteSettingsStore};
//!
//! #[tokio::main]
//! async fn main() -> bridge_traits::error::Result<()> {
//!     let http_client = ReqwestHttpClient::new();
//!     let settings = SqliteSettingsStore::new(SqliteSettingsStore::default_path()?).await?;
//!     let network = DesktopNetworkMonitor::new();
//!     // Inject into CoreConfig
//!     Ok(())
//! }
//! ```

mod http;
mod lifecycle;
mod media;
mod network;
mod settings;

pub use http::ReqwestHttpClient;
pub use lifecycle::DesktopLifecycleObserver;
pub use media::ChannelMediaSource;
pub use network::DesktopNetworkMonitor;
pub use settings::SqliteSettingsStore;
