//! Watch progress tracking and persistence.
//!
//! [`ProgressTracker`] turns media and lifecycle signals into debounced saves.
//! [`ProgressStore`] decides where a save lands: the remote repository when it
//! answers, the device-local cache otherwise.

pub mod local_cache;
pub mod record;
pub mod remote;
pub mod store;
pub mod tracker;

pub use local_cache::{LocalProgressCache, LOCAL_KEY_PREFIX};
pub use record::{is_completed, ProgressRecord, ProgressSnapshot};
pub use remote::{InMemoryProgressRepository, ProgressRepository, RestProgressRepository};
pub use store::{ProgressStore, SaveOutcome};
pub use tracker::{ProgressTracker, TrackingHandle};
