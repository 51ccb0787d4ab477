//! Progress record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PlaybackError, Result};

/// Watch progress of one learner on one video.
///
/// One record exists per `(user_id, video_id)`. Stores resolve conflicting
/// writes by keeping the record with the latest `last_watched_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub user_id: String,
    pub video_id: String,
    pub progress_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    pub completed: bool,
    pub last_watched_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// Build a record, deriving `completed` from position and duration.
    pub fn new(
        user_id: impl Into<String>,
        video_id: impl Into<String>,
        snapshot: ProgressSnapshot,
        completion_ratio: f64,
        last_watched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            video_id: video_id.into(),
            progress_seconds: snapshot.position_seconds,
            duration_seconds: snapshot.duration_seconds,
            completed: is_completed(
                snapshot.position_seconds,
                snapshot.duration_seconds,
                completion_ratio,
            ),
            last_watched_at,
        }
    }

    /// `true` when `self` should replace `existing` under last-write-wins.
    pub fn supersedes(&self, existing: &ProgressRecord) -> bool {
        self.last_watched_at >= existing.last_watched_at
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            position_seconds: self.progress_seconds,
            duration_seconds: self.duration_seconds,
        }
    }
}

/// `true` iff the duration is known and the position reached `ratio` of it.
pub fn is_completed(position_seconds: f64, duration_seconds: Option<f64>, ratio: f64) -> bool {
    match duration_seconds {
        Some(duration) if duration > 0.0 => position_seconds >= ratio * duration,
        _ => false,
    }
}

/// A position observed on the media element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub position_seconds: f64,
    pub duration_seconds: Option<f64>,
}

impl ProgressSnapshot {
    /// Validate raw values reported by the player.
    ///
    /// Unknown or non-finite durations (live streams report infinity) are
    /// dropped; an invalid position is an error.
    pub fn new(position_seconds: f64, duration_seconds: Option<f64>) -> Result<Self> {
        if !position_seconds.is_finite() || position_seconds < 0.0 {
            return Err(PlaybackError::InvalidProgress(format!(
                "position must be a non-negative number, got {}",
                position_seconds
            )));
        }

        Ok(Self {
            position_seconds,
            duration_seconds: duration_seconds.filter(|d| d.is_finite() && *d > 0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(rfc3339: &str) -> DateTime<Utc> {
        rfc3339.parse().unwrap()
    }

    #[test]
    fn test_completed_at_ninety_percent() {
        assert!(is_completed(90.0, Some(100.0), 0.9));
        assert!(is_completed(99.0, Some(100.0), 0.9));
        assert!(!is_completed(89.9, Some(100.0), 0.9));
    }

    #[test]
    fn test_not_completed_without_duration() {
        assert!(!is_completed(5000.0, None, 0.9));
        assert!(!is_completed(0.0, Some(0.0), 0.9));
    }

    #[test]
    fn test_record_derives_completed() {
        let snapshot = ProgressSnapshot::new(540.0, Some(600.0)).unwrap();
        let record = ProgressRecord::new("u1", "v1", snapshot, 0.9, at("2026-03-01T10:00:00Z"));
        assert!(record.completed);
        assert_eq!(record.snapshot(), snapshot);
    }

    #[test]
    fn test_snapshot_validation() {
        assert!(ProgressSnapshot::new(-1.0, None).is_err());
        assert!(ProgressSnapshot::new(f64::NAN, None).is_err());

        let live = ProgressSnapshot::new(12.0, Some(f64::INFINITY)).unwrap();
        assert_eq!(live.duration_seconds, None);
    }

    #[test]
    fn test_supersedes_by_last_watched_at() {
        let snapshot = ProgressSnapshot::new(10.0, None).unwrap();
        let older = ProgressRecord::new("u1", "v1", snapshot, 0.9, at("2026-03-01T10:00:00Z"));
        let newer = ProgressRecord::new("u1", "v1", snapshot, 0.9, at("2026-03-01T10:00:05Z"));

        assert!(newer.supersedes(&older));
        assert!(!older.supersedes(&newer));
        assert!(older.supersedes(&older.clone()));
    }

    #[test]
    fn test_local_json_uses_camel_case() {
        let snapshot = ProgressSnapshot::new(42.5, Some(600.0)).unwrap();
        let record = ProgressRecord::new("u1", "v1", snapshot, 0.9, at("2026-03-01T10:00:00Z"));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["videoId"], "v1");
        assert_eq!(json["progressSeconds"], 42.5);
        assert_eq!(json["lastWatchedAt"], "2026-03-01T10:00:00Z");
    }
}
