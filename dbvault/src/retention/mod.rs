//! Retention sweeps for the cloud and local tiers.
//!
//! Each tier has its own policy and is swept independently. Sweeps are
//! best-effort: a failed deletion is recorded in the [`SweepReport`] and the
//! sweep moves on to the next entry.

pub mod cloud;
pub mod local;

use chrono::{DateTime, Duration, Utc};

use crate::error::ArchiveError;

pub use cloud::sweep_cloud;
pub use local::sweep_local;

pub const DEFAULT_LOCAL_RETAIN_DAYS: i64 = 7;
pub const DEFAULT_CLOUD_RETAIN_DAYS: i64 = 30;
/// Longest horizon accepted from configuration (100 years).
pub const MAX_RETAIN_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionMode {
    /// Remove every entry regardless of age.
    DeleteAll,
    /// Remove entries strictly older than `now - horizon`.
    OlderThanHorizon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub horizon: Duration,
    pub mode: RetentionMode,
}

impl RetentionPolicy {
    pub fn older_than(horizon: Duration) -> Self {
        Self {
            horizon,
            mode: RetentionMode::OlderThanHorizon,
        }
    }

    pub fn delete_all() -> Self {
        Self {
            horizon: Duration::zero(),
            mode: RetentionMode::DeleteAll,
        }
    }

    /// Horizons too large to represent saturate instead of panicking.
    pub fn days(days: i64) -> Self {
        Self::older_than(Duration::try_days(days).unwrap_or(Duration::MAX))
    }

    /// `now - horizon`, clamped to the earliest representable instant.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.horizon)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Whether an entry created at `created_at` is due for deletion.
    pub fn is_expired(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.mode {
            RetentionMode::DeleteAll => true,
            RetentionMode::OlderThanHorizon => created_at < self.cutoff(now),
        }
    }
}

#[derive(Debug)]
pub struct SweepFailure {
    /// Archive key or local path of the entry.
    pub target: String,
    pub error: ArchiveError,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub deleted: Vec<String>,
    pub retained: Vec<String>,
    /// Entries the sweep does not manage (e.g. foreign objects in the bucket).
    pub skipped: Vec<String>,
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }
}
