//! Cloud tier sweep. Age comes from the timestamp embedded in the artifact
//! name, never from object metadata, which only records upload time.

use chrono::{DateTime, Utc};

use super::{RetentionMode, RetentionPolicy, SweepFailure, SweepReport};
use crate::artifact::ArtifactName;
use crate::cadapter::client::ObjectBackend;
use crate::error::Result;

/// Lists objects under `prefix` and deletes the artifacts that `policy`
/// expires. Keys that are not artifact names are skipped. Only the listing
/// can fail the sweep; deletions are attempted one at a time and their
/// failures are collected in the report.
pub async fn sweep_cloud<B>(
    backend: &B,
    prefix: Option<&str>,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<SweepReport>
where
    B: ObjectBackend + ?Sized,
{
    let keys = backend.list_objects(prefix).await?;
    let cutoff_ms = policy.cutoff(now).timestamp_millis();
    let mut report = SweepReport::default();

    for key in keys {
        let Some(name) = ArtifactName::from_key(&key) else {
            report.skipped.push(key);
            continue;
        };
        let expired = match policy.mode {
            RetentionMode::DeleteAll => true,
            RetentionMode::OlderThanHorizon => name.created_at_ms() < cutoff_ms,
        };
        if !expired {
            report.retained.push(key);
            continue;
        }
        match backend.delete_object(&key).await {
            Ok(()) => report.deleted.push(key),
            Err(error) => report.failures.push(SweepFailure { target: key, error }),
        }
    }
    Ok(report)
}
