//! Local tier sweep over the backup directory, by filesystem mtime.

use std::path::Path;

use chrono::{DateTime, Utc};
use tokio::fs;

use super::{RetentionPolicy, SweepFailure, SweepReport};
use crate::error::{ArchiveError, Result};

/// Removes entries of `dir` that `policy` expires. A missing directory is an
/// empty sweep; an unreadable one is an error. Failures on individual
/// entries are collected and the walk continues.
///
/// Subdirectories are only removed when empty; the sweep never deletes
/// recursively.
pub async fn sweep_local(
    dir: &Path,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<SweepReport> {
    let mut report = SweepReport::default();
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(report),
        Err(e) => return Err(ArchiveError::io(dir, e)),
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => return Err(ArchiveError::io(dir, e)),
        };
        let path = entry.path();
        let target = path.display().to_string();

        let meta = match entry.metadata().await {
            Ok(meta) => meta,
            Err(e) => {
                report.failures.push(SweepFailure {
                    target,
                    error: ArchiveError::io(&path, e),
                });
                continue;
            }
        };
        // Entries without an mtime are treated as current.
        let modified = meta.modified().map(DateTime::<Utc>::from).unwrap_or(now);
        if !policy.is_expired(modified, now) {
            report.retained.push(target);
            continue;
        }

        let removed = if meta.is_dir() {
            fs::remove_dir(&path).await
        } else {
            fs::remove_file(&path).await
        };
        match removed {
            Ok(()) => report.deleted.push(target),
            Err(e) => report.failures.push(SweepFailure {
                target,
                error: ArchiveError::io(&path, e),
            }),
        }
    }
    Ok(report)
}
