mod common;

use std::fs::File;
use std::path::Path;
use std::time::SystemTime;

use bytes::Bytes;
use chrono::{Duration, TimeZone, Utc};
use common::*;
use dbvault::artifact::ArtifactName;
use dbvault::cadapter::ObjectBackend;
use dbvault::retention::{RetentionPolicy, sweep_cloud, sweep_local};

async fn seed(backend: &RecordingBackend, keys: &[&str]) {
    for key in keys {
        backend
            .inner
            .put_object(key, Bytes::from_static(b"snapshot"))
            .await
            .unwrap();
    }
}

fn touch(dir: &Path, name: &str, mtime: SystemTime) {
    let path = dir.join(name);
    std::fs::write(&path, b"x").unwrap();
    File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(mtime)
        .unwrap();
}

#[tokio::test]
async fn test_cloud_sweep_deletes_only_stale_artifacts() {
    let backend = RecordingBackend::new();
    seed(
        &backend,
        &["backup_1000.tar", "backup_99999999999999.tar", "notes.txt"],
    )
    .await;

    let report = sweep_cloud(&backend, None, &RetentionPolicy::days(30), Utc::now())
        .await
        .unwrap();

    assert_eq!(report.deleted, vec!["backup_1000.tar".to_string()]);
    assert_eq!(backend.count(|c| matches!(c, Call::Delete(_))), 1);
    assert_eq!(
        backend.inner.keys(),
        vec!["backup_99999999999999.tar".to_string(), "notes.txt".to_string()]
    );
    assert_eq!(report.skipped, vec!["notes.txt".to_string()]);
}

#[tokio::test]
async fn test_cloud_sweep_deleted_set_matches_cutoff() {
    let now = Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap();
    let policy = RetentionPolicy::days(30);
    let ages_days = [0i64, 1, 29, 30, 31, 45, 365];
    let names: Vec<ArtifactName> = ages_days
        .iter()
        .map(|d| ArtifactName::at(now - Duration::days(*d) - Duration::seconds(1)))
        .collect();
    let keys: Vec<String> = names.iter().map(|n| n.archive_key("pg")).collect();
    let backend = RecordingBackend::new();
    seed(&backend, &keys.iter().map(String::as_str).collect::<Vec<_>>()).await;
    seed(&backend, &["pg/backup_latest.tar", "pg/manifest.json"]).await;

    let report = sweep_cloud(&backend, Some("pg/"), &policy, now).await.unwrap();

    let cutoff = (now - Duration::days(30)).timestamp_millis();
    let mut expected: Vec<String> = names
        .iter()
        .zip(&keys)
        .filter(|(n, _)| n.created_at_ms() < cutoff)
        .map(|(_, k)| k.clone())
        .collect();
    expected.sort();
    let mut deleted = report.deleted.clone();
    deleted.sort();
    assert_eq!(deleted, expected);
    assert_eq!(deleted.len(), 4);
    assert!(backend.inner.object("pg/backup_latest.tar").is_some());
    assert!(backend.inner.object("pg/manifest.json").is_some());
}

#[tokio::test]
async fn test_cloud_sweep_continues_past_failed_delete() {
    let backend = RecordingBackend::new().failing_delete("db/backup_1.tar");
    seed(&backend, &["db/backup_1.tar", "db/backup_2.tar", "db/backup_3.tar"]).await;

    let report = sweep_cloud(&backend, Some("db/"), &RetentionPolicy::days(1), Utc::now())
        .await
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].target, "db/backup_1.tar");
    assert_eq!(
        report.deleted,
        vec!["db/backup_2.tar".to_string(), "db/backup_3.tar".to_string()]
    );
    assert_eq!(backend.inner.keys(), vec!["db/backup_1.tar".to_string()]);
}

#[tokio::test]
async fn test_cloud_sweep_fails_when_listing_fails() {
    let backend = RecordingBackend::new().failing_list();
    assert!(
        sweep_cloud(&backend, None, &RetentionPolicy::days(30), Utc::now())
            .await
            .is_err()
    );
    assert_eq!(backend.count(|c| matches!(c, Call::Delete(_))), 0);
}

#[tokio::test]
async fn test_local_sweep_delete_all_ignores_age() {
    let dir = tempfile::tempdir().unwrap();
    let now = SystemTime::now();
    touch(dir.path(), "backup_1.tar", now);
    touch(dir.path(), "backup_2.tar", now - std::time::Duration::from_secs(86_400 * 10));
    touch(dir.path(), "unrelated.log", now);

    let report = sweep_local(dir.path(), &RetentionPolicy::delete_all(), Utc::now())
        .await
        .unwrap();

    assert_eq!(report.deleted_count(), 3);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_local_sweep_keeps_entries_within_horizon() {
    let dir = tempfile::tempdir().unwrap();
    let now = SystemTime::now();
    let day = std::time::Duration::from_secs(86_400);
    touch(dir.path(), "fresh.tar", now - day);
    touch(dir.path(), "edge.tar", now - day * 6);
    touch(dir.path(), "old.tar", now - day * 8);
    touch(dir.path(), "ancient.tar", now - day * 90);

    let report = sweep_local(dir.path(), &RetentionPolicy::days(7), Utc::now())
        .await
        .unwrap();

    assert_eq!(report.deleted_count(), 2);
    assert!(report.failures.is_empty());
    assert!(dir.path().join("fresh.tar").exists());
    assert!(dir.path().join("edge.tar").exists());
    assert!(!dir.path().join("old.tar").exists());
    assert!(!dir.path().join("ancient.tar").exists());
}

#[tokio::test]
async fn test_local_sweep_continues_past_undeletable_entry() {
    let dir = tempfile::tempdir().unwrap();
    let now = SystemTime::now();
    let day = std::time::Duration::from_secs(86_400);
    touch(dir.path(), "backup_1.tar", now - day * 30);
    touch(dir.path(), "backup_2.tar", now - day * 20);
    touch(dir.path(), "backup_3.tar", now - day * 10);
    std::fs::create_dir(dir.path().join("pinned")).unwrap();
    touch(&dir.path().join("pinned"), "keep.tar", now);

    let report = sweep_local(dir.path(), &RetentionPolicy::delete_all(), Utc::now())
        .await
        .unwrap();

    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].target.ends_with("pinned"));
    assert_eq!(report.deleted_count(), 3);
    for name in ["backup_1.tar", "backup_2.tar", "backup_3.tar"] {
        assert!(!dir.path().join(name).exists(), "{name} should be gone");
    }
    assert!(dir.path().join("pinned/keep.tar").exists());
}
