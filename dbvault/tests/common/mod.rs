#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dbvault::cadapter::memory::InMemoryBackend;
use dbvault::cadapter::{CompletedPart, ObjectBackend, ObjectReader};
use dbvault::error::{ArchiveError, Result, StoreOp};
use dbvault::exec::DatabaseTool;

pub const MIB: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Put(String),
    Get(String),
    List(Option<String>),
    Delete(String),
    Create(String),
    UploadPart(i32),
    Complete(Vec<i32>),
    Abort(String),
}

/// Wraps [`InMemoryBackend`], records every call and injects failures.
#[derive(Default)]
pub struct RecordingBackend {
    pub inner: InMemoryBackend,
    calls: Mutex<Vec<Call>>,
    completion_order: Mutex<Vec<i32>>,
    fail_parts: HashSet<i32>,
    part_delays: HashMap<i32, Duration>,
    fail_complete: bool,
    fail_abort: bool,
    fail_list: bool,
    fail_deletes: HashSet<String>,
    active_parts: AtomicUsize,
    peak_parts: AtomicUsize,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_part(mut self, part_number: i32) -> Self {
        self.fail_parts.insert(part_number);
        self
    }

    pub fn part_delay(mut self, part_number: i32, delay: Duration) -> Self {
        self.part_delays.insert(part_number, delay);
        self
    }

    pub fn failing_complete(mut self) -> Self {
        self.fail_complete = true;
        self
    }

    pub fn failing_abort(mut self) -> Self {
        self.fail_abort = true;
        self
    }

    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn failing_delete(mut self, key: &str) -> Self {
        self.fail_deletes.insert(key.to_string());
        self
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    /// Part numbers in the order their uploads finished.
    pub fn completion_order(&self) -> Vec<i32> {
        self.completion_order.lock().unwrap().clone()
    }

    /// Highest number of part uploads observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_parts.load(Ordering::SeqCst)
    }

    pub fn uploaded_parts(&self) -> Vec<i32> {
        self.calls()
            .iter()
            .filter_map(|c| match c {
                Call::UploadPart(n) => Some(*n),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ObjectBackend for RecordingBackend {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<()> {
        self.record(Call::Put(key.to_string()));
        self.inner.put_object(key, data).await
    }

    async fn get_object(&self, key: &str) -> Result<Option<ObjectReader>> {
        self.record(Call::Get(key.to_string()));
        self.inner.get_object(key).await
    }

    async fn list_objects(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        self.record(Call::List(prefix.map(str::to_string)));
        if self.fail_list {
            return Err(ArchiveError::store(StoreOp::ListObjects, prefix.unwrap_or(""), "injected"));
        }
        self.inner.list_objects(prefix).await
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.record(Call::Delete(key.to_string()));
        if self.fail_deletes.contains(key) {
            return Err(ArchiveError::store(StoreOp::DeleteObject, key, "injected"));
        }
        self.inner.delete_object(key).await
    }

    async fn create_multipart_upload(&self, key: &str) -> Result<String> {
        self.record(Call::Create(key.to_string()));
        self.inner.create_multipart_upload(key).await
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        self.record(Call::UploadPart(part_number));
        let active = self.active_parts.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_parts.fetch_max(active, Ordering::SeqCst);
        if let Some(delay) = self.part_delays.get(&part_number) {
            tokio::time::sleep(*delay).await;
        }
        self.active_parts.fetch_sub(1, Ordering::SeqCst);
        if self.fail_parts.contains(&part_number) {
            return Err(ArchiveError::store(StoreOp::UploadPart(part_number), key, "injected"));
        }
        let tag = self.inner.upload_part(key, upload_id, part_number, data).await?;
        self.completion_order.lock().unwrap().push(part_number);
        Ok(tag)
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        self.record(Call::Complete(parts.iter().map(|p| p.part_number).collect()));
        if self.fail_complete {
            return Err(ArchiveError::store(StoreOp::CompleteMultipartUpload, key, "injected"));
        }
        self.inner.complete_multipart_upload(key, upload_id, parts).await
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        self.record(Call::Abort(upload_id.to_string()));
        if self.fail_abort {
            return Err(ArchiveError::store(StoreOp::AbortMultipartUpload, key, "injected"));
        }
        self.inner.abort_multipart_upload(key, upload_id).await
    }
}

/// Deterministic, non-repeating-looking content.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

pub fn write_artifact(dir: &Path, name: &str, len: usize) -> (PathBuf, Vec<u8>) {
    let path = dir.join(name);
    let data = pattern(len);
    std::fs::write(&path, &data).unwrap();
    (path, data)
}

/// Stands in for pg_dump / pg_restore.
#[derive(Default)]
pub struct FakeDbTool {
    pub dump_len: usize,
    pub fail_dump: bool,
    pub fail_restore: bool,
    /// Contents seen by each restore call.
    pub restored: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakeDbTool {
    pub fn dumping(len: usize) -> Self {
        Self {
            dump_len: len,
            ..Default::default()
        }
    }
}

#[async_trait]
impl DatabaseTool for FakeDbTool {
    async fn dump(&self, _db_url: &str, dest: &Path) -> Result<()> {
        if self.fail_dump {
            return Err(ArchiveError::Subprocess {
                command: "pg_dump".into(),
                status: "exit status: 1".into(),
                stderr: "connection refused".into(),
            });
        }
        tokio::fs::write(dest, pattern(self.dump_len))
            .await
            .map_err(|e| ArchiveError::io(dest, e))
    }

    async fn restore(&self, db_url: &str, src: &Path) -> Result<()> {
        let data = tokio::fs::read(src)
            .await
            .map_err(|e| ArchiveError::io(src, e))?;
        self.restored
            .lock()
            .unwrap()
            .push((db_url.to_string(), data));
        if self.fail_restore {
            return Err(ArchiveError::Subprocess {
                command: "pg_restore".into(),
                status: "exit status: 1".into(),
                stderr: "relation already exists".into(),
            });
        }
        Ok(())
    }
}
