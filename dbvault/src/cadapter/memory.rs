//! In-memory object store, used for local development and tests.

use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use crate::cadapter::client::{CompletedPart, ObjectBackend, ObjectReader};
use crate::error::{ArchiveError, Result, StoreOp};

#[derive(Default)]
struct State {
    objects: BTreeMap<String, Bytes>,
    sessions: HashMap<String, Session>,
    next_upload: u64,
}

struct Session {
    key: String,
    parts: BTreeMap<i32, Bytes>,
}

#[derive(Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned map is still structurally valid.
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Snapshot of a stored object.
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.lock().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    /// Upload ids of sessions that were neither completed nor aborted.
    pub fn open_sessions(&self) -> Vec<String> {
        self.lock().sessions.keys().cloned().collect()
    }
}

fn part_tag(data: &[u8]) -> String {
    format!("\"{:x}\"", md5::compute(data))
}

#[async_trait]
impl ObjectBackend for InMemoryBackend {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<()> {
        self.lock().objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<ObjectReader>> {
        Ok(self
            .object(key)
            .map(|data| Box::pin(Cursor::new(data)) as ObjectReader))
    }

    async fn list_objects(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let state = self.lock();
        Ok(state
            .objects
            .keys()
            .filter(|k| prefix.is_none_or(|p| k.starts_with(p)))
            .cloned()
            .collect())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.lock().objects.remove(key);
        Ok(())
    }

    async fn create_multipart_upload(&self, key: &str) -> Result<String> {
        let mut state = self.lock();
        state.next_upload += 1;
        let upload_id = format!("mem-upload-{}", state.next_upload);
        state.sessions.insert(
            upload_id.clone(),
            Session {
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        let op = StoreOp::UploadPart(part_number);
        let mut state = self.lock();
        let session = state
            .sessions
            .get_mut(upload_id)
            .filter(|s| s.key == key)
            .ok_or_else(|| ArchiveError::store(op, key, format!("no such upload {upload_id}")))?;
        let tag = part_tag(&data);
        session.parts.insert(part_number, data);
        Ok(tag)
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let op = StoreOp::CompleteMultipartUpload;
        let mut state = self.lock();
        let session = match state.sessions.get(upload_id) {
            Some(s) if s.key == key => s,
            _ => {
                return Err(ArchiveError::store(
                    op,
                    key,
                    format!("no such upload {upload_id}"),
                ));
            }
        };
        if parts.is_empty() || parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(ArchiveError::store(op, key, "invalid part order"));
        }
        let mut assembled = BytesMut::new();
        for part in parts {
            let data = session.parts.get(&part.part_number).ok_or_else(|| {
                ArchiveError::store(op, key, format!("part {} was never uploaded", part.part_number))
            })?;
            if part_tag(data) != part.e_tag {
                return Err(ArchiveError::store(
                    op,
                    key,
                    format!("ETag mismatch for part {}", part.part_number),
                ));
            }
            assembled.extend_from_slice(data);
        }
        state.sessions.remove(upload_id);
        state.objects.insert(key.to_string(), assembled.freeze());
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        let mut state = self.lock();
        if !state.sessions.get(upload_id).is_some_and(|s| s.key == key) {
            return Err(ArchiveError::store(
                StoreOp::AbortMultipartUpload,
                key,
                format!("no such upload {upload_id}"),
            ));
        }
        state.sessions.remove(upload_id);
        Ok(())
    }
}
