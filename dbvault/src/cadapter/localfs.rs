//! Directory-backed object store. Keys map to files under `root`; multipart
//! sessions are staged under `<root>/.multipart/<upload-id>/` until completed.
//!
//! Objects are written to a hidden temp file next to their final path and
//! renamed into place, so a key is either absent or holds a complete object.

use crate::cadapter::client::{CompletedPart, ObjectBackend, ObjectReader};
use crate::error::{ArchiveError, Result, StoreOp};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::{fs, io::AsyncWriteExt};
use walkdir::WalkDir;

const STAGING_DIR: &str = ".multipart";
/// Holds the key a session was created for.
const SESSION_KEY_FILE: &str = "key";
const TEMP_SUFFIX: &str = ".tmp";

pub struct LocalFsBackend {
    root: PathBuf,
}

impl LocalFsBackend {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Maps `key` under the root. Keys that could resolve outside it, or
    /// onto the staging area, are rejected.
    fn path_for(&self, key: &str, op: StoreOp) -> Result<PathBuf> {
        let rel = Path::new(key);
        let mut components = rel.components().peekable();
        if components.peek().is_none() {
            return Err(ArchiveError::store(op, key, "empty key"));
        }
        for component in components {
            match component {
                Component::Normal(part) if part != STAGING_DIR => {}
                _ => return Err(ArchiveError::store(op, key, "key escapes the store root")),
            }
        }
        Ok(self.root.join(rel))
    }

    fn session_dir(&self, upload_id: &str) -> PathBuf {
        self.root.join(STAGING_DIR).join(upload_id)
    }

    fn part_path(&self, upload_id: &str, part_number: i32) -> PathBuf {
        self.session_dir(upload_id).join(format!("{part_number:05}"))
    }

    /// Writes `data` to a sibling temp file and renames it onto `path`. The
    /// temp file is removed if any step fails.
    async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
        let dir = path.parent().unwrap_or(Path::new(""));
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir).await?;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = dir.join(format!(
            ".{name}.{}{TEMP_SUFFIX}",
            uuid::Uuid::new_v4().simple()
        ));

        let written = async {
            let mut f = fs::File::create(&temp).await?;
            f.write_all(data).await?;
            f.flush().await?;
            f.sync_all().await?;
            fs::rename(&temp, path).await
        }
        .await;
        if written.is_err() {
            let _ = fs::remove_file(&temp).await;
        }
        written
    }

    /// Checks that `upload_id` is open and was created for `key`.
    async fn open_session(&self, key: &str, upload_id: &str, op: StoreOp) -> Result<()> {
        let marker = self.session_dir(upload_id).join(SESSION_KEY_FILE);
        match fs::read_to_string(&marker).await {
            Ok(owner) if owner == key => Ok(()),
            Ok(owner) => Err(ArchiveError::store(
                op,
                key,
                format!("upload session {upload_id} belongs to `{owner}`"),
            )),
            Err(_) => Err(ArchiveError::store(
                op,
                key,
                format!("no such upload session {upload_id}"),
            )),
        }
    }
}

fn part_tag(data: &[u8]) -> String {
    format!("\"{:x}\"", md5::compute(data))
}

fn is_temp_file(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(TEMP_SUFFIX)
}

#[async_trait]
impl ObjectBackend for LocalFsBackend {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<()> {
        let op = StoreOp::PutObject;
        Self::write_atomic(&self.path_for(key, op)?, &data)
            .await
            .map_err(|e| ArchiveError::store(op, key, e))
    }

    async fn get_object(&self, key: &str) -> Result<Option<ObjectReader>> {
        let path = self.path_for(key, StoreOp::GetObject)?;
        match fs::File::open(path).await {
            Ok(f) => Ok(Some(Box::pin(f))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ArchiveError::store(StoreOp::GetObject, key, e)),
        }
    }

    async fn list_objects(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let root = self.root.clone();
        let walked = tokio::task::spawn_blocking(move || {
            let mut keys = Vec::new();
            if !root.exists() {
                return Ok(keys);
            }
            let staging = root.join(STAGING_DIR);
            let walker = WalkDir::new(&root)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.path() != staging);
            for entry in walker {
                let entry = entry?;
                if !entry.file_type().is_file()
                    || is_temp_file(&entry.file_name().to_string_lossy())
                {
                    continue;
                }
                if let Ok(rel) = entry.path().strip_prefix(&root) {
                    let key = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/");
                    keys.push(key);
                }
            }
            Ok::<_, walkdir::Error>(keys)
        })
        .await
        .map_err(|e| ArchiveError::store(StoreOp::ListObjects, prefix.unwrap_or(""), e))?
        .map_err(|e| ArchiveError::store(StoreOp::ListObjects, prefix.unwrap_or(""), e))?;

        Ok(match prefix {
            Some(p) => walked.into_iter().filter(|k| k.starts_with(p)).collect(),
            None => walked,
        })
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let path = self.path_for(key, StoreOp::DeleteObject)?;
        match fs::remove_file(path).await {
            // S3 DeleteObject is idempotent.
            Err(e) if e.kind() != ErrorKind::NotFound => {
                Err(ArchiveError::store(StoreOp::DeleteObject, key, e))
            }
            _ => Ok(()),
        }
    }

    async fn create_multipart_upload(&self, key: &str) -> Result<String> {
        let op = StoreOp::CreateMultipartUpload;
        self.path_for(key, op)?;
        let upload_id = uuid::Uuid::new_v4().simple().to_string();
        let marker = self.session_dir(&upload_id).join(SESSION_KEY_FILE);
        Self::write_atomic(&marker, key.as_bytes())
            .await
            .map_err(|e| ArchiveError::store(op, key, e))?;
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
        self.open_session(key, upload_id, op).await?;
        Self::write_atomic(&self.part_path(upload_id, part_number), &data)
            .await
            .map_err(|e| ArchiveError::store(op, key, e))?;
        Ok(part_tag(&data))
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let op = StoreOp::CompleteMultipartUpload;
        self.open_session(key, upload_id, op).await?;
        let dest = self.path_for(key, op)?;
        if parts.is_empty() {
            return Err(ArchiveError::store(op, key, "no parts to complete"));
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(ArchiveError::store(
                op,
                key,
                "parts are not in ascending order",
            ));
        }

        let mut assembled = Vec::new();
        for part in parts {
            let data = fs::read(self.part_path(upload_id, part.part_number))
                .await
                .map_err(|e| {
                    ArchiveError::store(op, key, format!("part {}: {e}", part.part_number))
                })?;
            if part_tag(&data) != part.e_tag {
                return Err(ArchiveError::store(
                    op,
                    key,
                    format!("ETag mismatch for part {}", part.part_number),
                ));
            }
            assembled.extend_from_slice(&data);
        }

        Self::write_atomic(&dest, &assembled)
            .await
            .map_err(|e| ArchiveError::store(op, key, e))?;
        fs::remove_dir_all(self.session_dir(upload_id))
            .await
            .map_err(|e| ArchiveError::store(op, key, e))?;
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        let op = StoreOp::AbortMultipartUpload;
        self.open_session(key, upload_id, op).await?;
        fs::remove_dir_all(self.session_dir(upload_id))
            .await
            .map_err(|e| ArchiveError::store(op, key, e))
    }
}
