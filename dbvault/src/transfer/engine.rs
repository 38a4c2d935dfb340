//! Upload and download of whole artifacts.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, stream};
use tokio::fs::{self, File};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufWriter};

use super::chunk::{ChunkLayout, PartRange};
use crate::cadapter::client::{CompletedPart, ObjectBackend};
use crate::error::{ArchiveError, Result, StoreOp};

pub const DEFAULT_MAX_IN_FLIGHT_PARTS: usize = 4;

const COPY_BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    pub layout: ChunkLayout,
    /// Upper bound on part uploads running at the same time.
    pub max_in_flight_parts: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            layout: ChunkLayout::default(),
            max_in_flight_parts: DEFAULT_MAX_IN_FLIGHT_PARTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadMode {
    SinglePut,
    Multipart {
        upload_id: String,
        parts: Vec<CompletedPart>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub key: String,
    pub size: u64,
    pub mode: UploadMode,
}

impl UploadReport {
    pub fn part_count(&self) -> usize {
        match &self.mode {
            UploadMode::SinglePut => 1,
            UploadMode::Multipart { parts, .. } => parts.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReport {
    pub key: String,
    pub path: PathBuf,
    pub bytes: u64,
}

/// Moves artifacts between the local disk and an [`ObjectBackend`].
///
/// Uploads above the layout's part size are sent as a multipart session
/// whose parts run concurrently, at most `max_in_flight_parts` at a time.
/// Any part or completion failure aborts the session before the error is
/// returned. Nothing is retried.
pub struct TransferEngine<B> {
    backend: B,
    config: TransferConfig,
}

impl<B: ObjectBackend> TransferEngine<B> {
    pub fn new(backend: B, config: TransferConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    pub async fn upload(&self, path: &Path, key: &str) -> Result<UploadReport> {
        let size = fs::metadata(path)
            .await
            .map_err(|e| ArchiveError::io(path, e))?
            .len();

        let layout = self.config.layout;
        if !layout.is_multipart(size) {
            let data = fs::read(path).await.map_err(|e| ArchiveError::io(path, e))?;
            self.backend.put_object(key, Bytes::from(data)).await?;
            return Ok(UploadReport {
                key: key.to_string(),
                size,
                mode: UploadMode::SinglePut,
            });
        }

        // Plan before opening the session so a bad layout leaves nothing behind.
        let plan = layout.plan(size)?;
        let upload_id = self.backend.create_multipart_upload(key).await?;

        let parts = match self.upload_parts(path, key, &upload_id, plan).await {
            Ok(parts) => parts,
            Err(cause) => return Err(self.abort(key, &upload_id, cause).await),
        };

        if let Err(cause) = self
            .backend
            .complete_multipart_upload(key, &upload_id, &parts)
            .await
        {
            return Err(self.abort(key, &upload_id, cause).await);
        }

        Ok(UploadReport {
            key: key.to_string(),
            size,
            mode: UploadMode::Multipart { upload_id, parts },
        })
    }

    /// Uploads every part and returns them in ascending part order, whatever
    /// order they finished in. Stops at the first failure; parts still in
    /// flight are dropped.
    async fn upload_parts(
        &self,
        path: &Path,
        key: &str,
        upload_id: &str,
        plan: Vec<PartRange>,
    ) -> Result<Vec<CompletedPart>> {
        let limit = self.config.max_in_flight_parts.max(1);
        let mut parts: Vec<CompletedPart> = stream::iter(plan)
            .map(|range| self.upload_part(path, key, upload_id, range))
            .buffer_unordered(limit)
            .try_collect()
            .await?;
        parts.sort_by_key(|p| p.part_number);
        Ok(parts)
    }

    async fn upload_part(
        &self,
        path: &Path,
        key: &str,
        upload_id: &str,
        range: PartRange,
    ) -> Result<CompletedPart> {
        let data = read_range(path, range).await?;
        let e_tag = self
            .backend
            .upload_part(key, upload_id, range.part_number, data)
            .await?;
        Ok(CompletedPart {
            part_number: range.part_number,
            e_tag,
        })
    }

    async fn abort(&self, key: &str, upload_id: &str, cause: ArchiveError) -> ArchiveError {
        let abort_failure = self
            .backend
            .abort_multipart_upload(key, upload_id)
            .await
            .err()
            .map(Box::new);
        ArchiveError::MultipartAborted {
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            cause: Box::new(cause),
            abort_failure,
        }
    }

    /// Streams the object at `key` into `path`, creating parent directories.
    /// A partially written destination is removed on failure.
    pub async fn download(&self, key: &str, path: &Path) -> Result<DownloadReport> {
        let reader = self
            .backend
            .get_object(key)
            .await?
            .ok_or_else(|| ArchiveError::ObjectNotFound(key.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ArchiveError::io(parent, e))?;
        }
        let file = File::create(path)
            .await
            .map_err(|e| ArchiveError::io(path, e))?;

        match copy_body(reader, BufWriter::new(file), key, path).await {
            Ok(bytes) => Ok(DownloadReport {
                key: key.to_string(),
                path: path.to_path_buf(),
                bytes,
            }),
            Err(e) => {
                let _ = fs::remove_file(path).await;
                Err(e)
            }
        }
    }
}

async fn read_range(path: &Path, range: PartRange) -> Result<Bytes> {
    let mut file = File::open(path)
        .await
        .map_err(|e| ArchiveError::io(path, e))?;
    file.seek(SeekFrom::Start(range.offset))
        .await
        .map_err(|e| ArchiveError::io(path, e))?;
    let mut buf = vec![0u8; range.len as usize];
    file.read_exact(&mut buf)
        .await
        .map_err(|e| ArchiveError::io(path, e))?;
    Ok(Bytes::from(buf))
}

/// Copies the body chunk by chunk so read failures are attributed to the
/// store and write failures to the local file.
async fn copy_body<R, W>(mut reader: R, mut writer: W, key: &str, path: &Path) -> Result<u64>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .await
            .map_err(|e| ArchiveError::store(StoreOp::GetObject, key, e))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .await
            .map_err(|e| ArchiveError::io(path, e))?;
        total += n as u64;
    }
    writer.flush().await.map_err(|e| ArchiveError::io(path, e))?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cadapter::memory::InMemoryBackend;

    #[tokio::test]
    async fn test_read_range_reads_exact_slice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"0123456789").unwrap();
        let data = read_range(
            &path,
            PartRange {
                part_number: 2,
                offset: 4,
                len: 3,
            },
        )
        .await
        .unwrap();
        assert_eq!(&data[..], b"456");
    }

    #[tokio::test]
    async fn test_zero_byte_artifact_uses_single_put() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.tar");
        std::fs::write(&path, b"").unwrap();
        let engine = TransferEngine::new(InMemoryBackend::new(), TransferConfig::default());
        let report = engine.upload(&path, "db/empty.tar").await.unwrap();
        assert_eq!(report.mode, UploadMode::SinglePut);
        assert_eq!(engine.backend().object("db/empty.tar").unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_missing_source_is_local_io_error() {
        let engine = TransferEngine::new(InMemoryBackend::new(), TransferConfig::default());
        let err = engine
            .upload(Path::new("/nonexistent/dbvault/backup_1.tar"), "k")
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::LocalIo { .. }));
    }

    #[tokio::test]
    async fn test_download_absent_object_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("restore/backup_1.tar");
        let engine = TransferEngine::new(InMemoryBackend::new(), TransferConfig::default());
        let err = engine.download("db/backup_1.tar", &dest).await.unwrap_err();
        assert!(matches!(err, ArchiveError::ObjectNotFound(_)));
        assert!(!dest.exists());
    }
}
