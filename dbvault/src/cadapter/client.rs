//! Object store capability used by the transfer engine and the cloud sweeper.
//!
//! Implementations hold only their connection context, so a single backend
//! value is shared by every concurrent part upload of a transfer.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::error::Result;

/// Body of a `GetObject` response, consumed incrementally.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// One uploaded part of a multipart session, as passed to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub e_tag: String,
}

#[async_trait]
pub trait ObjectBackend: Send + Sync {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<()>;

    /// `Ok(None)` when the key does not exist.
    async fn get_object(&self, key: &str) -> Result<Option<ObjectReader>>;

    /// All keys under `prefix` (or the whole bucket), in store order.
    async fn list_objects(&self, prefix: Option<&str>) -> Result<Vec<String>>;

    async fn delete_object(&self, key: &str) -> Result<()>;

    /// Opens a session and returns its upload id.
    async fn create_multipart_upload(&self, key: &str) -> Result<String>;

    /// Uploads one part and returns the integrity tag (ETag) the store
    /// assigned to it.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String>;

    /// `parts` must be in ascending part-number order.
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()>;

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()>;
}

#[async_trait]
impl<B: ObjectBackend + ?Sized> ObjectBackend for std::sync::Arc<B> {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<()> {
        (**self).put_object(key, data).await
    }

    async fn get_object(&self, key: &str) -> Result<Option<ObjectReader>> {
        (**self).get_object(key).await
    }

    async fn list_objects(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        (**self).list_objects(prefix).await
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        (**self).delete_object(key).await
    }

    async fn create_multipart_upload(&self, key: &str) -> Result<String> {
        (**self).create_multipart_upload(key).await
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        (**self).upload_part(key, upload_id, part_number, data).await
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        (**self).complete_multipart_upload(key, upload_id, parts).await
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        (**self).abort_multipart_upload(key, upload_id).await
    }
}
