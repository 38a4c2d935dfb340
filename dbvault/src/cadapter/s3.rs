//! S3-compatible backend built on aws-sdk-s3. Works against AWS S3,
//! Cloudflare R2 and MinIO-style endpoints (path-style addressing).

use crate::cadapter::client::{CompletedPart, ObjectBackend, ObjectReader};
use crate::error::{ArchiveError, Result, StoreOp};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart as S3CompletedPart};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use bytes::Bytes;

/// Connection settings for an S3-compatible bucket.
#[derive(Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl S3Config {
    /// Cloudflare R2 endpoint for an account id.
    pub fn r2_endpoint(account_id: &str) -> String {
        format!("https://{account_id}.r2.cloudflarestorage.com")
    }
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

pub struct S3Backend {
    client: Client,
    bucket: String,
}

impl S3Backend {
    pub async fn new(config: &S3Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "dbvault",
        );
        let conf = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .endpoint_url(config.endpoint.clone())
            .load()
            .await;
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf)
            .force_path_style(true)
            .build();
        Self::with_client(Client::from_conf(s3_conf), config.bucket.clone())
    }

    pub fn with_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    fn md5_base64(data: &[u8]) -> String {
        let sum = md5::compute(data);
        B64.encode(sum.0)
    }
}

fn sdk_err<E>(op: StoreOp, key: &str, err: E) -> ArchiveError
where
    E: std::error::Error,
{
    ArchiveError::store(op, key, DisplayErrorContext(err))
}

#[async_trait]
impl ObjectBackend for S3Backend {
    async fn put_object(&self, key: &str, data: Bytes) -> Result<()> {
        let checksum = Self::md5_base64(&data);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_md5(checksum)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| sdk_err(StoreOp::PutObject, key, e))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<ObjectReader>> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;
        match resp {
            Ok(o) => Ok(Some(Box::pin(o.body.into_async_read()))),
            Err(e) => match e.as_service_error() {
                Some(GetObjectError::NoSuchKey(_)) => Ok(None),
                _ => Err(sdk_err(StoreOp::GetObject, key, e)),
            },
        }
    }

    async fn list_objects(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        let scope = prefix.unwrap_or("");
        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix(prefix.map(str::to_string))
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| sdk_err(StoreOp::ListObjects, scope, e))?;
            keys.extend(
                resp.contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_string)),
            );
            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        Ok(keys)
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_err(StoreOp::DeleteObject, key, e))?;
        Ok(())
    }

    async fn create_multipart_upload(&self, key: &str) -> Result<String> {
        let create = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| sdk_err(StoreOp::CreateMultipartUpload, key, e))?;
        create.upload_id().map(str::to_string).ok_or_else(|| {
            ArchiveError::store(StoreOp::CreateMultipartUpload, key, "response carried no upload id")
        })
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        data: Bytes,
    ) -> Result<String> {
        let checksum = Self::md5_base64(&data);
        let resp = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .content_md5(checksum)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| sdk_err(StoreOp::UploadPart(part_number), key, e))?;
        resp.e_tag().map(str::to_string).ok_or_else(|| {
            ArchiveError::store(StoreOp::UploadPart(part_number), key, "response carried no ETag")
        })
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        let completed_parts = parts
            .iter()
            .map(|p| {
                S3CompletedPart::builder()
                    .part_number(p.part_number)
                    .e_tag(p.e_tag.clone())
                    .build()
            })
            .collect::<Vec<_>>();

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| sdk_err(StoreOp::CompleteMultipartUpload, key, e))?;
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> Result<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|e| sdk_err(StoreOp::AbortMultipartUpload, key, e))?;
        Ok(())
    }
}
