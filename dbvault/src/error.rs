use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Store call that produced a [`ArchiveError::StoreTransfer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    PutObject,
    GetObject,
    ListObjects,
    DeleteObject,
    CreateMultipartUpload,
    UploadPart(i32),
    CompleteMultipartUpload,
    AbortMultipartUpload,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreOp::PutObject => f.write_str("PutObject"),
            StoreOp::GetObject => f.write_str("GetObject"),
            StoreOp::ListObjects => f.write_str("ListObjectsV2"),
            StoreOp::DeleteObject => f.write_str("DeleteObject"),
            StoreOp::CreateMultipartUpload => f.write_str("CreateMultipartUpload"),
            StoreOp::UploadPart(n) => write!(f, "UploadPart(#{n})"),
            StoreOp::CompleteMultipartUpload => f.write_str("CompleteMultipartUpload"),
            StoreOp::AbortMultipartUpload => f.write_str("AbortMultipartUpload"),
        }
    }
}

/// Coarse failure classes reported to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Subprocess,
    StoreTransfer,
    LocalIo,
    Configuration,
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("command `{command}` failed ({status}): {stderr}")]
    Subprocess {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{op} failed for `{key}`: {message}")]
    StoreTransfer {
        op: StoreOp,
        key: String,
        message: String,
    },

    #[error("object `{0}` does not exist in the store")]
    ObjectNotFound(String),

    #[error("multipart upload {upload_id} of `{key}` aborted: {cause}")]
    MultipartAborted {
        key: String,
        upload_id: String,
        #[source]
        cause: Box<ArchiveError>,
        /// Set when the abort call itself failed; never replaces `cause`.
        abort_failure: Option<Box<ArchiveError>>,
    },

    #[error("io error on `{}`: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("missing required configuration: {0}")]
    ConfigurationMissing(&'static str),

    #[error("invalid configuration {name}: {reason}")]
    ConfigurationInvalid { name: &'static str, reason: String },

    #[error("cannot split {size} bytes into parts: {reason}")]
    InvalidLayout { size: u64, reason: String },
}

impl ArchiveError {
    pub fn store(op: StoreOp, key: impl Into<String>, err: impl fmt::Display) -> Self {
        ArchiveError::StoreTransfer {
            op,
            key: key.into(),
            message: err.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        ArchiveError::LocalIo {
            path: path.into(),
            source,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            ArchiveError::Subprocess { .. } => ErrorClass::Subprocess,
            ArchiveError::StoreTransfer { .. }
            | ArchiveError::ObjectNotFound(_)
            | ArchiveError::MultipartAborted { .. } => ErrorClass::StoreTransfer,
            ArchiveError::LocalIo { .. } => ErrorClass::LocalIo,
            ArchiveError::ConfigurationMissing(_)
            | ArchiveError::ConfigurationInvalid { .. }
            | ArchiveError::InvalidLayout { .. } => ErrorClass::Configuration,
        }
    }
}
