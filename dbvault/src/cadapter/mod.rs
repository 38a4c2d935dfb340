//! Object store adapter (cAdapter)
//!
//! Submodules:
//! - `client`: the `ObjectBackend` capability the transfer engine and the
//!   retention sweeper are written against
//! - `s3`: S3-compatible implementation (AWS, Cloudflare R2, MinIO)
//! - `localfs`: directory-backed implementation for dry runs
//! - `memory`: in-memory implementation for tests
//!
//! Backends do not retry; a failed call is reported to the caller as-is.
pub mod client;
pub mod localfs;
pub mod memory;
pub mod s3;

pub use client::{CompletedPart, ObjectBackend, ObjectReader};
