//! dbvault: point-in-time database backups archived to S3-compatible object
//! storage, with retention on both the local and the cloud tier.
//!
//! The binary wires these modules together; the library is what the
//! integration tests exercise.

pub mod artifact;
pub mod cadapter;
pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod orchestrator;
pub mod retention;
pub mod transfer;

pub use error::{ArchiveError, Result};
