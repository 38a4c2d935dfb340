//! Transfer engine: moves artifacts between local disk and the object store.
//!
//! - `chunk`: splitting an artifact into numbered byte ranges
//! - `engine`: single-put / multipart upload and streamed download
pub mod chunk;
pub mod engine;

pub use chunk::{ChunkLayout, PartRange};
pub use engine::{DownloadReport, TransferConfig, TransferEngine, UploadMode, UploadReport};
