//! Format readers over the byte-level I/O seam.

pub mod parquet;
pub mod reader;

pub use reader::{BatchReader, BatchStream, ReaderFactory, SourceMetadata};
