use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::parquet::GenericParquetReader;
use crate::batch::RowBatch;
use crate::error::ReadError;
use crate::io::{LocalFileByteReader, SourceUri};
use crate::schema::Schema;

/// Size and row-count hints for an input file, used for progress totals.
#[derive(Debug, Clone)]
pub struct SourceMetadata {
    pub size_bytes: u64,
    pub estimated_rows: Option<u64>,
}

/// Capability boundary around the external format decoder.
///
/// `open_schema` touches only file metadata; row data is read exclusively
/// through the pull-based stream returned by `open_batches`.
#[async_trait]
pub trait BatchReader: Send + Sync {
    /// Decode the file's native schema without reading row data.
    async fn open_schema(&self) -> Result<Schema, ReadError>;

    /// Size and estimated row count, from metadata only.
    async fn metadata(&self) -> Result<SourceMetadata, ReadError>;

    /// Start streaming row batches of at most `batch_size` rows.
    ///
    /// The stream is finite and not restartable; call again to re-read.
    async fn open_batches(&self, batch_size: usize) -> Result<Box<dyn BatchStream>, ReadError>;
}

/// Pull-based sequence of row batches. The consumer drives the pace, so the
/// reader never buffers more than one batch ahead.
#[async_trait]
pub trait BatchStream: Send {
    /// The next batch, `None` once the file is exhausted.
    async fn next_batch(&mut self) -> Option<Result<RowBatch, ReadError>>;
}

/// Builds a reader for each input file location.
pub struct ReaderFactory {
    read_timeout: Duration,
}

impl ReaderFactory {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }

    /// Resolve a file location into a reader.
    ///
    /// Never fails directly: a location that cannot be interpreted yields a
    /// reader whose `open_schema` reports the problem, so the coordinator
    /// records the file as skipped instead of aborting the run.
    pub fn open(&self, source: &str) -> Arc<dyn BatchReader> {
        match SourceUri::parse(source) {
            Ok(SourceUri::Local(path)) => Arc::new(GenericParquetReader::new(
                LocalFileByteReader::new(path),
                self.read_timeout,
            )),
            Err(e) => Arc::new(UnreadableSource {
                reason: e.to_string(),
            }),
        }
    }
}

/// Stand-in reader for locations that could not be interpreted.
struct UnreadableSource {
    reason: String,
}

#[async_trait]
impl BatchReader for UnreadableSource {
    async fn open_schema(&self) -> Result<Schema, ReadError> {
        Err(ReadError::Unsupported {
            reason: self.reason.clone(),
        })
    }

    async fn metadata(&self) -> Result<SourceMetadata, ReadError> {
        Err(ReadError::Unsupported {
            reason: self.reason.clone(),
        })
    }

    async fn open_batches(&self, _batch_size: usize) -> Result<Box<dyn BatchStream>, ReadError> {
        Err(ReadError::Unsupported {
            reason: self.reason.clone(),
        })
    }
}
