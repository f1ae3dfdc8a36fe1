//! Parquet reader implementing the pipeline's batch-reader contract.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parquet::arrow::async_reader::{ParquetRecordBatchStream, ParquetRecordBatchStreamBuilder};

use super::adapter::ByteReaderAdapter;
use super::conversion;
use crate::batch::RowBatch;
use crate::error::ReadError;
use crate::formats::reader::{BatchReader, BatchStream, SourceMetadata};
use crate::io::ByteReader;
use crate::schema::Schema;

/// Parquet file reader over any `ByteReader`.
///
/// Each `open_schema`/`open_batches` call reopens the file through a fresh
/// adapter; streams are not restartable.
pub struct GenericParquetReader<R: ByteReader> {
    reader: R,
    read_timeout: Duration,
}

impl<R: ByteReader + Clone + 'static> GenericParquetReader<R> {
    pub fn new(reader: R, read_timeout: Duration) -> Self {
        Self {
            reader,
            read_timeout,
        }
    }

    /// Open the file footer and build a stream builder (metadata only; no
    /// row data is decoded yet).
    async fn stream_builder(
        &self,
    ) -> Result<ParquetRecordBatchStreamBuilder<ByteReaderAdapter<R>>, ReadError> {
        let adapter = ByteReaderAdapter::new(self.reader.clone()).await?;

        match tokio::time::timeout(
            self.read_timeout,
            ParquetRecordBatchStreamBuilder::new(adapter),
        )
        .await
        {
            Err(_) => Err(ReadError::Timeout(self.read_timeout)),
            Ok(Err(e)) => Err(ReadError::Corrupt {
                reason: e.to_string(),
            }),
            Ok(Ok(builder)) => Ok(builder),
        }
    }
}

#[async_trait]
impl<R: ByteReader + Clone + 'static> BatchReader for GenericParquetReader<R> {
    async fn open_schema(&self) -> Result<Schema, ReadError> {
        let builder = self.stream_builder().await?;
        conversion::schema_from_arrow(builder.schema().as_ref())
    }

    async fn metadata(&self) -> Result<SourceMetadata, ReadError> {
        let size_bytes = self.reader.size().await?;
        let builder = self.stream_builder().await?;
        let total_rows: i64 = builder
            .metadata()
            .row_groups()
            .iter()
            .map(|rg| rg.num_rows())
            .sum();

        Ok(SourceMetadata {
            size_bytes,
            estimated_rows: Some(total_rows as u64),
        })
    }

    async fn open_batches(&self, batch_size: usize) -> Result<Box<dyn BatchStream>, ReadError> {
        let builder = self.stream_builder().await?;
        let stream = builder
            .with_batch_size(batch_size)
            .build()
            .map_err(|e| ReadError::Corrupt {
                reason: e.to_string(),
            })?;

        Ok(Box::new(ParquetBatchStream {
            stream: Box::pin(stream),
            read_timeout: self.read_timeout,
        }))
    }
}

struct ParquetBatchStream<R: ByteReader + 'static> {
    stream: Pin<Box<ParquetRecordBatchStream<ByteReaderAdapter<R>>>>,
    read_timeout: Duration,
}

#[async_trait]
impl<R: ByteReader + 'static> BatchStream for ParquetBatchStream<R> {
    async fn next_batch(&mut self) -> Option<Result<RowBatch, ReadError>> {
        match tokio::time::timeout(self.read_timeout, self.stream.next()).await {
            Err(_) => Some(Err(ReadError::Timeout(self.read_timeout))),
            Ok(None) => None,
            Ok(Some(Err(e))) => Some(Err(ReadError::Corrupt {
                reason: e.to_string(),
            })),
            Ok(Some(Ok(batch))) => Some(conversion::row_batch_from_arrow(&batch)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ColumnData;
    use crate::io::LocalFileByteReader;
    use crate::schema::LogicalType;
    use arrow::array::{Float64Array, Int32Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
    use arrow::record_batch::RecordBatch;
    use parquet::arrow::ArrowWriter;
    use parquet::file::properties::WriterProperties;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn create_test_parquet_file(num_rows: usize, row_group_size: usize) -> NamedTempFile {
        let temp_file = NamedTempFile::new().unwrap();

        let schema = ArrowSchema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new("name", DataType::Utf8, true),
            Field::new("value", DataType::Float64, true),
        ]);

        let props = WriterProperties::builder()
            .set_max_row_group_size(row_group_size)
            .build();

        let file = std::fs::File::create(temp_file.path()).unwrap();
        let mut writer = ArrowWriter::try_new(file, Arc::new(schema.clone()), Some(props)).unwrap();

        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![
                Arc::new(Int32Array::from_iter_values(0..num_rows as i32)),
                Arc::new(StringArray::from_iter_values(
                    (0..num_rows).map(|i| format!("name_{}", i)),
                )),
                Arc::new(Float64Array::from_iter_values(
                    (0..num_rows).map(|i| i as f64 * 1.5),
                )),
            ],
        )
        .unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
        temp_file
    }

    fn reader_for(temp: &NamedTempFile) -> GenericParquetReader<LocalFileByteReader> {
        GenericParquetReader::new(
            LocalFileByteReader::new(temp.path()),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_open_schema() {
        let temp = create_test_parquet_file(10, 1000);
        let schema = reader_for(&temp).open_schema().await.unwrap();

        assert_eq!(schema.len(), 3);
        assert_eq!(schema.columns()[0].data_type, LogicalType::Int32);
        assert!(!schema.columns()[0].nullable);
        assert_eq!(schema.columns()[1].data_type, LogicalType::Utf8);
        assert!(schema.columns()[1].nullable);
        assert_eq!(schema.columns()[2].data_type, LogicalType::Float64);
    }

    #[tokio::test]
    async fn test_metadata_counts_rows() {
        let temp = create_test_parquet_file(250, 100);
        let metadata = reader_for(&temp).metadata().await.unwrap();
        assert!(metadata.size_bytes > 0);
        assert_eq!(metadata.estimated_rows, Some(250));
    }

    #[tokio::test]
    async fn test_streaming_respects_batch_size() {
        let temp = create_test_parquet_file(1000, 10_000);
        let reader = reader_for(&temp);

        let mut stream = reader.open_batches(100).await.unwrap();
        let mut batches = 0usize;
        let mut rows = 0usize;
        let mut next_id = 0i32;

        while let Some(result) = stream.next_batch().await {
            let batch = result.unwrap();
            assert!(batch.num_rows() <= 100);
            batches += 1;
            rows += batch.num_rows();

            // Batches arrive in file order.
            if let ColumnData::Int32(ids) = batch.column(0) {
                for id in ids.iter().flatten() {
                    assert_eq!(*id, next_id);
                    next_id += 1;
                }
            } else {
                panic!("expected int32 ids");
            }
        }

        assert_eq!(rows, 1000);
        assert!(batches >= 10);
    }

    #[tokio::test]
    async fn test_corrupt_file_reports_corrupt() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(b"these are not the bytes you are looking for")
            .unwrap();
        temp.flush().unwrap();

        let err = reader_for(&temp).open_schema().await.unwrap_err();
        assert!(matches!(err, ReadError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_reports_not_found() {
        let reader = GenericParquetReader::new(
            LocalFileByteReader::new("/no/such/file.parquet"),
            Duration::from_secs(5),
        );
        let err = reader.open_schema().await.unwrap_err();
        assert!(matches!(err, ReadError::NotFound { .. }));
    }
}
