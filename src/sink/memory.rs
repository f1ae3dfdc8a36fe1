//! In-memory sink: collects the unified batch stream for embedders that
//! render or post-process results directly, and for end-to-end tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{SinkHandle, SinkWriter};
use crate::batch::RowBatch;
use crate::error::WriteError;
use crate::schema::{ReconciledSchema, Schema};

#[derive(Default)]
struct State {
    schema: Option<Schema>,
    batches: Vec<RowBatch>,
    prepare_count: usize,
    write_count: usize,
    fail_write_at: Option<usize>,
}

/// Collects committed batches behind a mutex. `prepare` resets the collected
/// data, mirroring a replaced destination table.
#[derive(Default)]
pub struct MemorySink {
    state: Arc<Mutex<State>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema the sink was prepared with, if any.
    pub fn schema(&self) -> Option<Schema> {
        self.state.lock().unwrap().schema.clone()
    }

    /// Batches committed through closed handles, in commit order.
    pub fn batches(&self) -> Vec<RowBatch> {
        self.state.lock().unwrap().batches.clone()
    }

    pub fn rows(&self) -> u64 {
        self.state
            .lock()
            .unwrap()
            .batches
            .iter()
            .map(|b| b.num_rows() as u64)
            .sum()
    }

    pub fn prepare_count(&self) -> usize {
        self.state.lock().unwrap().prepare_count
    }

    /// Make the n-th `write_batch` call (0-based, across all handles) fail.
    #[cfg(test)]
    pub fn fail_write_at(&self, n: usize) {
        self.state.lock().unwrap().fail_write_at = Some(n);
    }
}

#[async_trait]
impl SinkWriter for MemorySink {
    async fn prepare(&self, schema: &ReconciledSchema) -> Result<(), WriteError> {
        let mut state = self.state.lock().unwrap();
        state.schema = Some(schema.schema());
        state.batches.clear();
        state.prepare_count += 1;
        Ok(())
    }

    async fn open(&self, _schema: &ReconciledSchema) -> Result<Box<dyn SinkHandle>, WriteError> {
        Ok(Box::new(MemorySinkHandle {
            state: Arc::clone(&self.state),
            staged: Vec::new(),
        }))
    }
}

/// Stages batches until close; a dropped handle commits nothing.
struct MemorySinkHandle {
    state: Arc<Mutex<State>>,
    staged: Vec<RowBatch>,
}

#[async_trait]
impl SinkHandle for MemorySinkHandle {
    async fn write_batch(&mut self, batch: RowBatch) -> Result<(), WriteError> {
        {
            let mut state = self.state.lock().unwrap();
            let this_write = state.write_count;
            state.write_count += 1;
            if state.fail_write_at == Some(this_write) {
                return Err(WriteError::Rejected {
                    reason: "injected write failure".to_string(),
                });
            }
        }
        self.staged.push(batch);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), WriteError> {
        let mut state = self.state.lock().unwrap();
        state.batches.extend(self.staged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::ColumnData;
    use crate::schema::{Column, LogicalType, PromotionPolicy, reconcile};

    fn reconciled() -> ReconciledSchema {
        let schema =
            Schema::new(vec![Column::new("x", LogicalType::Int32, false)]).unwrap();
        reconcile(&[("f".to_string(), schema)], PromotionPolicy::default()).unwrap()
    }

    fn batch(values: Vec<Option<i32>>) -> RowBatch {
        RowBatch::new(vec![ColumnData::Int32(values)]).unwrap()
    }

    #[tokio::test]
    async fn test_close_commits_staged_batches() {
        let sink = MemorySink::new();
        let schema = reconciled();
        sink.prepare(&schema).await.unwrap();

        let mut handle = sink.open(&schema).await.unwrap();
        handle.write_batch(batch(vec![Some(1)])).await.unwrap();
        handle.write_batch(batch(vec![Some(2)])).await.unwrap();
        assert_eq!(sink.rows(), 0);

        handle.close().await.unwrap();
        assert_eq!(sink.rows(), 2);
        assert_eq!(sink.batches().len(), 2);
    }

    #[tokio::test]
    async fn test_dropped_handle_commits_nothing() {
        let sink = MemorySink::new();
        let schema = reconciled();
        sink.prepare(&schema).await.unwrap();

        let mut handle = sink.open(&schema).await.unwrap();
        handle.write_batch(batch(vec![Some(1)])).await.unwrap();
        drop(handle);

        assert_eq!(sink.rows(), 0);
    }

    #[tokio::test]
    async fn test_prepare_truncates_previous_run() {
        let sink = MemorySink::new();
        let schema = reconciled();
        sink.prepare(&schema).await.unwrap();

        let mut handle = sink.open(&schema).await.unwrap();
        handle.write_batch(batch(vec![Some(1)])).await.unwrap();
        handle.close().await.unwrap();
        assert_eq!(sink.rows(), 1);

        sink.prepare(&schema).await.unwrap();
        assert_eq!(sink.rows(), 0);
        assert_eq!(sink.prepare_count(), 2);
    }
}
