//! Destination sinks: the capability boundary that durably receives
//! converted row batches.

pub mod memory;
pub mod postgres;

pub use memory::MemorySink;
pub use postgres::PostgresSink;

use async_trait::async_trait;

use crate::batch::RowBatch;
use crate::error::WriteError;
use crate::schema::ReconciledSchema;

/// Disposition when the destination table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfExists {
    /// Refuse to write into an existing table.
    Fail,
    /// Drop and recreate the table before writing.
    Replace,
    /// Keep the table and append rows.
    Append,
}

impl IfExists {
    /// Parse from a CLI string (case-insensitive).
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "fail" => Ok(IfExists::Fail),
            "replace" => Ok(IfExists::Replace),
            "append" => Ok(IfExists::Append),
            _ => Err(anyhow::anyhow!(
                "unknown if-exists disposition: {}. Supported: fail, replace, append",
                s
            )),
        }
    }
}

/// A destination for converted batches.
///
/// `prepare` runs once per import, after schema reconciliation succeeds and
/// before any handle opens; it is the only place the sink may create or
/// replace the destination shape. Each file task then writes through its own
/// handle, which keeps batches of one file in read order while files
/// proceed in parallel.
#[async_trait]
pub trait SinkWriter: Send + Sync {
    async fn prepare(&self, schema: &ReconciledSchema) -> Result<(), WriteError>;

    async fn open(&self, schema: &ReconciledSchema) -> Result<Box<dyn SinkHandle>, WriteError>;
}

/// One writer session. Closing commits everything written through the
/// handle; a dropped handle makes no visibility guarantees.
#[async_trait]
pub trait SinkHandle: Send {
    async fn write_batch(&mut self, batch: RowBatch) -> Result<(), WriteError>;

    async fn close(self: Box<Self>) -> Result<(), WriteError>;
}
