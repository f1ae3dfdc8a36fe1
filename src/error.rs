//! Error taxonomy for the import pipeline.
//!
//! Per-file errors (`ReadError`, `CoercionError`, `WriteError`, cancellation)
//! are caught at the file-task boundary and recorded in the report; only
//! `ReconcileError` aborts a run, because the target schema is shared by
//! every file.

use std::time::Duration;

use thiserror::Error;

use crate::schema::LogicalType;

/// Failure while opening or decoding a source file.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("source not found: {path}")]
    NotFound { path: String },

    #[error("corrupt or undecodable source: {reason}")]
    Corrupt { reason: String },

    #[error("unsupported source: {reason}")]
    Unsupported { reason: String },

    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while writing to the destination sink.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("sink unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("sink rejected write: {reason}")]
    Rejected { reason: String },

    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Two column declarations whose types cannot be merged.
#[derive(Debug, Clone, Error)]
#[error("column '{column}': cannot merge {left} with {right}")]
pub struct TypeConflict {
    pub column: String,
    pub left: LogicalType,
    pub right: LogicalType,
}

/// Fatal schema-reconciliation failure across input files.
///
/// `left_file` is the first file that contributed the accumulated type,
/// `right_file` the file whose declaration could not be merged into it.
#[derive(Debug, Clone, Error)]
#[error(
    "irreconcilable schemas: column '{column}' is {left} (from {left_file}) \
     but {right} in {right_file}"
)]
pub struct ReconcileError {
    pub column: String,
    pub left: LogicalType,
    pub left_file: String,
    pub right: LogicalType,
    pub right_file: String,
}

/// A value that cannot be represented under the reconciled type.
///
/// Reconciliation only chooses representable promotions, so this surfaces
/// only when a file's data contradicts its declared schema. Aborts the
/// conversion of the file it occurs in.
#[derive(Debug, Clone, Error)]
#[error("column '{column}', row {row_offset}: cannot coerce {value} to {target}")]
pub struct CoercionError {
    pub column: String,
    pub row_offset: usize,
    pub value: String,
    pub target: LogicalType,
}

/// Any error that fails a single file without failing the run.
#[derive(Debug, Error)]
pub enum FileError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Coercion(#[from] CoercionError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("import cancelled")]
    Cancelled,
}

impl FileError {
    /// Stable kind label used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            FileError::Read(_) => "read",
            FileError::Coercion(_) => "coercion",
            FileError::Write(_) => "write",
            FileError::Cancelled => "cancelled",
        }
    }
}
