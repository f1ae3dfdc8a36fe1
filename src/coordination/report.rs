//! The structured result of an import run, built incrementally and handed
//! to the caller (or a UI layer) for rendering.

use serde::Serialize;

use crate::error::FileError;
use crate::schema::ReconciledSchema;

/// Terminal state of one input file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Succeeded { rows: u64 },
    Failed { error_kind: String, message: String },
    Skipped { reason: String },
}

impl FileStatus {
    pub fn failed(error: &FileError) -> Self {
        FileStatus::Failed {
            error_kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, FileStatus::Succeeded { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub source: String,
    #[serde(flatten)]
    pub status: FileStatus,
}

/// Per-file outcomes plus the reconciled schema and aggregate counts. The
/// only artifact that outlives a run.
#[derive(Debug, Serialize)]
pub struct ImportReport {
    pub run_id: String,
    pub started_at: String,
    pub duration_ms: u64,
    pub schema: ReconciledSchema,
    pub files: Vec<FileReport>,
    /// Total input files, including skipped ones.
    pub files_attempted: usize,
    pub files_succeeded: usize,
    pub rows_written: u64,
}

impl ImportReport {
    pub(crate) fn assemble(
        run_id: String,
        started_at: String,
        duration_ms: u64,
        schema: ReconciledSchema,
        files: Vec<FileReport>,
    ) -> Self {
        let files_attempted = files.len();
        let files_succeeded = files.iter().filter(|f| f.status.is_succeeded()).count();
        let rows_written = files
            .iter()
            .map(|f| match f.status {
                FileStatus::Succeeded { rows } => rows,
                _ => 0,
            })
            .sum();

        Self {
            run_id,
            started_at,
            duration_ms,
            schema,
            files,
            files_attempted,
            files_succeeded,
            rows_written,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_aggregates() {
        let files = vec![
            FileReport {
                source: "a".into(),
                status: FileStatus::Succeeded { rows: 10 },
            },
            FileReport {
                source: "b".into(),
                status: FileStatus::Failed {
                    error_kind: "read".into(),
                    message: "corrupt".into(),
                },
            },
            FileReport {
                source: "c".into(),
                status: FileStatus::Skipped {
                    reason: "missing".into(),
                },
            },
            FileReport {
                source: "d".into(),
                status: FileStatus::Succeeded { rows: 32 },
            },
        ];

        let report = ImportReport::assemble(
            "run".into(),
            "2026-01-01T00:00:00Z".into(),
            5,
            ReconciledSchema::empty(),
            files,
        );

        assert_eq!(report.files_attempted, 4);
        assert_eq!(report.files_succeeded, 2);
        assert_eq!(report.rows_written, 42);
    }

    #[test]
    fn test_status_serialization_shape() {
        let report = FileReport {
            source: "a.parquet".into(),
            status: FileStatus::Failed {
                error_kind: "write".into(),
                message: "sink rejected write".into(),
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error_kind"], "write");
        assert_eq!(json["source"], "a.parquet");
    }
}
