//! Tunable constants for the importer.

use std::time::Duration;

/// Rows per streamed batch. Bounds the converter's peak memory: one batch of
/// this many rows is the most that is ever materialized per file.
pub const DEFAULT_BATCH_SIZE: usize = 65_536;

/// Files converted concurrently by default.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Timeout applied to each metadata or batch read.
pub const READ_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for individual sink statements.
///
/// Wide multi-row inserts against an indexed table can legitimately take a
/// while; this only guards against a sink that stops responding entirely.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(180);

/// Buffer size for the parquet byte-range adapter.
///
/// Large ranges amortize request overhead and give the decompressor full
/// pages to work with.
pub const PARQUET_BUFFER_SIZE: usize = 256 * 1024; // 256 KB

/// Upper bound on bind parameters per INSERT statement; the Postgres wire
/// protocol caps them at 65535.
pub const MAX_INSERT_PARAMETERS: usize = 60_000;
