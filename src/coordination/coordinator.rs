//! Drives an import run: a schema pass over every input file, schema
//! reconciliation, then a data pass on a bounded worker pool with per-file
//! failure isolation.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::report::{FileReport, FileStatus, ImportReport};
use crate::convert::project;
use crate::error::{FileError, ReconcileError};
use crate::formats::BatchReader;
use crate::schema::{PromotionPolicy, ReconciledSchema, Schema, reconcile};
use crate::sink::SinkWriter;
use crate::telemetry::{ProgressStats, TelemetryEvent};

/// Explicit per-run state shared with callers; carries the cancellation
/// signal checked between batches.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub cancel: CancellationToken,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// One input file: its display identity plus the reader resolved for it.
pub struct ImportSource {
    pub id: String,
    pub reader: Arc<dyn BatchReader>,
}

/// Knobs for a run.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub batch_size: usize,
    pub worker_count: usize,
    pub promotion: PromotionPolicy,
    pub quiet: bool,
}

/// Orchestrates the pipeline across all input files. Holds no state beyond
/// the in-flight run.
pub struct Coordinator {
    sink: Arc<dyn SinkWriter>,
    config: ImportConfig,
}

impl Coordinator {
    pub fn new(sink: Arc<dyn SinkWriter>, config: ImportConfig) -> Self {
        Self { sink, config }
    }

    /// Run the import.
    ///
    /// Files whose schema cannot be read are recorded as skipped without
    /// aborting; a reconciliation conflict is the only fatal outcome and
    /// returns before the sink is touched. Once the data pass starts, any
    /// per-file failure is caught at the task boundary and the run
    /// continues, so a report is always produced.
    pub async fn run(
        &self,
        sources: Vec<ImportSource>,
        ctx: &RunContext,
    ) -> Result<ImportReport, ReconcileError> {
        let started = Instant::now();
        let started_at = Utc::now().to_rfc3339();
        let run_id = Uuid::new_v4().to_string();
        info!(run_id = %run_id, files = sources.len(), "starting import run");

        let mut statuses: Vec<Option<FileStatus>> = (0..sources.len()).map(|_| None).collect();

        if ctx.cancel.is_cancelled() {
            for status in &mut statuses {
                *status = Some(FileStatus::failed(&FileError::Cancelled));
            }
            return Ok(assemble(
                run_id,
                started_at,
                started,
                ReconciledSchema::empty(),
                &sources,
                statuses,
            ));
        }

        // Schema pass: open every file's metadata; unreadable files are
        // skipped, never fatal.
        let opened = futures::future::join_all(sources.iter().map(|source| async move {
            let schema = source.reader.open_schema().await;
            let metadata = source.reader.metadata().await.ok();
            (schema, metadata)
        }))
        .await;

        let mut inputs: Vec<(String, Schema)> = Vec::new();
        let mut pending: Vec<(usize, Schema)> = Vec::new();
        let mut estimated_rows = 0u64;
        for (idx, (schema, metadata)) in opened.into_iter().enumerate() {
            match schema {
                Ok(schema) => {
                    if let Some(m) = metadata {
                        debug!(
                            file = %sources[idx].id,
                            size_bytes = m.size_bytes,
                            rows = m.estimated_rows,
                            "source opened"
                        );
                        estimated_rows += m.estimated_rows.unwrap_or(0);
                    }
                    inputs.push((sources[idx].id.clone(), schema.clone()));
                    pending.push((idx, schema));
                }
                Err(e) => {
                    warn!(file = %sources[idx].id, error = %e, "skipping file: schema unreadable");
                    statuses[idx] = Some(FileStatus::Skipped {
                        reason: e.to_string(),
                    });
                }
            }
        }

        let reconciled = if inputs.is_empty() {
            ReconciledSchema::empty()
        } else {
            reconcile(&inputs, self.config.promotion)?
        };
        info!(
            columns = reconciled.len(),
            files = pending.len(),
            "schemas reconciled"
        );

        // The destination is shaped exactly once, and only after
        // reconciliation has succeeded.
        if !pending.is_empty()
            && let Err(e) = self.sink.prepare(&reconciled).await
        {
            warn!(error = %e, "sink preparation failed");
            let failure = FileStatus::failed(&FileError::Write(e));
            for (idx, _) in pending {
                statuses[idx] = Some(failure.clone());
            }
            return Ok(assemble(
                run_id, started_at, started, reconciled, &sources, statuses,
            ));
        }

        // Data pass over a bounded pool; batches within one file stay in
        // read order because each task owns its stream exclusively.
        let reconciled = Arc::new(reconciled);
        let (telemetry_tx, telemetry_rx) = mpsc::unbounded_channel::<TelemetryEvent>();
        let progress = self.spawn_progress_tracking(pending.len(), estimated_rows, telemetry_rx);

        let mut tasks: JoinSet<(usize, FileStatus)> = JoinSet::new();
        for (idx, native_schema) in pending {
            while tasks.len() >= self.config.worker_count.max(1) {
                if let Some(joined) = tasks.join_next().await {
                    record_outcome(&mut statuses, joined);
                }
            }

            if ctx.cancel.is_cancelled() {
                statuses[idx] = Some(FileStatus::failed(&FileError::Cancelled));
                continue;
            }

            let source_id = sources[idx].id.clone();
            let reader = Arc::clone(&sources[idx].reader);
            let sink = Arc::clone(&self.sink);
            let reconciled = Arc::clone(&reconciled);
            let cancel = ctx.cancel.clone();
            let telemetry = telemetry_tx.clone();
            let batch_size = self.config.batch_size;

            tasks.spawn(async move {
                let _ = telemetry.send(TelemetryEvent::FileStarted);
                let outcome = stream_file(
                    &source_id,
                    reader,
                    native_schema,
                    &reconciled,
                    sink,
                    batch_size,
                    cancel,
                    &telemetry,
                )
                .await;

                let status = match outcome {
                    Ok(rows) => {
                        info!(file = %source_id, rows, "file imported");
                        FileStatus::Succeeded { rows }
                    }
                    Err(e) => {
                        warn!(file = %source_id, error = %e, "file failed");
                        FileStatus::failed(&e)
                    }
                };
                let _ = telemetry.send(TelemetryEvent::FileFinished {
                    failed: !status.is_succeeded(),
                });
                (idx, status)
            });
        }

        // Close the coordinator's sender so the tracker drains and exits.
        drop(telemetry_tx);

        while let Some(joined) = tasks.join_next().await {
            record_outcome(&mut statuses, joined);
        }
        if let Some(tracker) = progress {
            let _ = tracker.await;
        }

        let reconciled = Arc::try_unwrap(reconciled).unwrap_or_else(|arc| (*arc).clone());
        let report = assemble(run_id, started_at, started, reconciled, &sources, statuses);
        info!(
            files_succeeded = report.files_succeeded,
            rows_written = report.rows_written,
            duration_ms = report.duration_ms,
            "import run complete"
        );
        Ok(report)
    }

    /// Progress bars fed from the telemetry channel; disabled in quiet mode.
    fn spawn_progress_tracking(
        &self,
        file_count: usize,
        estimated_rows: u64,
        mut telemetry_rx: mpsc::UnboundedReceiver<TelemetryEvent>,
    ) -> Option<tokio::task::JoinHandle<()>> {
        if self.config.quiet {
            return None;
        }

        let multi_progress = MultiProgress::new();

        let files_bar = multi_progress.add(ProgressBar::new(file_count as u64));
        files_bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] Files: [{bar:30.cyan/blue}] {pos}/{len}")
                .unwrap()
                .progress_chars("=>-"),
        );

        let rows_bar = if estimated_rows > 0 {
            let bar = multi_progress.add(ProgressBar::new(estimated_rows));
            bar.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "[{elapsed_precise}] Rows:  [{bar:30.green/blue}] {human_pos}/{human_len} | {per_sec}",
                    )
                    .unwrap()
                    .progress_chars("=>-"),
            );
            Some(bar)
        } else {
            None
        };

        let timing_bar = multi_progress.add(ProgressBar::new(0));
        timing_bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] Batch time: {msg}")
                .unwrap(),
        );

        Some(tokio::spawn(async move {
            let mut stats = ProgressStats::new();

            while let Some(event) = telemetry_rx.recv().await {
                stats.update(&event);

                files_bar.set_position(stats.files_finished as u64);
                if let Some(bar) = &rows_bar {
                    bar.set_position(stats.rows_written);
                }
                if let (Some(p50), Some(p90), Some(p99)) = stats.get_percentiles() {
                    timing_bar.set_message(format!("p50: {}ms, p90: {}ms, p99: {}ms", p50, p90, p99));
                }
            }

            files_bar.finish();
            if let Some(bar) = rows_bar {
                bar.finish();
            }
            timing_bar.finish();
        }))
    }
}

fn record_outcome(
    statuses: &mut [Option<FileStatus>],
    joined: Result<(usize, FileStatus), tokio::task::JoinError>,
) {
    match joined {
        Ok((idx, status)) => statuses[idx] = Some(status),
        Err(e) => warn!("file task panicked: {:#}", e),
    }
}

fn assemble(
    run_id: String,
    started_at: String,
    started: Instant,
    schema: ReconciledSchema,
    sources: &[ImportSource],
    statuses: Vec<Option<FileStatus>>,
) -> ImportReport {
    let files = sources
        .iter()
        .zip(statuses)
        .map(|(source, status)| FileReport {
            source: source.id.clone(),
            status: status.unwrap_or(FileStatus::Failed {
                error_kind: "internal".to_string(),
                message: "file task did not report an outcome".to_string(),
            }),
        })
        .collect();

    ImportReport::assemble(
        run_id,
        started_at,
        started.elapsed().as_millis() as u64,
        schema,
        files,
    )
}

/// Stream one file end to end: read batches, project each onto the
/// reconciled schema, and forward to the sink in read order. Closing the
/// handle commits the file.
#[allow(clippy::too_many_arguments)]
async fn stream_file(
    source_id: &str,
    reader: Arc<dyn BatchReader>,
    native: Schema,
    reconciled: &ReconciledSchema,
    sink: Arc<dyn SinkWriter>,
    batch_size: usize,
    cancel: CancellationToken,
    telemetry: &mpsc::UnboundedSender<TelemetryEvent>,
) -> Result<u64, FileError> {
    debug!(file = %source_id, "reading");
    let mut stream = reader.open_batches(batch_size).await?;
    let mut handle = sink.open(reconciled).await?;
    let mut rows_written = 0u64;

    loop {
        if cancel.is_cancelled() {
            return Err(FileError::Cancelled);
        }

        let Some(next) = stream.next_batch().await else {
            break;
        };
        let batch = next?;
        let batch_started = Instant::now();

        debug!(file = %source_id, rows = batch.num_rows(), "converting");
        let projected = project(batch, &native, reconciled)?;
        let rows = projected.num_rows() as u64;

        debug!(file = %source_id, rows, "writing");
        handle.write_batch(projected).await?;
        rows_written += rows;

        let _ = telemetry.send(TelemetryEvent::BatchWritten {
            rows,
            duration_ms: batch_started.elapsed().as_millis() as u64,
        });
    }

    handle.close().await?;
    Ok(rows_written)
}
