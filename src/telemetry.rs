/// Progress events sent from file tasks to the coordinator's tracker.
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// A file entered its data pass.
    FileStarted,
    /// One converted batch was handed to the sink.
    BatchWritten { rows: u64, duration_ms: u64 },
    /// A file finished its data pass.
    FileFinished { failed: bool },
}

/// Statistics aggregated from telemetry events.
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub files_started: usize,
    pub files_finished: usize,
    pub files_failed: usize,
    pub rows_written: u64,
    pub batch_durations_ms: Vec<u64>,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::FileStarted => {
                self.files_started += 1;
            }
            TelemetryEvent::BatchWritten { rows, duration_ms } => {
                self.rows_written += rows;
                self.batch_durations_ms.push(*duration_ms);
            }
            TelemetryEvent::FileFinished { failed } => {
                self.files_finished += 1;
                if *failed {
                    self.files_failed += 1;
                }
            }
        }
    }

    /// Batch-duration percentile, `None` until at least one batch landed.
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.batch_durations_ms.is_empty() {
            return None;
        }

        let mut sorted = self.batch_durations_ms.clone();
        sorted.sort_unstable();

        let index = ((p / 100.0) * sorted.len() as f64).ceil() as usize - 1;
        Some(sorted[index.min(sorted.len() - 1)])
    }

    pub fn get_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        (
            self.percentile(50.0),
            self.percentile(90.0),
            self.percentile(99.0),
        )
    }
}
