/// Progress events emitted by the loader as it walks sources
#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    /// A regular file was picked up for processing
    FileStarted,
    /// A file was passed over because of its extension
    FileSkipped,
    /// One document was written
    DocumentWritten { duration_ms: u64 },
}

/// Statistics aggregated from telemetry events
#[derive(Debug, Default, Clone)]
pub struct ProgressStats {
    pub files_started: usize,
    pub files_skipped: usize,
    pub documents_written: u64,
    pub write_durations_ms: Vec<u64>,
}

impl ProgressStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a telemetry event
    pub fn update(&mut self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::FileStarted => {
                self.files_started += 1;
            }
            TelemetryEvent::FileSkipped => {
                // Skipped files were already counted as started
                self.files_skipped += 1;
            }
            TelemetryEvent::DocumentWritten { duration_ms } => {
                self.documents_written += 1;
                self.write_durations_ms.push(*duration_ms);
            }
        }
    }

    /// Calculate percentile from write durations
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.write_durations_ms.is_empty() {
            return None;
        }

        let mut sorted = self.write_durations_ms.clone();
        sorted.sort_unstable();

        let index = (((p / 100.0) * sorted.len() as f64).ceil() as usize).saturating_sub(1);
        let index = index.min(sorted.len() - 1);

        Some(sorted[index])
    }

    /// Get p50, p90, p99 percentiles
    pub fn get_percentiles(&self) -> (Option<u64>, Option<u64>, Option<u64>) {
        (
            self.percentile(50.0),
            self.percentile(90.0),
            self.percentile(99.0),
        )
    }
}
