//! Export progress estimation.
//!
//! Engine-reported progress is advisory only. The ratio shown to the user is
//! wall-clock time since the job started divided by the host duration.

/// Lifecycle of an export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportState {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl ExportState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Snapshot published to observers of an export.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExportStatus {
    pub state: ExportState,

    /// Estimated completion in `[0.0, 1.0]`.
    pub progress_ratio: f64,

    /// Wall-clock seconds since the job started.
    pub elapsed_secs: f64,
}

/// Completion ratio for `elapsed_secs` of work against `host_duration_secs`.
///
/// Returns `None` when the host duration gives no usable denominator, in which
/// case the caller keeps its previous ratio.
pub fn estimate(elapsed_secs: f64, host_duration_secs: f64) -> Option<f64> {
    if host_duration_secs.is_nan() || host_duration_secs <= 0.0 || !elapsed_secs.is_finite() {
        return None;
    }
    Some((elapsed_secs / host_duration_secs).clamp(0.0, 1.0))
}

/// Keeps the reported ratio monotonic for the lifetime of one job.
#[derive(Debug, Clone, Copy)]
pub struct ProgressTracker {
    host_duration_secs: f64,
    ratio: f64,
    finished: bool,
}

impl ProgressTracker {
    pub fn new(host_duration_secs: f64) -> Self {
        Self {
            host_duration_secs,
            ratio: 0.0,
            finished: false,
        }
    }

    /// Fold in a new elapsed time and return the ratio to display.
    pub fn observe(&mut self, elapsed_secs: f64) -> f64 {
        if !self.finished {
            if let Some(ratio) = estimate(elapsed_secs, self.host_duration_secs) {
                self.ratio = self.ratio.max(ratio);
            }
        }
        self.ratio
    }

    /// Pin the ratio to 1. Later observations are ignored.
    pub fn finish(&mut self) -> f64 {
        self.finished = true;
        self.ratio = 1.0;
        self.ratio
    }
}
