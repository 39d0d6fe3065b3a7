//! Wall-clock timing for export jobs.
//!
//! Engine-native progress units are not trusted, so the time elapsed since
//! a job started is what drives the displayed progress.

use std::time::Instant;

/// A clock anchored to the moment an export job started.
#[derive(Debug, Clone)]
pub struct JobClock {
    /// The instant the job started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,
}

impl JobClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Create a clock from a known epoch.
    pub fn from_epoch(epoch: Instant, wall: String) -> Self {
        Self {
            epoch,
            epoch_wall: wall,
        }
    }

    /// Seconds elapsed since the job started.
    pub fn elapsed_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    /// Milliseconds elapsed since the job started.
    pub fn elapsed_ms(&self) -> u128 {
        self.epoch.elapsed().as_millis()
    }

    /// Wall-clock time at job start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }
}
