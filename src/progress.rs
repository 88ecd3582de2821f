//! Build progress reporting.
//!
//! Large traces take a while to parse; the tracker reports how far through
//! the trace the builder is at fixed fractions of the total byte count,
//! through the `tracing` subscriber the host application installed.

use tracing::info;

/// Reports parse progress in byte-offset epochs.
#[derive(Debug)]
pub struct ProgressTracker {
    total_bytes: u64,
    epoch_bytes: u64,
    next_report: u64,
}

/// Traces beyond this size get a finer progress report.
const FINE_GRAIN_THRESHOLD: u64 = 500_000_000;

impl ProgressTracker {
    /// Create a tracker for a trace of `total_bytes`. A zero total disables
    /// reporting (the trace size is unknown).
    pub fn new(total_bytes: u64) -> Self {
        let fraction = if total_bytes > FINE_GRAIN_THRESHOLD {
            0.01
        } else {
            0.05
        };
        let epoch_bytes = ((total_bytes as f64 * fraction) as u64).max(1);
        Self {
            total_bytes,
            epoch_bytes,
            next_report: epoch_bytes,
        }
    }

    /// Report progress if the offset crossed an epoch boundary.
    pub fn update(&mut self, offset: u64, nodes: u64) {
        if self.total_bytes == 0 || offset < self.next_report {
            return;
        }
        let percent = offset as f64 / self.total_bytes as f64 * 100.0;
        info!(
            bytes = offset,
            total = self.total_bytes,
            nodes,
            "DDDG parse progress: {percent:.0}%"
        );
        while self.next_report <= offset {
            self.next_report += self.epoch_bytes;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_sizing() {
        let coarse = ProgressTracker::new(1_000);
        assert_eq!(coarse.epoch_bytes, 50);

        let fine = ProgressTracker::new(1_000_000_000);
        assert_eq!(fine.epoch_bytes, 10_000_000);

        // Unknown size never divides by zero.
        let unknown = ProgressTracker::new(0);
        assert_eq!(unknown.epoch_bytes, 1);
    }

    #[test]
    fn test_update_advances_past_offset() {
        let mut tracker = ProgressTracker::new(100);
        tracker.update(12, 3);
        assert!(tracker.next_report > 12);
        tracker.update(99, 10);
        assert!(tracker.next_report > 99);
    }
}
