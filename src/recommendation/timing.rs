//! Operation timing
//!
//! Drop-based timer used around refreshes and scoring passes. Durations are logged
//! at debug level and recorded in the `vidrec_operation_duration_ms` histogram.

use std::time::Instant;

/// Performance timer for tracking operation duration
pub struct PerformanceTimer {
    start: Instant,
    label: &'static str,
}

impl PerformanceTimer {
    pub fn new(label: &'static str) -> Self {
        Self {
            start: Instant::now(),
            label,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn log_if_slow(&self, threshold_ms: u64) {
        let elapsed = self.elapsed_ms();
        if elapsed > threshold_ms {
            tracing::warn!(
                "⚠️ Slow operation: {} took {}ms (threshold: {}ms)",
                self.label,
                elapsed,
                threshold_ms
            );
        }
    }
}

impl Drop for PerformanceTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        metrics::histogram!("vidrec_operation_duration_ms", "op" => self.label)
            .record(elapsed.as_secs_f64() * 1000.0);
        tracing::debug!("⏱️ {} completed in {}ms", self.label, elapsed.as_millis());
    }
}
