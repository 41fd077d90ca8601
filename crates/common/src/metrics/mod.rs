//! Metrics and observability utilities
//!
//! Counters and histograms for archive export/import, named with a common
//! prefix. Recording is a no-op until the embedding application installs a
//! `metrics` recorder.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Polaris metrics
pub const METRICS_PREFIX: &str = "polaris";

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_archive_operations_total", METRICS_PREFIX),
        Unit::Count,
        "Archive exports and imports by outcome"
    );

    describe_histogram!(
        format!("{}_archive_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Archive export/import latency in seconds"
    );

    describe_counter!(
        format!("{}_archive_items_total", METRICS_PREFIX),
        Unit::Count,
        "Documents and instrument payloads transferred, by status"
    );

    tracing::info!("Metrics registered");
}

/// Times one export or import and records its outcome
pub struct OperationMetrics {
    start: Instant,
    operation: &'static str,
}

impl OperationMetrics {
    /// Start tracking an operation ("export", "import", "bundle")
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }

    /// Record completion; `outcome` is "complete", "partial" or "failed"
    pub fn finish(self, outcome: &'static str) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_archive_operations_total", METRICS_PREFIX),
            "operation" => self.operation,
            "outcome" => outcome
        )
        .increment(1);

        histogram!(
            format!("{}_archive_duration_seconds", METRICS_PREFIX),
            "operation" => self.operation
        )
        .record(duration);
    }
}

/// Helper to record transferred item counts
pub fn record_items(operation: &'static str, kind: &'static str, status: &'static str, count: usize) {
    if count == 0 {
        return;
    }
    counter!(
        format!("{}_archive_items_total", METRICS_PREFIX),
        "operation" => operation,
        "kind" => kind,
        "status" => status
    )
    .increment(count as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_without_recorder() {
        register_metrics();
        register_metrics();
    }

    #[test]
    fn test_operation_metrics_without_recorder() {
        let metrics = OperationMetrics::start("export");
        metrics.finish("complete");
        record_items("export", "document", "succeeded", 2);
        // Just verify it runs without panic
    }
}
