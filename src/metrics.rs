use metrics::{Counter, Histogram};
use std::time::Duration;

/// Capture-pipeline counters, wired to whatever recorder the embedding
/// process installs; noop otherwise.
pub struct Metrics {
    pub captures_completed: Counter,
    pub captures_failed: Counter,
    pub capture_duration: Histogram,
    pub images_stored: Counter,
    pub images_deduplicated: Counter,
    pub diffs_computed: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            captures_completed: Counter::noop(),
            captures_failed: Counter::noop(),
            capture_duration: Histogram::noop(),
            images_stored: Counter::noop(),
            images_deduplicated: Counter::noop(),
            diffs_computed: Counter::noop(),
        }
    }

    pub fn record_capture(&self, duration: Duration, success: bool) {
        if success {
            self.captures_completed.increment(1);
        } else {
            self.captures_failed.increment(1);
        }
        self.capture_duration.record(duration.as_secs_f64());
    }

    pub fn record_store(&self, uploaded: bool) {
        if uploaded {
            self.images_stored.increment(1);
        } else {
            self.images_deduplicated.increment(1);
        }
    }

    pub fn record_diff(&self) {
        self.diffs_computed.increment(1);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
