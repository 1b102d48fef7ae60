//! Diagnostic sink for failure reports.
//!
//! Every failing operation reports its root cause here before returning the
//! error, so tooling sees the cause even if the caller only checks status.

use std::sync::Mutex;

/// Receiver of failure reports.
///
/// Implementations must not panic and must not block for long.
pub trait DiagnosticSink: Send + Sync {
    /// Record a failure raised by `context`.
    fn report(&self, context: &str, message: &str);
}

/// Forwards reports to `tracing` at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, context: &str, message: &str) {
        tracing::error!(context = %context, "{}", message);
    }
}

/// A single recorded report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Operation that failed.
    pub context: String,
    /// Failure description.
    pub message: String,
}

/// Keeps reports in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<Report>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all reports so far.
    pub fn reports(&self) -> Vec<Report> {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of reports so far.
    pub fn len(&self) -> usize {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Whether nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, context: &str, message: &str) {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Report {
                context: context.to_string(),
                message: message.to_string(),
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());

        sink.report("attach", "no free hardware context");
        sink.report("detach", "frame 0x1000 not found");

        let reports = sink.reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].context, "attach");
        assert_eq!(reports[1].message, "frame 0x1000 not found");
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        TracingSink.report("teardown", "session closed");
    }
}
