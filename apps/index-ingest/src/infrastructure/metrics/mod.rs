//! Prometheus Metrics Module
//!
//! Exposes ingestion metrics in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Sessions**: Session outcomes and durations
//! - **Attempts**: Individual navigate/extract attempts by result
//! - **Data quality**: Rows rejected by validation, by reason
//! - **Browser**: Browser restarts by reason
//! - **Snapshot**: Record count and scheduler interval
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port. Recording
//! functions are no-ops until [`init_metrics`] installs the recorder.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "index_ingest_sessions_total",
        "Ingestion sessions by outcome"
    );
    describe_counter!(
        "index_ingest_attempts_total",
        "Ingestion attempts by result"
    );
    describe_counter!(
        "index_ingest_rows_rejected_total",
        "Rows dropped by validation, by reason"
    );
    describe_counter!(
        "index_ingest_browser_restarts_total",
        "Browser teardowns followed by reacquisition, by reason"
    );

    describe_gauge!(
        "index_ingest_snapshot_records",
        "Records in the current snapshot"
    );
    describe_gauge!(
        "index_ingest_scheduler_interval_seconds",
        "Current scheduler trigger interval"
    );

    describe_histogram!(
        "index_ingest_session_duration_seconds",
        "Wall time of a session from trigger to outcome"
    );
}

// =============================================================================
// Metric Labels
// =============================================================================

/// Session outcome label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcomeLabel {
    /// Records committed.
    Committed,
    /// Retries exhausted.
    Exhausted,
    /// Dropped because another session was in flight.
    Skipped,
    /// Abandoned on shutdown.
    Cancelled,
}

impl SessionOutcomeLabel {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::Exhausted => "exhausted",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Browser restart reason label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// Before a retry.
    Retry,
    /// Periodic recycle after N successful sessions.
    Forced,
    /// The browser process went away.
    Disconnected,
}

impl RestartReason {
    /// Label value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::Forced => "forced",
            Self::Disconnected => "disconnected",
        }
    }
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record the outcome of a session.
pub fn record_session(outcome: SessionOutcomeLabel) {
    counter!(
        "index_ingest_sessions_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a single attempt, `result` being `success` or an error kind.
pub fn record_attempt(result: &'static str) {
    counter!(
        "index_ingest_attempts_total",
        "result" => result
    )
    .increment(1);
}

/// Record a row rejected by validation.
pub fn record_row_rejected(reason: &'static str) {
    counter!(
        "index_ingest_rows_rejected_total",
        "reason" => reason
    )
    .increment(1);
}

/// Record a browser restart.
pub fn record_browser_restart(reason: RestartReason) {
    counter!(
        "index_ingest_browser_restarts_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Update the snapshot record count.
#[allow(clippy::cast_precision_loss)]
pub fn set_snapshot_records(count: usize) {
    gauge!("index_ingest_snapshot_records").set(count as f64);
}

/// Update the scheduler interval.
pub fn set_scheduler_interval(interval: Duration) {
    gauge!("index_ingest_scheduler_interval_seconds").set(interval.as_secs_f64());
}

/// Record session duration.
pub fn record_session_duration(duration: Duration) {
    histogram!("index_ingest_session_duration_seconds").record(duration.as_secs_f64());
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_labels() {
        assert_eq!(SessionOutcomeLabel::Committed.as_str(), "committed");
        assert_eq!(SessionOutcomeLabel::Exhausted.as_str(), "exhausted");
        assert_eq!(SessionOutcomeLabel::Skipped.as_str(), "skipped");
        assert_eq!(SessionOutcomeLabel::Cancelled.as_str(), "cancelled");
    }

    #[test]
    fn restart_labels() {
        assert_eq!(RestartReason::Retry.as_str(), "retry");
        assert_eq!(RestartReason::Forced.as_str(), "forced");
        assert_eq!(RestartReason::Disconnected.as_str(), "disconnected");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_session(SessionOutcomeLabel::Committed);
        record_attempt("success");
        record_row_rejected("price_out_of_range");
        set_snapshot_records(3);
        record_session_duration(Duration::from_millis(10));
    }
}
