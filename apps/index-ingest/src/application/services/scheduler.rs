//! Scheduler
//!
//! Triggers the session controller on a timer. The interval resets to its
//! base after a success and widens once consecutive failures pass the
//! threshold. Session errors are absorbed here; they only shape timing.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::application::error::SessionError;
use crate::application::services::backoff::{IntervalConfig, IntervalPolicy};
use crate::application::services::session_controller::{SessionController, SessionOutcome};
use crate::infrastructure::metrics;

/// Periodic driver of [`SessionController`].
#[derive(Debug)]
pub struct Scheduler {
    controller: Arc<SessionController>,
    policy: IntervalPolicy,
    shutdown: CancellationToken,
}

impl Scheduler {
    /// Create a scheduler at its base interval.
    #[must_use]
    pub const fn new(
        controller: Arc<SessionController>,
        config: IntervalConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            controller,
            policy: IntervalPolicy::new(config),
            shutdown,
        }
    }

    /// Interval before the next trigger.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.policy.current()
    }

    /// Failures since the last success.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.policy.consecutive_failures()
    }

    /// Run sessions until shutdown. The first session starts immediately.
    pub async fn run(&mut self) {
        tracing::info!(
            interval_secs = self.policy.current().as_secs(),
            "Scheduler started"
        );
        metrics::set_scheduler_interval(self.policy.current());

        loop {
            let result = self.controller.run_session().await;
            if matches!(result, Err(SessionError::Cancelled)) {
                break;
            }

            let interval = self.on_outcome(&result);
            metrics::set_scheduler_interval(interval);

            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }

        tracing::info!("Scheduler stopped");
    }

    /// Fold a session result into the interval policy.
    pub fn on_outcome(&mut self, result: &Result<SessionOutcome, SessionError>) -> Duration {
        match result {
            Ok(SessionOutcome::Committed(_)) => {
                if self.policy.is_widened() {
                    tracing::info!(
                        interval_secs = self.policy.current().as_secs(),
                        "Ingestion recovered, restoring base interval"
                    );
                }
                self.policy.on_success()
            }
            Ok(SessionOutcome::Skipped) | Err(SessionError::Cancelled) => self.policy.current(),
            Err(error) => {
                let before = self.policy.current();
                let after = self.policy.on_failure();
                if after > before {
                    tracing::warn!(
                        consecutive_failures = self.policy.consecutive_failures(),
                        interval_secs = after.as_secs(),
                        error = %error,
                        "Widening scheduler interval"
                    );
                } else {
                    tracing::debug!(
                        consecutive_failures = self.policy.consecutive_failures(),
                        "Session failed"
                    );
                }
                after
            }
        }
    }
}
