//! Session Controller
//!
//! Runs one ingestion session end to end (throttle, acquire browser,
//! navigate, extract, commit) and owns the retry loop around it.
//!
//! # Guarantees
//!
//! - At most one session is in flight. A trigger arriving while one runs is
//!   dropped and reported as [`SessionOutcome::Skipped`].
//! - The browser is exclusively owned: any previous handle is closed before
//!   another is launched, and [`SessionController::shutdown`] closes it.
//! - The snapshot store is written only here, once per session: `replace`
//!   on commit or `mark_failed` after the last attempt.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::application::error::{IngestError, SessionError};
use crate::application::ports::{BrowserHandle, BrowserLauncher};
use crate::application::services::backoff::{RetryConfig, RetryPolicy};
use crate::application::services::extraction::{Extraction, ExtractionEngine};
use crate::domain::session::{Session, SessionPhase};
use crate::domain::snapshot::SharedSnapshotStore;
use crate::infrastructure::metrics::{self, RestartReason, SessionOutcomeLabel};

type BrowserSlot = Option<Box<dyn BrowserHandle>>;

// =============================================================================
// Configuration
// =============================================================================

/// Session controller settings.
#[derive(Debug, Clone)]
pub struct SessionControllerConfig {
    /// Page to scrape.
    pub target_url: String,
    /// Minimum gap between the end of one session and the start of the next.
    pub min_session_interval: Duration,
    /// Bound on page load.
    pub navigation_timeout: Duration,
    /// In-session retry settings.
    pub retry: RetryConfig,
    /// Successful sessions between forced browser restarts (0 = never).
    pub forced_restart_sessions: u64,
    /// Where failure screenshots go, if anywhere.
    pub screenshot_dir: Option<PathBuf>,
}

impl Default for SessionControllerConfig {
    fn default() -> Self {
        Self {
            target_url: "https://www.investing.com/indices/major-indices".to_string(),
            min_session_interval: Duration::from_secs(2),
            navigation_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
            forced_restart_sessions: 50,
            screenshot_dir: None,
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of a session that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// New records were committed.
    Committed(SessionSummary),
    /// Another session was already running.
    Skipped,
}

impl SessionOutcome {
    /// Whether records were committed.
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed(_))
    }
}

/// What a committed session did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Session identifier.
    pub session_id: Uuid,
    /// Attempts used, including the successful one.
    pub attempts: u32,
    /// Strategy that produced the records.
    pub strategy_index: usize,
    /// Records committed.
    pub records: usize,
    /// Phases visited.
    pub phases: Vec<SessionPhase>,
}

/// Controller state exposed to the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControllerStats {
    /// Phase of the in-flight session, `idle` if none.
    pub phase: SessionPhase,
    /// Whether a session is running.
    pub in_flight: bool,
    /// Sessions that committed records.
    pub successful_sessions: u64,
    /// Browser teardown-and-relaunch cycles.
    pub browser_restarts: u64,
}

// =============================================================================
// Controller
// =============================================================================

/// Clears the single-flight flag when a session ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives ingestion sessions against a browser and a snapshot store.
pub struct SessionController {
    config: SessionControllerConfig,
    launcher: Arc<dyn BrowserLauncher>,
    engine: ExtractionEngine,
    store: SharedSnapshotStore,
    retry: RetryPolicy,
    browser: tokio::sync::Mutex<BrowserSlot>,
    in_flight: AtomicBool,
    last_session_end: Mutex<Option<Instant>>,
    phase: RwLock<SessionPhase>,
    successful_sessions: AtomicU64,
    browser_restarts: AtomicU64,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for SessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl SessionController {
    /// Create a controller. No browser is launched until the first session.
    #[must_use]
    pub fn new(
        config: SessionControllerConfig,
        launcher: Arc<dyn BrowserLauncher>,
        engine: ExtractionEngine,
        store: SharedSnapshotStore,
        shutdown: CancellationToken,
    ) -> Self {
        let retry = RetryPolicy::new(config.retry.clone());
        Self {
            config,
            launcher,
            engine,
            store,
            retry,
            browser: tokio::sync::Mutex::new(None),
            in_flight: AtomicBool::new(false),
            last_session_end: Mutex::new(None),
            phase: RwLock::new(SessionPhase::Idle),
            successful_sessions: AtomicU64::new(0),
            browser_restarts: AtomicU64::new(0),
            shutdown,
        }
    }

    /// The store this controller writes to.
    #[must_use]
    pub fn store(&self) -> &SharedSnapshotStore {
        &self.store
    }

    /// Current phase and lifetime counters.
    #[must_use]
    pub fn stats(&self) -> ControllerStats {
        ControllerStats {
            phase: *self.phase.read(),
            in_flight: self.in_flight.load(Ordering::Acquire),
            successful_sessions: self.successful_sessions.load(Ordering::Relaxed),
            browser_restarts: self.browser_restarts.load(Ordering::Relaxed),
        }
    }

    /// Run one session.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::RetriesExhausted`] when every attempt failed
    /// (the store has been marked failed), or [`SessionError::Cancelled`]
    /// when shutdown interrupted a wait.
    pub async fn run_session(&self) -> Result<SessionOutcome, SessionError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Session already in flight, dropping trigger");
            metrics::record_session(SessionOutcomeLabel::Skipped);
            return Ok(SessionOutcome::Skipped);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let started = Instant::now();
        let mut session = Session::new();
        let span = tracing::info_span!("session", session_id = %session.id);
        let result = self.drive(&mut session).instrument(span).await;

        *self.last_session_end.lock() = Some(Instant::now());
        *self.phase.write() = SessionPhase::Idle;
        metrics::record_session_duration(started.elapsed());

        let label = match &result {
            Ok(_) => SessionOutcomeLabel::Committed,
            Err(SessionError::Cancelled) => SessionOutcomeLabel::Cancelled,
            Err(_) => SessionOutcomeLabel::Exhausted,
        };
        metrics::record_session(label);

        result
    }

    /// Close the browser. Waits for an in-flight session to release it.
    pub async fn shutdown(&self) {
        let mut slot = self.browser.lock().await;
        if Self::teardown(&mut slot).await {
            tracing::info!("Browser closed");
        }
    }

    fn advance(&self, session: &mut Session, to: SessionPhase) -> Result<(), SessionError> {
        session.advance(to)?;
        *self.phase.write() = to;
        Ok(())
    }

    async fn drive(&self, session: &mut Session) -> Result<SessionOutcome, SessionError> {
        self.advance(session, SessionPhase::Throttling)?;
        if !self.throttle().await {
            self.advance(session, SessionPhase::Idle)?;
            return Err(SessionError::Cancelled);
        }

        self.advance(session, SessionPhase::Initializing)?;
        let mut slot = self.browser.lock().await;
        let mut pending = self.ensure_browser(&mut slot).await.err();
        let mut restart_reason = RestartReason::Retry;

        loop {
            let result = match pending.take() {
                Some(error) => Err(error),
                None => self.attempt(session, &slot).await?,
            };

            let error = match result {
                Ok(extraction) => return self.commit(session, &mut slot, extraction).await,
                Err(error) => error,
            };

            self.advance(session, SessionPhase::Failed)?;
            let attempts = session.attempts();
            metrics::record_attempt(error.kind());
            tracing::warn!(
                attempt = attempts,
                max_retries = self.retry.max_retries(),
                kind = error.kind(),
                error = %error,
                "Ingestion attempt failed"
            );

            self.capture_failure(session, &slot).await;
            if error.is_session_fatal() && Self::teardown(&mut slot).await {
                tracing::warn!("Browser lost, torn down");
                restart_reason = RestartReason::Disconnected;
            }

            if !self.retry.should_retry(attempts) {
                self.advance(session, SessionPhase::Reporting)?;
                self.store.mark_failed();
                tracing::error!(attempts, error = %error, "Ingestion session exhausted retries");
                self.advance(session, SessionPhase::Idle)?;
                return Err(SessionError::RetriesExhausted {
                    attempts,
                    last: error,
                });
            }

            self.advance(session, SessionPhase::BackoffWait)?;
            let delay = self.retry.delay_for(attempts);
            tracing::info!(attempt = attempts, delay_ms = delay.as_millis(), "Backing off");
            if !self.sleep_or_cancel(delay).await {
                self.advance(session, SessionPhase::Idle)?;
                return Err(SessionError::Cancelled);
            }

            self.advance(session, SessionPhase::Restarting)?;
            session.attempt_number += 1;
            pending = self.restart(&mut slot, restart_reason).await.err();
            restart_reason = RestartReason::Retry;
        }
    }

    /// Navigate and extract. The outer error is a controller bug, the inner
    /// one an attempt failure.
    async fn attempt(
        &self,
        session: &mut Session,
        slot: &BrowserSlot,
    ) -> Result<Result<Extraction, IngestError>, SessionError> {
        self.advance(session, SessionPhase::Navigating)?;
        let Some(browser) = slot.as_deref() else {
            return Ok(Err(IngestError::BrowserDisconnected {
                message: "no browser acquired".to_string(),
            }));
        };

        if let Err(error) = browser
            .navigate(&self.config.target_url, self.config.navigation_timeout)
            .await
        {
            return Ok(Err(error));
        }

        self.advance(session, SessionPhase::Extracting)?;
        Ok(self.engine.extract(browser).await)
    }

    async fn commit(
        &self,
        session: &mut Session,
        slot: &mut BrowserSlot,
        extraction: Extraction,
    ) -> Result<SessionOutcome, SessionError> {
        session.strategy_index = Some(extraction.strategy_index);
        self.advance(session, SessionPhase::Committing)?;
        metrics::record_attempt("success");

        let records = extraction.records.len();
        self.store.replace(extraction.records);
        metrics::set_snapshot_records(self.store.snapshot().len());

        let successes = self.successful_sessions.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            attempts = session.attempts(),
            strategy = extraction.strategy_index,
            records,
            rejected = extraction.rejected,
            "Snapshot committed"
        );

        let every = self.config.forced_restart_sessions;
        if every > 0 && successes % every == 0 {
            self.advance(session, SessionPhase::Restarting)?;
            tracing::info!(successes, "Forced browser restart");
            if let Err(error) = self.restart(slot, RestartReason::Forced).await {
                tracing::warn!(error = %error, "Forced restart could not relaunch browser");
            }
        }

        self.advance(session, SessionPhase::Idle)?;
        Ok(SessionOutcome::Committed(SessionSummary {
            session_id: session.id,
            attempts: session.attempts(),
            strategy_index: extraction.strategy_index,
            records,
            phases: session.history().to_vec(),
        }))
    }

    /// Sleep out the rest of the minimum inter-session interval.
    /// Returns `false` if shutdown was requested.
    async fn throttle(&self) -> bool {
        let last_end = *self.last_session_end.lock();
        if let Some(end) = last_end {
            let ready_at = end + self.config.min_session_interval;
            let now = Instant::now();
            if ready_at > now {
                let wait = ready_at - now;
                tracing::debug!(wait_ms = wait.as_millis(), "Throttling session");
                return self.sleep_or_cancel(wait).await;
            }
        }
        !self.shutdown.is_cancelled()
    }

    async fn sleep_or_cancel(&self, duration: Duration) -> bool {
        tokio::select! {
            () = self.shutdown.cancelled() => false,
            () = tokio::time::sleep(duration) => true,
        }
    }

    async fn ensure_browser(&self, slot: &mut BrowserSlot) -> Result<(), IngestError> {
        if slot.is_some() {
            return Ok(());
        }
        let browser = self.launcher.launch().await?;
        tracing::debug!("Browser launched");
        *slot = Some(browser);
        Ok(())
    }

    /// Close the current browser and launch another. Only a cycle that
    /// actually replaced a browser is counted; a disconnected browser was
    /// already closed when the loss was seen.
    async fn restart(
        &self,
        slot: &mut BrowserSlot,
        reason: RestartReason,
    ) -> Result<(), IngestError> {
        let closed = Self::teardown(slot).await;
        if closed || reason == RestartReason::Disconnected {
            self.browser_restarts.fetch_add(1, Ordering::Relaxed);
            metrics::record_browser_restart(reason);
            tracing::debug!(reason = reason.as_str(), "Restarting browser");
        }
        self.ensure_browser(slot).await
    }

    /// Returns whether a browser was closed.
    async fn teardown(slot: &mut BrowserSlot) -> bool {
        let Some(mut browser) = slot.take() else {
            return false;
        };
        if let Err(error) = browser.close().await {
            tracing::debug!(error = %error, "Browser close failed");
        }
        true
    }

    async fn capture_failure(&self, session: &Session, slot: &BrowserSlot) {
        let (Some(dir), Some(browser)) = (&self.config.screenshot_dir, slot.as_deref()) else {
            return;
        };
        let path = dir.join(format!(
            "ingest-failure-{}-{}.png",
            session.id,
            session.attempts()
        ));
        match browser.screenshot(&path).await {
            Ok(()) => tracing::info!(path = %path.display(), "Failure screenshot saved"),
            Err(error) => tracing::debug!(error = %error, "Failure screenshot skipped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use metrics_exporter_prometheus::PrometheusBuilder;

    use super::*;
    use crate::application::ports::RawRow;
    use crate::application::services::extraction::DEFAULT_STRATEGIES;
    use crate::domain::snapshot::{SnapshotStatus, SnapshotStore};
    use crate::infrastructure::browser::mock::{MockBrowser, MockPage, NavigationStep};

    fn good_page() -> MockPage {
        MockPage::new().with_rows(
            DEFAULT_STRATEGIES[1].row_selector,
            vec![
                RawRow::new(["Dow Jones", "42,000", "50", "0.12"]),
                RawRow::new(["Nifty 50", "24,000", "-10", "-0.04"]),
            ],
        )
    }

    fn config(max_retries: u32) -> SessionControllerConfig {
        SessionControllerConfig {
            target_url: "https://example.test/indices".to_string(),
            min_session_interval: Duration::from_secs(2),
            navigation_timeout: Duration::from_secs(30),
            retry: RetryConfig {
                max_retries,
                base_delay: Duration::from_secs(5),
                jitter_factor: 0.0,
            },
            forced_restart_sessions: 0,
            screenshot_dir: None,
        }
    }

    fn controller(config: SessionControllerConfig, browser: &MockBrowser) -> SessionController {
        SessionController::new(
            config,
            Arc::new(browser.clone()),
            ExtractionEngine::with_selector_timeout(Duration::from_secs(1)),
            Arc::new(SnapshotStore::new()),
            CancellationToken::new(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn commits_on_first_attempt() {
        let browser = MockBrowser::with_page(good_page());
        let controller = controller(config(3), &browser);

        let outcome = controller.run_session().await.unwrap();
        let SessionOutcome::Committed(summary) = outcome else {
            panic!("expected commit");
        };
        assert_eq!(summary.attempts, 1);
        assert_eq!(summary.strategy_index, 1);
        assert_eq!(summary.records, 2);
        assert_eq!(
            summary.phases,
            vec![
                SessionPhase::Idle,
                SessionPhase::Throttling,
                SessionPhase::Initializing,
                SessionPhase::Navigating,
                SessionPhase::Extracting,
                SessionPhase::Committing,
                SessionPhase::Idle,
            ]
        );

        let status = controller.store().status();
        assert_eq!(status.status, SnapshotStatus::Success);
        assert_eq!(status.count, 2);
        assert_eq!(controller.stats().successful_sessions, 1);
        assert_eq!(controller.stats().phase, SessionPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn browser_is_reused_across_sessions() {
        let browser = MockBrowser::with_page(good_page());
        let controller = controller(config(3), &browser);

        controller.run_session().await.unwrap();
        controller.run_session().await.unwrap();
        assert_eq!(browser.launches(), 1);
        assert_eq!(browser.closes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_restart_the_browser() {
        let browser = MockBrowser::with_page(good_page());
        browser.script_navigation([NavigationStep::Fail("reset".to_string())]);
        let controller = controller(config(3), &browser);

        let started = Instant::now();
        let outcome = controller.run_session().await.unwrap();
        let SessionOutcome::Committed(summary) = outcome else {
            panic!("expected commit");
        };

        assert_eq!(summary.attempts, 2);
        assert!(summary.phases.contains(&SessionPhase::BackoffWait));
        assert!(summary.phases.contains(&SessionPhase::Restarting));
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert_eq!(browser.launches(), 2);
        assert_eq!(browser.closes(), 1);
        assert_eq!(browser.max_open_handles(), 1);
        assert_eq!(controller.stats().browser_restarts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_session_keeps_previous_records() {
        let browser = MockBrowser::with_page(good_page());
        let controller = controller(config(3), &browser);
        controller.run_session().await.unwrap();
        let before = controller.store().snapshot();

        browser.set_page(MockPage::new());
        let err = controller.run_session().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::RetriesExhausted {
                attempts: 3,
                last: IngestError::NoDataExtracted { .. }
            }
        ));

        let after = controller.store().snapshot();
        assert_eq!(before.records(), after.records());
        assert_eq!(after.failed_attempts(), before.failed_attempts() + 1);
        assert_eq!(after.status(), SnapshotStatus::Stale);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_scales_with_attempt() {
        let browser = MockBrowser::new();
        browser.script_navigation([
            NavigationStep::Fail("a".to_string()),
            NavigationStep::Fail("b".to_string()),
            NavigationStep::Fail("c".to_string()),
        ]);
        let controller = controller(config(3), &browser);

        let started = Instant::now();
        controller.run_session().await.unwrap_err();
        // 1 * 5s + 2 * 5s
        assert!(started.elapsed() >= Duration::from_secs(15));
        assert!(started.elapsed() < Duration::from_secs(16));
        assert_eq!(browser.navigations(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_tears_down_even_when_exhausted() {
        let browser = MockBrowser::new();
        browser.script_navigation([NavigationStep::Disconnect]);
        let controller = controller(config(1), &browser);

        let err = controller.run_session().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::RetriesExhausted {
                last: IngestError::BrowserDisconnected { .. },
                ..
            }
        ));
        assert_eq!(browser.open_handles(), 0);
        assert_eq!(browser.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn launch_failure_is_retried() {
        let browser = MockBrowser::with_page(good_page());
        browser.fail_launches(1);
        let controller = controller(config(3), &browser);

        let outcome = controller.run_session().await.unwrap();
        let SessionOutcome::Committed(summary) = outcome else {
            panic!("expected commit");
        };
        assert_eq!(summary.attempts, 2);
        assert_eq!(summary.phases[3], SessionPhase::Failed);
        assert_eq!(browser.launches(), 1);
        assert_eq!(controller.stats().browser_restarts, 0);
    }

    /// Run `session` on a paused current-thread runtime with a local
    /// Prometheus recorder and return the rendered exposition.
    fn rendered_metrics(session: impl std::future::Future<Output = ()>) -> String {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        ::metrics::with_local_recorder(&recorder, || {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .start_paused(true)
                .build()
                .unwrap()
                .block_on(session);
        });
        handle.render()
    }

    #[test]
    fn disconnect_relaunch_is_labelled_disconnected() {
        let browser = MockBrowser::with_page(good_page());
        browser.script_navigation([NavigationStep::Disconnect]);
        let controller = controller(config(3), &browser);

        let rendered = rendered_metrics(async {
            assert!(controller.run_session().await.unwrap().is_committed());
        });

        assert!(
            rendered.contains(r#"index_ingest_browser_restarts_total{reason="disconnected"} 1"#),
            "{rendered}"
        );
        assert!(!rendered.contains(r#"reason="retry""#), "{rendered}");
        assert_eq!(controller.stats().browser_restarts, 1);
        assert_eq!(browser.launches(), 2);
    }

    #[test]
    fn ordinary_retry_is_labelled_retry() {
        let browser = MockBrowser::with_page(good_page());
        browser.script_navigation([NavigationStep::Fail("reset".to_string())]);
        let controller = controller(config(3), &browser);

        let rendered = rendered_metrics(async {
            assert!(controller.run_session().await.unwrap().is_committed());
        });

        assert!(
            rendered.contains(r#"index_ingest_browser_restarts_total{reason="retry"} 1"#),
            "{rendered}"
        );
        assert!(!rendered.contains(r#"reason="disconnected""#), "{rendered}");
    }

    #[test]
    fn relaunch_after_failed_launch_is_not_a_restart() {
        let browser = MockBrowser::with_page(good_page());
        browser.fail_launches(1);
        let controller = controller(config(3), &browser);

        let rendered = rendered_metrics(async {
            assert!(controller.run_session().await.unwrap().is_committed());
        });

        assert!(!rendered.contains("index_ingest_browser_restarts_total"), "{rendered}");
        assert_eq!(controller.stats().browser_restarts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_trigger_is_skipped() {
        let browser = MockBrowser::with_page(good_page());
        browser.script_navigation([NavigationStep::Timeout]);
        let controller = controller(config(3), &browser);

        let (first, second) = tokio::join!(controller.run_session(), controller.run_session());
        assert!(first.unwrap().is_committed());
        assert_eq!(second.unwrap(), SessionOutcome::Skipped);
        assert_eq!(browser.max_open_handles(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_are_throttled() {
        let browser = MockBrowser::with_page(good_page());
        let controller = controller(config(3), &browser);

        controller.run_session().await.unwrap();
        let started = Instant::now();
        let outcome = controller.run_session().await.unwrap();
        assert!(outcome.is_committed());
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn forced_restart_after_successful_sessions() {
        let browser = MockBrowser::with_page(good_page());
        let mut config = config(3);
        config.forced_restart_sessions = 2;
        let controller = controller(config, &browser);

        for _ in 0..4 {
            controller.run_session().await.unwrap();
        }
        assert_eq!(browser.launches(), 3);
        assert_eq!(browser.closes(), 2);
        assert_eq!(controller.stats().browser_restarts, 2);
        assert_eq!(browser.max_open_handles(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_screenshots_are_captured() {
        let dir = tempfile::tempdir().unwrap();
        let browser = MockBrowser::new();
        let mut config = config(2);
        config.screenshot_dir = Some(dir.path().to_path_buf());
        let controller = controller(config, &browser);

        controller.run_session().await.unwrap_err();
        let shots = browser.screenshots();
        assert_eq!(shots.len(), 2);
        assert!(shots.iter().all(|p| p.starts_with(dir.path())));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_abandons_backoff_and_closes_browser() {
        let browser = MockBrowser::new();
        browser.script_navigation([NavigationStep::Fail("down".to_string())]);
        let token = CancellationToken::new();
        let controller = Arc::new(SessionController::new(
            SessionControllerConfig {
                retry: RetryConfig {
                    max_retries: 3,
                    base_delay: Duration::from_secs(60),
                    jitter_factor: 0.0,
                },
                ..config(3)
            },
            Arc::new(browser.clone()),
            ExtractionEngine::default(),
            Arc::new(SnapshotStore::new()),
            token.clone(),
        ));

        let task = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.run_session().await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(controller.stats().phase, SessionPhase::BackoffWait);

        token.cancel();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(SessionError::Cancelled)));
        assert_eq!(controller.store().status().total_attempts, 0);

        controller.shutdown().await;
        assert_eq!(browser.open_handles(), 0);
    }
}
