//! Index Ingest Binary
//!
//! Starts the scheduled index ingestion loop and its health endpoint.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin index-ingest
//! ```
//!
//! # Environment Variables
//!
//! ## Optional
//! - `INGEST_TARGET_URL`: Page listing the major indices
//! - `INGEST_BROWSER`: chromium | mock (default: chromium)
//! - `CHROME_PATH`: Chromium executable (default: looked up on `PATH`)
//! - `INGEST_NAVIGATION_TIMEOUT_MS`: Page load timeout (default: 30000)
//! - `INGEST_SELECTOR_TIMEOUT_MS`: Table wait per strategy (default: 10000)
//! - `INGEST_MIN_SESSION_INTERVAL_MS`: Gap between sessions (default: 2000)
//! - `INGEST_MAX_RETRIES`: Attempts per session (default: 3)
//! - `INGEST_RETRY_BASE_DELAY_MS`: Linear retry step (default: 5000)
//! - `INGEST_FORCED_RESTART_SESSIONS`: Recycle the browser every N sessions (default: 50)
//! - `INGEST_SCREENSHOT_DIR`: Save a screenshot on each failed attempt
//! - `INGEST_BASE_INTERVAL_SECS`: Scheduler interval (default: 60)
//! - `INGEST_MAX_INTERVAL_SECS`: Widened interval cap (default: 900)
//! - `INGEST_MAX_CONSECUTIVE_FAILURES`: Failures before widening (default: 3)
//! - `INGEST_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: index-ingest)
//! - `RUST_LOG`: Log filter (default: `index_ingest=info`)

use std::sync::Arc;
use std::time::Duration;

use index_ingest::infrastructure::health::{HealthServer, HealthServerState};
use index_ingest::infrastructure::telemetry;
use index_ingest::{
    BrowserKind, BrowserLauncher, ChromiumLauncher, IngestConfig, MockBrowser, MockPage,
    Scheduler, SessionController, SnapshotStore, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (tracing + optional OTLP export)
    let telemetry_guard = telemetry::init();

    tracing::info!(
        span_export = telemetry_guard.is_exporting(),
        "Starting Index Ingest"
    );

    // Initialize Prometheus metrics
    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder unavailable, metrics disabled");
    }

    let config = IngestConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let launcher: Arc<dyn BrowserLauncher> = match config.browser.kind {
        BrowserKind::Chromium => Arc::new(ChromiumLauncher::new(config.browser.chrome_path.clone())),
        BrowserKind::Mock => Arc::new(MockBrowser::with_page(MockPage::sample())),
    };

    let store = Arc::new(SnapshotStore::new());
    let controller = Arc::new(SessionController::new(
        config.session_controller_config(),
        launcher,
        config.extraction_engine(),
        Arc::clone(&store),
        shutdown_token.clone(),
    ));

    // Spawn health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&controller),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Spawn scheduler
    let mut scheduler = Scheduler::new(
        Arc::clone(&controller),
        config.interval_config(),
        shutdown_token.clone(),
    );
    let scheduler_task = tokio::spawn(async move {
        scheduler.run().await;
    });

    tracing::info!("Index ingest ready");

    await_shutdown(shutdown_token).await;

    match tokio::time::timeout(SHUTDOWN_TIMEOUT, scheduler_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Scheduler task failed"),
        Err(_) => tracing::warn!("Scheduler did not stop within the shutdown timeout"),
    }
    controller.shutdown().await;

    let report = store.status();
    tracing::info!(
        records = report.count,
        total_attempts = report.total_attempts,
        failed_attempts = report.failed_attempts,
        "Index ingest stopped"
    );
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &IngestConfig) {
    tracing::info!(
        browser = config.browser.kind.as_str(),
        target_url = %config.source.target_url,
        base_interval_secs = config.scheduler.base_interval.as_secs(),
        max_interval_secs = config.scheduler.max_interval.as_secs(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        max_retries = config.session.max_retries,
        retry_base_delay_ms = u64::try_from(config.session.retry_base_delay.as_millis()).unwrap_or(u64::MAX),
        forced_restart_sessions = config.session.forced_restart_sessions,
        screenshot_dir = ?config.session.screenshot_dir,
        "Session settings"
    );
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
