#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Index Ingest - Market Index Snapshot Service
//!
//! Drives a headless browser against a public quotes page on a schedule,
//! extracts major market-index rows, validates them, and keeps the latest
//! good snapshot in memory for readers.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `index`: Index records, row validation, name normalization
//!   - `snapshot`: Copy-on-write snapshot store and status reporting
//!   - `session`: Session phases and their legal transitions
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Browser launcher and page handle interfaces
//!   - `services`: Extraction strategies, session control, retry and
//!     interval backoff, scheduling
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `browser`: Chromium (DevTools protocol) and scripted mock browsers
//!   - `config`: Environment configuration
//!   - `health`: Health, readiness and metrics HTTP endpoint
//!   - `metrics`: Prometheus instrumentation
//!   - `telemetry`: Logging and OpenTelemetry tracing
//!
//! # Data Flow
//!
//! ```text
//! ┌───────────┐   ┌───────────────────┐   ┌────────────┐   ┌──────────────┐
//! │ Scheduler │──►│ SessionController │──►│ Extraction │──►│ SnapshotStore│──► readers
//! └───────────┘   └───────────────────┘   └────────────┘   └──────────────┘
//!       ▲                   │                    │
//!       │ outcome           ▼                    ▼
//!       └──────────── BrowserLauncher ──► BrowserHandle (Chromium / Mock)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Index records, snapshots and session phases.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::index::{Auxiliary, IndexRecord, RowRejection};
pub use domain::session::{SessionPhase, SessionPhaseMachine};
pub use domain::snapshot::{
    SharedSnapshotStore, Snapshot, SnapshotMetadata, SnapshotStatus, SnapshotStore, SnapshotView,
    StatusReport,
};

// Application
pub use application::error::{IngestError, SessionError};
pub use application::ports::{BrowserHandle, BrowserLauncher, RawRow};
pub use application::services::{
    ExtractionEngine, IntervalConfig, RetryConfig, Scheduler, SessionController,
    SessionControllerConfig, SessionOutcome, SessionSummary,
};

// Browser adapters
pub use infrastructure::browser::{ChromiumLauncher, MockBrowser, MockPage, NavigationStep};

// Infrastructure config
pub use infrastructure::config::{BrowserKind, ConfigError, IngestConfig};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
