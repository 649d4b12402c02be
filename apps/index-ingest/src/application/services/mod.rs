//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `extraction`: Ordered selector strategies turning a page into records
//! - `backoff`: Retry and scheduler interval policies
//! - `session_controller`: One ingestion session with retries
//! - `scheduler`: Timer-driven session triggering

pub mod backoff;
pub mod extraction;
pub mod scheduler;
pub mod session_controller;

pub use backoff::{IntervalConfig, IntervalPolicy, RetryConfig, RetryPolicy};
pub use extraction::{
    ColumnLayout, DEFAULT_STRATEGIES, Extraction, ExtractionEngine, SelectorStrategy,
};
pub use scheduler::Scheduler;
pub use session_controller::{
    ControllerStats, SessionController, SessionControllerConfig, SessionOutcome, SessionSummary,
};
