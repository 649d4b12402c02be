//! Configuration Module
//!
//! Configuration loading for the ingestion service.

mod settings;

pub use settings::{
    BrowserKind, BrowserSettings, ConfigError, DEFAULT_TARGET_URL, IngestConfig,
    SchedulerSettings, ServerSettings, SessionSettings, SourceSettings,
};
