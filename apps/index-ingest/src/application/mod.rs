//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the ingestion services and the port interfaces
//! that define how they reach the browser.

/// Ingestion error taxonomy.
pub mod error;

/// Port interfaces for external systems (browser automation).
pub mod ports;

/// Extraction, session control and scheduling.
pub mod services;
