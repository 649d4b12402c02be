//! Domain Layer - Index records, snapshots and session state.
//!
//! This layer contains the core types of the ingestion pipeline with no
//! knowledge of browsers, schedulers or HTTP. Everything here is
//! synchronous and deterministic given an explicit clock value.

/// Market index records, the index catalogue and validation bounds.
pub mod index;

/// Snapshot store holding the latest validated record set.
pub mod snapshot;

/// Ingestion session state machine.
pub mod session;
