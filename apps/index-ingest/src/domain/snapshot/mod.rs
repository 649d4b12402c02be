//! Snapshot Store
//!
//! Holds the latest validated set of index records together with scrape
//! health counters. The store has a single writer (the session controller)
//! and any number of concurrent readers.
//!
//! Every write builds a complete [`Snapshot`] off to the side and installs it
//! with one pointer swap under a short write lock, so a reader either sees
//! the previous generation or the new one, never a mix of both.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::domain::index::IndexRecord;

/// A snapshot older than this (since the last success) is stale.
pub const STALE_AFTER_MS: i64 = 300_000;

/// Maximum number of search results.
pub const MAX_SEARCH_RESULTS: usize = 20;

/// Queries longer than this are treated as invalid and match nothing.
pub const MAX_QUERY_LEN: usize = 64;

// =============================================================================
// Snapshot Status
// =============================================================================

/// Store lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotStatus {
    /// No ingestion has completed yet.
    #[default]
    Initializing,
    /// The last ingestion committed a fresh record set.
    Success,
    /// The last ingestion failed but an earlier success is still served.
    Stale,
    /// Ingestion has failed and nothing was ever committed.
    Error,
}

impl SnapshotStatus {
    /// Status name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Success => "success",
            Self::Stale => "stale",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// One immutable generation of the store.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    records: Vec<IndexRecord>,
    by_symbol: HashMap<String, usize>,
    last_updated_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    status: SnapshotStatus,
    total_attempts: u64,
    failed_attempts: u64,
}

impl Snapshot {
    /// Records in page order.
    #[must_use]
    pub fn records(&self) -> &[IndexRecord] {
        &self.records
    }

    /// Look up a record by its symbol.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<&IndexRecord> {
        self.by_symbol.get(symbol).map(|&i| &self.records[i])
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the snapshot holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> SnapshotStatus {
        self.status
    }

    /// When the record set was last replaced.
    #[must_use]
    pub const fn last_updated_at(&self) -> Option<DateTime<Utc>> {
        self.last_updated_at
    }

    /// When the last successful ingestion committed.
    #[must_use]
    pub const fn last_success_at(&self) -> Option<DateTime<Utc>> {
        self.last_success_at
    }

    /// Total ingestion attempts reported to the store.
    #[must_use]
    pub const fn total_attempts(&self) -> u64 {
        self.total_attempts
    }

    /// Failed ingestion attempts reported to the store.
    #[must_use]
    pub const fn failed_attempts(&self) -> u64 {
        self.failed_attempts
    }

    /// Whether the data is stale at `now`.
    #[must_use]
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        self.last_success_at
            .is_none_or(|at| (now - at).num_milliseconds() > STALE_AFTER_MS)
    }

    /// Fraction of attempts that succeeded, `None` before the first attempt.
    #[must_use]
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_attempts == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = (self.total_attempts - self.failed_attempts) as f64 / self.total_attempts as f64;
        Some(rate)
    }

    /// Case-insensitive substring search over symbol, name and exchange.
    ///
    /// Blank or oversized queries yield no matches.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<IndexRecord> {
        let query = query.trim();
        if query.is_empty() || query.chars().count() > MAX_QUERY_LEN {
            return Vec::new();
        }

        let needle = query.to_lowercase();
        self.records
            .iter()
            .filter(|record| record.matches(&needle))
            .take(MAX_SEARCH_RESULTS)
            .cloned()
            .collect()
    }
}

// =============================================================================
// Read Views
// =============================================================================

/// Snapshot metadata handed to API consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    /// When the record set was last replaced.
    pub last_updated_at: Option<DateTime<Utc>>,
    /// When the last successful ingestion committed.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Store status.
    pub status: SnapshotStatus,
    /// Number of records.
    pub count: usize,
}

/// Full snapshot view: records plus metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotView {
    /// Records in page order.
    pub records: Vec<IndexRecord>,
    /// Snapshot metadata.
    pub metadata: SnapshotMetadata,
}

/// Health summary of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// Store status.
    pub status: SnapshotStatus,
    /// Number of records.
    pub count: usize,
    /// Total ingestion attempts.
    pub total_attempts: u64,
    /// Failed ingestion attempts.
    pub failed_attempts: u64,
    /// When the record set was last replaced.
    pub last_updated_at: Option<DateTime<Utc>>,
    /// When the last successful ingestion committed.
    pub last_success_at: Option<DateTime<Utc>>,
    /// `(total - failed) / total`, absent before the first attempt.
    pub success_rate: Option<f64>,
    /// Whether the data is stale at report time.
    pub stale: bool,
}

// =============================================================================
// Snapshot Store
// =============================================================================

/// Shared handle to the store.
pub type SharedSnapshotStore = Arc<SnapshotStore>;

/// Single-writer, multi-reader holder of the current [`Snapshot`].
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotStore {
    /// Create an empty store in `initializing` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current generation. Cheap: clones an `Arc`.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// Replace the whole record set and mark the store successful.
    pub fn replace(&self, records: Vec<IndexRecord>) {
        self.replace_at(records, Utc::now());
    }

    /// [`replace`](Self::replace) with an explicit clock value.
    ///
    /// Duplicate symbols keep their first occurrence. `now` is clamped so
    /// `last_updated_at` never moves backwards.
    pub fn replace_at(&self, records: Vec<IndexRecord>, now: DateTime<Utc>) {
        let mut deduped = Vec::with_capacity(records.len());
        let mut by_symbol = HashMap::with_capacity(records.len());
        for record in records {
            if by_symbol.contains_key(&record.symbol) {
                continue;
            }
            by_symbol.insert(record.symbol.clone(), deduped.len());
            deduped.push(record);
        }

        let mut current = self.current.write();
        let now = current.last_updated_at.map_or(now, |prev| prev.max(now));
        *current = Arc::new(Snapshot {
            records: deduped,
            by_symbol,
            last_updated_at: Some(now),
            last_success_at: Some(now),
            status: SnapshotStatus::Success,
            total_attempts: current.total_attempts + 1,
            failed_attempts: current.failed_attempts,
        });
    }

    /// Record a failed ingestion. Records are left untouched.
    pub fn mark_failed(&self) {
        let mut current = self.current.write();
        let status = if current.last_success_at.is_some() {
            SnapshotStatus::Stale
        } else {
            SnapshotStatus::Error
        };
        *current = Arc::new(Snapshot {
            status,
            total_attempts: current.total_attempts + 1,
            failed_attempts: current.failed_attempts + 1,
            ..Snapshot::clone(&current)
        });
    }

    /// Look up a record by symbol (trimmed, case-insensitive).
    #[must_use]
    pub fn lookup(&self, symbol: &str) -> Option<IndexRecord> {
        let symbol = symbol.trim().to_uppercase();
        self.snapshot().get(&symbol).cloned()
    }

    /// Search the current records, at most [`MAX_SEARCH_RESULTS`] matches.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<IndexRecord> {
        self.snapshot().search(query)
    }

    /// Whether the data is stale now.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Utc::now())
    }

    /// Whether the data is stale at `now`.
    #[must_use]
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        self.snapshot().is_stale_at(now)
    }

    /// Health summary.
    #[must_use]
    pub fn status(&self) -> StatusReport {
        self.status_at(Utc::now())
    }

    /// Health summary evaluated at `now`.
    #[must_use]
    pub fn status_at(&self, now: DateTime<Utc>) -> StatusReport {
        let snapshot = self.snapshot();
        StatusReport {
            status: snapshot.status,
            count: snapshot.len(),
            total_attempts: snapshot.total_attempts,
            failed_attempts: snapshot.failed_attempts,
            last_updated_at: snapshot.last_updated_at,
            last_success_at: snapshot.last_success_at,
            success_rate: snapshot.success_rate(),
            stale: snapshot.is_stale_at(now),
        }
    }

    /// Records and metadata as one consistent view.
    #[must_use]
    pub fn view(&self) -> SnapshotView {
        let snapshot = self.snapshot();
        SnapshotView {
            records: snapshot.records.clone(),
            metadata: SnapshotMetadata {
                last_updated_at: snapshot.last_updated_at,
                last_success_at: snapshot.last_success_at,
                status: snapshot.status,
                count: snapshot.len(),
            },
        }
    }

    /// Clear records and timestamps and return to `initializing`.
    ///
    /// Attempt counters are kept.
    pub fn reset(&self) {
        let mut current = self.current.write();
        *current = Arc::new(Snapshot {
            total_attempts: current.total_attempts,
            failed_attempts: current.failed_attempts,
            ..Snapshot::default()
        });
    }
}

// =============================================================================
// Tests
// =============================================================================
