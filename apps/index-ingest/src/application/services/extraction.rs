//! Extraction Engine
//!
//! Turns a loaded page into validated index records by trying an ordered
//! list of selector strategies and stopping at the first that yields any.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::application::error::IngestError;
use crate::application::ports::{BrowserHandle, RawRow};
use crate::domain::index::{Auxiliary, IndexRecord, RowRejection, parse_decimal, resolve_name};
use crate::infrastructure::metrics;

/// Default per-strategy wait for rows to appear.
pub const DEFAULT_SELECTOR_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Strategy Descriptors
// =============================================================================

/// Fixed column positions of one table layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    /// Index name column.
    pub name: usize,
    /// Last price column.
    pub price: usize,
    /// Absolute change column.
    pub change: usize,
    /// Percent change column.
    pub percent_change: usize,
    /// Session high column.
    pub high: Option<usize>,
    /// Session low column.
    pub low: Option<usize>,
    /// Exchange or country column.
    pub exchange: Option<usize>,
    /// Rows with fewer cells are malformed and skipped.
    pub min_columns: usize,
}

/// One selector-based extraction approach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectorStrategy {
    /// Name used in logs.
    pub name: &'static str,
    /// CSS selector matching the data rows.
    pub row_selector: &'static str,
    /// Where each field lives in a row.
    pub layout: ColumnLayout,
}

const SIMPLE_LAYOUT: ColumnLayout = ColumnLayout {
    name: 0,
    price: 1,
    change: 2,
    percent_change: 3,
    high: None,
    low: None,
    exchange: None,
    min_columns: 4,
};

/// Strategies from most to least specific.
pub const DEFAULT_STRATEGIES: &[SelectorStrategy] = &[
    SelectorStrategy {
        name: "dynamic-table",
        row_selector: r#"table[data-test="dynamic-table"] tbody tr"#,
        layout: ColumnLayout {
            name: 1,
            price: 2,
            high: Some(3),
            low: Some(4),
            change: 5,
            percent_change: 6,
            exchange: None,
            min_columns: 7,
        },
    },
    SelectorStrategy {
        name: "quotes-table",
        row_selector: "table.quotes-table tbody tr",
        layout: SIMPLE_LAYOUT,
    },
    SelectorStrategy {
        name: "any-table",
        row_selector: "table tbody tr",
        layout: SIMPLE_LAYOUT,
    },
];

// =============================================================================
// Row Parsing
// =============================================================================

fn required_decimal(row: &RawRow, index: usize, field: &'static str) -> Result<Decimal, RowRejection> {
    let raw = row.cell(index).unwrap_or_default();
    parse_decimal(raw).ok_or_else(|| RowRejection::Unparsable {
        field,
        raw: raw.to_string(),
    })
}

/// Parse one row with `layout`.
///
/// Returns `Ok(None)` for rows with too few cells; those are malformed
/// rather than bad data.
///
/// # Errors
///
/// Returns the reason the row was refused.
pub fn parse_row(
    row: &RawRow,
    layout: &ColumnLayout,
    quoted_at: DateTime<Utc>,
) -> Result<Option<IndexRecord>, RowRejection> {
    if row.cells.len() < layout.min_columns {
        return Ok(None);
    }

    let resolved = resolve_name(row.cell(layout.name).unwrap_or_default())
        .ok_or(RowRejection::EmptyName)?;

    let price = required_decimal(row, layout.price, "price")?;
    let change = required_decimal(row, layout.change, "change")?;
    let percent_change = required_decimal(row, layout.percent_change, "percent_change")?;

    let optional = |index: Option<usize>| index.and_then(|i| row.cell(i)).and_then(parse_decimal);

    let exchange = layout
        .exchange
        .and_then(|i| row.cell(i))
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(ToString::to_string)
        .or_else(|| resolved.exchange.map(ToString::to_string));

    let record = IndexRecord {
        symbol: resolved.symbol,
        display_name: resolved.display_name,
        price,
        change,
        percent_change,
        auxiliary: Auxiliary {
            exchange,
            high: optional(layout.high),
            low: optional(layout.low),
            quoted_at,
        },
    };

    record.validate()?;
    Ok(Some(record))
}

/// Tally of one strategy pass over a set of rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBatch {
    /// Valid, deduplicated records in page order.
    pub records: Vec<IndexRecord>,
    /// Rows refused by validation.
    pub rejected: usize,
    /// Rows with too few cells.
    pub malformed: usize,
    /// Valid rows dropped as later duplicates.
    pub duplicates: usize,
}

/// Parse, validate and deduplicate `rows`, first occurrence winning.
#[must_use]
pub fn parse_rows(
    rows: &[RawRow],
    layout: &ColumnLayout,
    quoted_at: DateTime<Utc>,
) -> ParsedBatch {
    let mut batch = ParsedBatch::default();
    let mut seen = HashSet::new();

    for (position, row) in rows.iter().enumerate() {
        match parse_row(row, layout, quoted_at) {
            Ok(Some(record)) => {
                if seen.insert(record.symbol.clone()) {
                    batch.records.push(record);
                } else {
                    tracing::debug!(position, symbol = %record.symbol, "Dropping duplicate row");
                    batch.duplicates += 1;
                }
            }
            Ok(None) => batch.malformed += 1,
            Err(rejection) => {
                tracing::debug!(position, reason = rejection.reason(), error = %rejection, "Row rejected");
                metrics::record_row_rejected(rejection.reason());
                batch.rejected += 1;
            }
        }
    }

    batch
}

// =============================================================================
// Extraction Engine
// =============================================================================

/// Records produced by a successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Validated records in page order.
    pub records: Vec<IndexRecord>,
    /// Position of the strategy that produced them.
    pub strategy_index: usize,
    /// Rows refused by validation under that strategy.
    pub rejected: usize,
}

/// Runs the ordered strategy list against a page.
#[derive(Debug, Clone)]
pub struct ExtractionEngine {
    strategies: Vec<SelectorStrategy>,
    selector_timeout: Duration,
}

impl Default for ExtractionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_STRATEGIES.to_vec(), DEFAULT_SELECTOR_TIMEOUT)
    }
}

impl ExtractionEngine {
    /// Create an engine with explicit strategies.
    #[must_use]
    pub const fn new(strategies: Vec<SelectorStrategy>, selector_timeout: Duration) -> Self {
        Self {
            strategies,
            selector_timeout,
        }
    }

    /// Default strategies with a custom selector wait.
    #[must_use]
    pub fn with_selector_timeout(selector_timeout: Duration) -> Self {
        Self::new(DEFAULT_STRATEGIES.to_vec(), selector_timeout)
    }

    /// Configured strategies in priority order.
    #[must_use]
    pub fn strategies(&self) -> &[SelectorStrategy] {
        &self.strategies
    }

    /// Extract records from the page loaded in `browser`.
    ///
    /// A strategy whose rows never appear, whose evaluation fails, or whose
    /// rows all fail validation yields nothing and the next one is tried.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::NoDataExtracted`] when every strategy yields
    /// zero records, or a session-fatal error from the browser as soon as it
    /// occurs.
    pub async fn extract(&self, browser: &dyn BrowserHandle) -> Result<Extraction, IngestError> {
        for (index, strategy) in self.strategies.iter().enumerate() {
            let rows = match self.collect_rows(browser, strategy).await {
                Ok(rows) => rows,
                Err(e) if e.is_session_fatal() => return Err(e),
                Err(e) => {
                    tracing::debug!(strategy = strategy.name, error = %e, "Strategy yielded no rows");
                    continue;
                }
            };

            let batch = parse_rows(&rows, &strategy.layout, Utc::now());
            tracing::debug!(
                strategy = strategy.name,
                rows = rows.len(),
                records = batch.records.len(),
                rejected = batch.rejected,
                malformed = batch.malformed,
                duplicates = batch.duplicates,
                "Strategy evaluated"
            );

            if !batch.records.is_empty() {
                return Ok(Extraction {
                    records: batch.records,
                    strategy_index: index,
                    rejected: batch.rejected,
                });
            }
        }

        Err(IngestError::NoDataExtracted {
            strategies_tried: self.strategies.len(),
        })
    }

    async fn collect_rows(
        &self,
        browser: &dyn BrowserHandle,
        strategy: &SelectorStrategy,
    ) -> Result<Vec<RawRow>, IngestError> {
        browser
            .wait_for_selector(strategy.row_selector, self.selector_timeout)
            .await?;
        browser.evaluate_extraction(strategy.row_selector).await
    }
}
