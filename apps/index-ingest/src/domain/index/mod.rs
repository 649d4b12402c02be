//! Market Index Records
//!
//! Canonical representation of one quoted market index, the static catalogue
//! of indices the upstream page is known to list, name/symbol normalization,
//! and the sanity bounds a record must satisfy before it may enter a snapshot.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Validation Bounds
// =============================================================================

/// Exclusive upper bound for an index level.
pub const MAX_PRICE: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Absolute change must stay below this fraction of the price.
pub const MAX_CHANGE_RATIO: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Exclusive upper bound for the absolute percent change.
pub const MAX_PERCENT_CHANGE: Decimal = Decimal::from_parts(50, 0, 0, false, 0);

/// Separator used when collapsing non-alphanumeric runs in a symbol.
pub const SYMBOL_SEPARATOR: char = '-';

/// Suffixes stripped from display names (matched case-insensitively, repeatedly).
const NAME_SUFFIX_NOISE: &[&str] = &["(CFD)", "Futures", "Future", "Index"];

// =============================================================================
// Index Record
// =============================================================================

/// Auxiliary quote details that do not take part in validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auxiliary {
    /// Exchange or region label.
    pub exchange: Option<String>,
    /// Session high, when the page lists one.
    pub high: Option<Decimal>,
    /// Session low, when the page lists one.
    pub low: Option<Decimal>,
    /// When this quote was read from the page.
    pub quoted_at: DateTime<Utc>,
}

/// One quoted market index at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexRecord {
    /// Normalized unique identifier (e.g. `SPX`, `NIFTY`).
    pub symbol: String,
    /// Human-readable name with suffix noise removed.
    pub display_name: String,
    /// Last traded level.
    pub price: Decimal,
    /// Absolute change since previous close.
    pub change: Decimal,
    /// Percent change since previous close.
    pub percent_change: Decimal,
    /// Exchange, session range and timestamp.
    pub auxiliary: Auxiliary,
}

impl IndexRecord {
    /// Check the record against the sanity bounds.
    ///
    /// # Errors
    ///
    /// Returns the first bound the record violates.
    pub fn validate(&self) -> Result<(), RowRejection> {
        if self.symbol.is_empty() {
            return Err(RowRejection::EmptyName);
        }
        if self.price <= Decimal::ZERO || self.price >= MAX_PRICE {
            return Err(RowRejection::PriceOutOfRange { price: self.price });
        }
        if self.change.abs() >= self.price * MAX_CHANGE_RATIO {
            return Err(RowRejection::ChangeTooLarge {
                change: self.change,
                price: self.price,
            });
        }
        if self.percent_change.abs() >= MAX_PERCENT_CHANGE {
            return Err(RowRejection::PercentChangeTooLarge {
                percent_change: self.percent_change,
            });
        }
        Ok(())
    }

    /// Whether the index is flat or up on the session.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.change >= Decimal::ZERO
    }

    /// Case-insensitive match of an already lowercased needle against
    /// symbol, display name and exchange.
    #[must_use]
    pub fn matches(&self, needle_lowercase: &str) -> bool {
        self.symbol.to_lowercase().contains(needle_lowercase)
            || self.display_name.to_lowercase().contains(needle_lowercase)
            || self
                .auxiliary
                .exchange
                .as_ref()
                .is_some_and(|e| e.to_lowercase().contains(needle_lowercase))
    }
}

/// Why a single scraped row was refused.
///
/// Rejections are per-row: they are logged and counted, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowRejection {
    /// The name cell was empty after cleaning.
    #[error("row has no usable name")]
    EmptyName,
    /// A numeric cell could not be parsed.
    #[error("unparsable {field}: {raw:?}")]
    Unparsable {
        /// Column the value came from.
        field: &'static str,
        /// Raw cell text.
        raw: String,
    },
    /// Price is not in `(0, 1_000_000)`.
    #[error("price {price} out of range")]
    PriceOutOfRange {
        /// Offending price.
        price: Decimal,
    },
    /// `|change| >= 0.5 * price`.
    #[error("change {change} too large for price {price}")]
    ChangeTooLarge {
        /// Offending change.
        change: Decimal,
        /// Price it was compared against.
        price: Decimal,
    },
    /// `|percentChange| >= 50`.
    #[error("percent change {percent_change} out of range")]
    PercentChangeTooLarge {
        /// Offending percent change.
        percent_change: Decimal,
    },
}

impl RowRejection {
    /// Short label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::EmptyName => "empty_name",
            Self::Unparsable { .. } => "unparsable",
            Self::PriceOutOfRange { .. } => "price_out_of_range",
            Self::ChangeTooLarge { .. } => "change_too_large",
            Self::PercentChangeTooLarge { .. } => "percent_change_out_of_range",
        }
    }
}

// =============================================================================
// Index Catalogue
// =============================================================================

/// A market index the upstream page is known to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownIndex {
    /// Canonical symbol.
    pub symbol: &'static str,
    /// Canonical display name.
    pub name: &'static str,
    /// Exchange or region label.
    pub exchange: &'static str,
    /// Other names the page uses for this index.
    pub aliases: &'static [&'static str],
}

/// Static name → symbol table.
pub const KNOWN_INDICES: &[KnownIndex] = &[
    KnownIndex {
        symbol: "SPX",
        name: "S&P 500",
        exchange: "US",
        aliases: &["US 500", "S&P 500 Composite", "SP500"],
    },
    KnownIndex {
        symbol: "DJI",
        name: "Dow Jones",
        exchange: "US",
        aliases: &["Dow Jones Industrial Average", "Dow 30", "US 30", "DJIA"],
    },
    KnownIndex {
        symbol: "IXIC",
        name: "Nasdaq Composite",
        exchange: "US",
        aliases: &["Nasdaq"],
    },
    KnownIndex {
        symbol: "NDX",
        name: "Nasdaq 100",
        exchange: "US",
        aliases: &["US Tech 100", "Nasdaq-100"],
    },
    KnownIndex {
        symbol: "RUT",
        name: "Russell 2000",
        exchange: "US",
        aliases: &["US Small Cap 2000", "Small Cap 2000"],
    },
    KnownIndex {
        symbol: "VIX",
        name: "CBOE Volatility Index",
        exchange: "US",
        aliases: &["CBOE Volatility", "S&P 500 VIX", "Volatility S&P 500"],
    },
    KnownIndex {
        symbol: "FTSE",
        name: "FTSE 100",
        exchange: "UK",
        aliases: &["UK 100"],
    },
    KnownIndex {
        symbol: "DAX",
        name: "DAX",
        exchange: "DE",
        aliases: &["Germany 40", "DAX 40"],
    },
    KnownIndex {
        symbol: "CAC",
        name: "CAC 40",
        exchange: "FR",
        aliases: &["France 40"],
    },
    KnownIndex {
        symbol: "STOXX50E",
        name: "Euro Stoxx 50",
        exchange: "EU",
        aliases: &["Euro Stoxx 50 Price EUR", "Europe 50"],
    },
    KnownIndex {
        symbol: "N225",
        name: "Nikkei 225",
        exchange: "JP",
        aliases: &["Japan 225", "Nikkei"],
    },
    KnownIndex {
        symbol: "HSI",
        name: "Hang Seng",
        exchange: "HK",
        aliases: &["Hong Kong 50"],
    },
    KnownIndex {
        symbol: "SSEC",
        name: "Shanghai Composite",
        exchange: "CN",
        aliases: &["China A50", "SSE Composite"],
    },
    KnownIndex {
        symbol: "SENSEX",
        name: "BSE Sensex",
        exchange: "IN",
        aliases: &["S&P BSE Sensex", "BSE Sensex 30", "Sensex"],
    },
    KnownIndex {
        symbol: "NIFTY",
        name: "Nifty 50",
        exchange: "IN",
        aliases: &["NIFTY 50", "Nifty"],
    },
    KnownIndex {
        symbol: "BANKNIFTY",
        name: "Nifty Bank",
        exchange: "IN",
        aliases: &["Bank Nifty", "NIFTY Bank"],
    },
    KnownIndex {
        symbol: "GSPTSE",
        name: "S&P/TSX Composite",
        exchange: "CA",
        aliases: &["S&P/TSX"],
    },
    KnownIndex {
        symbol: "AXJO",
        name: "S&P/ASX 200",
        exchange: "AU",
        aliases: &["Australia 200"],
    },
    KnownIndex {
        symbol: "KS11",
        name: "KOSPI",
        exchange: "KR",
        aliases: &["KOSPI Composite"],
    },
    KnownIndex {
        symbol: "BVSP",
        name: "Bovespa",
        exchange: "BR",
        aliases: &["Brazil 60"],
    },
];

/// Find a catalogue entry by display name, alias or symbol (case-insensitive).
#[must_use]
pub fn lookup_known(name: &str) -> Option<&'static KnownIndex> {
    let name = name.trim();
    KNOWN_INDICES.iter().find(|known| {
        known.name.eq_ignore_ascii_case(name)
            || known.symbol.eq_ignore_ascii_case(name)
            || known.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    })
}

// =============================================================================
// Normalization
// =============================================================================

/// A page name resolved to its canonical identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedName {
    /// Canonical symbol.
    pub symbol: String,
    /// Cleaned display name.
    pub display_name: String,
    /// Exchange label from the catalogue, if the index is known.
    pub exchange: Option<&'static str>,
}

/// Strip suffix noise ("Futures", "Index", "(CFD)") and collapse whitespace.
#[must_use]
pub fn clean_display_name(raw: &str) -> String {
    let mut name = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    loop {
        let lower = name.to_ascii_lowercase();
        let stripped = NAME_SUFFIX_NOISE.iter().find_map(|suffix| {
            lower
                .strip_suffix(&suffix.to_ascii_lowercase())
                .filter(|rest| suffix.starts_with('(') || rest.ends_with(char::is_whitespace))
                .map(|rest| name[..rest.len()].trim_end().to_string())
        });
        match stripped {
            Some(shorter) if shorter != name && !shorter.is_empty() => name = shorter,
            _ => break,
        }
    }

    name
}

/// Fallback symbol rule: uppercase, keep `&`, collapse every other
/// non-alphanumeric run into a single dash, trim dashes at the ends.
#[must_use]
pub fn normalize_symbol(name: &str) -> String {
    let mut symbol = String::with_capacity(name.len());
    let mut pending_separator = false;

    for c in name.chars() {
        if c.is_alphanumeric() || c == '&' {
            if pending_separator && !symbol.is_empty() {
                symbol.push(SYMBOL_SEPARATOR);
            }
            pending_separator = false;
            symbol.extend(c.to_uppercase());
        } else {
            pending_separator = true;
        }
    }

    symbol
}

/// Resolve a raw page name to symbol, display name and exchange.
///
/// Returns `None` when nothing usable remains after cleaning.
#[must_use]
pub fn resolve_name(raw: &str) -> Option<ResolvedName> {
    let cleaned = clean_display_name(raw);
    if cleaned.is_empty() {
        return None;
    }

    if let Some(known) = lookup_known(&cleaned) {
        return Some(ResolvedName {
            symbol: known.symbol.to_string(),
            display_name: cleaned,
            exchange: Some(known.exchange),
        });
    }

    let symbol = normalize_symbol(&cleaned);
    if symbol.is_empty() {
        return None;
    }

    Some(ResolvedName {
        symbol,
        display_name: cleaned,
        exchange: None,
    })
}

/// Parse a numeric cell: strips thousands separators, `%`, `+` and
/// whitespace, and maps the Unicode minus sign to `-`.
#[must_use]
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .chars()
        .filter_map(|c| match c {
            ',' | '%' | '+' => None,
            '\u{2212}' | '\u{2013}' => Some('-'),
            c if c.is_whitespace() => None,
            c => Some(c),
        })
        .collect();

    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }

    Decimal::from_str(&cleaned).ok()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn record(price: i64, change: i64, percent_change: i64) -> IndexRecord {
        IndexRecord {
            symbol: "DJI".to_string(),
            display_name: "Dow Jones".to_string(),
            price: Decimal::from(price),
            change: Decimal::from(change),
            percent_change: Decimal::from(percent_change),
            auxiliary: Auxiliary {
                exchange: Some("US".to_string()),
                high: None,
                low: None,
                quoted_at: Utc::now(),
            },
        }
    }

    #[test]
    fn valid_record_passes() {
        assert!(record(42_000, 50, 0).validate().is_ok());
    }

    #[test_case(0 ; "zero price")]
    #[test_case(-5 ; "negative price")]
    #[test_case(1_000_000 ; "price at upper bound")]
    #[test_case(2_500_000 ; "price above upper bound")]
    fn price_out_of_range_rejected(price: i64) {
        assert!(matches!(
            record(price, 0, 0).validate(),
            Err(RowRejection::PriceOutOfRange { .. })
        ));
    }

    #[test_case(100, 50 ; "change equal to half price")]
    #[test_case(100, -60 ; "negative change above half price")]
    fn large_change_rejected(price: i64, change: i64) {
        assert!(matches!(
            record(price, change, 1).validate(),
            Err(RowRejection::ChangeTooLarge { .. })
        ));
    }

    #[test]
    fn change_just_below_half_price_accepted() {
        assert!(record(100, 49, 1).validate().is_ok());
    }

    #[test_case(50 ; "at bound")]
    #[test_case(-75 ; "negative beyond bound")]
    fn percent_change_out_of_range_rejected(pct: i64) {
        assert!(matches!(
            record(1_000, 1, pct).validate(),
            Err(RowRejection::PercentChangeTooLarge { .. })
        ));
    }

    #[test]
    fn is_positive_on_flat_or_up() {
        assert!(record(100, 0, 0).is_positive());
        assert!(record(100, 3, 3).is_positive());
        assert!(!record(100, -3, -3).is_positive());
    }

    #[test_case("Nifty 50 Futures", "Nifty 50" ; "futures suffix")]
    #[test_case("S&P 500 Index (CFD)", "S&P 500" ; "stacked suffixes")]
    #[test_case("  Dow   Jones  ", "Dow Jones" ; "whitespace collapsed")]
    #[test_case("DAX Index", "DAX" ; "index suffix")]
    #[test_case("Reindex", "Reindex" ; "suffix inside a word is kept")]
    #[test_case("Index", "Index" ; "lone suffix is kept")]
    fn display_name_cleaning(raw: &str, expected: &str) {
        assert_eq!(clean_display_name(raw), expected);
    }

    #[test_case("Bovespa Brazil", "BOVESPA-BRAZIL" ; "space separator")]
    #[test_case("S&P/ASX  All Ords", "S&P-ASX-ALL-ORDS" ; "ampersand kept and runs collapsed")]
    #[test_case("--MSCI World--", "MSCI-WORLD" ; "edge separators trimmed")]
    #[test_case("Taiwan Weighted", "TAIWAN-WEIGHTED" ; "uppercased")]
    #[test_case("Índice Bovespa", "ÍNDICE-BOVESPA" ; "accented letters kept")]
    #[test_case("上证指数", "上证指数" ; "cjk name kept")]
    fn fallback_symbol_normalization(name: &str, expected: &str) {
        assert_eq!(normalize_symbol(name), expected);
    }

    #[test]
    fn known_aliases_resolve_to_canonical_symbol() {
        let resolved = resolve_name("Dow Jones Industrial Average").unwrap();
        assert_eq!(resolved.symbol, "DJI");
        assert_eq!(resolved.exchange, Some("US"));

        let resolved = resolve_name("Nifty 50 Futures").unwrap();
        assert_eq!(resolved.symbol, "NIFTY");
        assert_eq!(resolved.display_name, "Nifty 50");
    }

    #[test]
    fn unknown_name_falls_back_to_normalized_symbol() {
        let resolved = resolve_name("Taiwan Weighted Index").unwrap();
        assert_eq!(resolved.symbol, "TAIWAN-WEIGHTED");
        assert_eq!(resolved.display_name, "Taiwan Weighted");
        assert_eq!(resolved.exchange, None);
    }

    #[test]
    fn non_latin_name_resolves() {
        let resolved = resolve_name("上证指数").unwrap();
        assert_eq!(resolved.symbol, "上证指数");
        assert_eq!(resolved.display_name, "上证指数");
    }

    #[test]
    fn blank_name_does_not_resolve() {
        assert!(resolve_name("   ").is_none());
        assert!(resolve_name("---").is_none());
    }

    #[test_case("42,123.45", Some(Decimal::new(4_212_345, 2)) ; "thousands separator")]
    #[test_case("+1.25%", Some(Decimal::new(125, 2)) ; "signed percent")]
    #[test_case("\u{2212}37.10", Some(Decimal::new(-3710, 2)) ; "unicode minus")]
    #[test_case("-", None ; "lone dash")]
    #[test_case("", None ; "empty cell")]
    #[test_case("n/a", None ; "not a number")]
    fn decimal_parsing(raw: &str, expected: Option<Decimal>) {
        assert_eq!(parse_decimal(raw), expected);
    }

    #[test]
    fn rejection_reasons_are_distinct() {
        let reasons = [
            RowRejection::EmptyName.reason(),
            RowRejection::Unparsable {
                field: "price",
                raw: String::new(),
            }
            .reason(),
            RowRejection::PriceOutOfRange {
                price: Decimal::ZERO,
            }
            .reason(),
            RowRejection::ChangeTooLarge {
                change: Decimal::ZERO,
                price: Decimal::ZERO,
            }
            .reason(),
            RowRejection::PercentChangeTooLarge {
                percent_change: Decimal::ZERO,
            }
            .reason(),
        ];
        let unique: std::collections::HashSet<_> = reasons.iter().collect();
        assert_eq!(unique.len(), reasons.len());
    }
}
