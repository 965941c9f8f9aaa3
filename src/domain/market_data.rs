//! OHLCV candles keyed by symbol, as sent to the engine.
//!
//! Symbol lists are comma separated and uppercased, and loading records
//! every symbol it had to skip instead of failing the whole request.

use crate::domain::error::StratflowError;
use crate::ports::candle_port::CandlePort;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Kept exactly as read so the engine sees the source's own format.
    pub timestamp: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Accepted timestamp forms: `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`,
/// `YYYY-MM-DDTHH:MM:SS`, RFC 3339, or unix epoch seconds.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    if !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()) {
        let secs = text.parse::<i64>().ok()?;
        return DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc());
    }
    None
}

/// Inclusive date filter; an open end accepts everything on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SymbolListError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),
}

/// Comma-separated symbols, trimmed and uppercased. Order is preserved.
pub fn parse_symbols(input: &str) -> Result<Vec<String>, SymbolListError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(SymbolListError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(SymbolListError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

/// What to do with a series whose symbol is already loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicatePolicy {
    /// Fail with `DuplicateSymbol`.
    #[default]
    Reject,
    /// Overwrite the loaded series.
    Replace,
    /// Keep both, storing the new one as `SYMBOL_N`.
    Rename,
}

/// Candle series per symbol. Serializes as the request's `data` object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketData {
    series: BTreeMap<String, Vec<Candle>>,
}

impl MarketData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a series; a symbol that is already present is a conflict the
    /// caller must resolve with [`MarketData::replace`] or
    /// [`MarketData::insert_as`].
    pub fn try_insert(&mut self, symbol: &str, candles: Vec<Candle>) -> Result<(), StratflowError> {
        if self.series.contains_key(symbol) {
            return Err(StratflowError::DuplicateSymbol {
                symbol: symbol.to_string(),
            });
        }
        self.series.insert(symbol.to_string(), candles);
        Ok(())
    }

    /// Overwrites any existing series, returning it.
    pub fn replace(&mut self, symbol: &str, candles: Vec<Candle>) -> Option<Vec<Candle>> {
        self.series.insert(symbol.to_string(), candles)
    }

    /// Stores under `symbol`, or under the first free `symbol_N` (N >= 2) if
    /// taken. Returns the name used.
    pub fn insert_as(&mut self, symbol: &str, candles: Vec<Candle>) -> String {
        let mut name = symbol.to_string();
        let mut n = 1;
        while self.series.contains_key(&name) {
            n += 1;
            name = format!("{}_{}", symbol, n);
        }
        self.series.insert(name.clone(), candles);
        name
    }

    /// Adds a series, resolving a conflict by `policy`. Returns the name the
    /// series was stored under.
    pub fn insert_with(
        &mut self,
        symbol: &str,
        candles: Vec<Candle>,
        policy: DuplicatePolicy,
    ) -> Result<String, StratflowError> {
        match policy {
            DuplicatePolicy::Reject => {
                self.try_insert(symbol, candles)?;
                Ok(symbol.to_string())
            }
            DuplicatePolicy::Replace => {
                if self.replace(symbol, candles).is_some() {
                    info!(%symbol, "replaced loaded series");
                }
                Ok(symbol.to_string())
            }
            DuplicatePolicy::Rename => {
                let name = self.insert_as(symbol, candles);
                if name != symbol {
                    info!(%symbol, stored_as = %name, "symbol already loaded, renamed");
                }
                Ok(name)
            }
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&[Candle]> {
        self.series.get(symbol).map(Vec::as_slice)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn total_candles(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct LoadedMarketData {
    pub data: MarketData,
    pub skipped: Vec<SkippedSymbol>,
}

/// Fetches each symbol through the port. Symbols that fail or return no
/// candles are skipped; an empty result overall is `NoData`.
pub fn load_market_data(
    port: &dyn CandlePort,
    symbols: &[String],
    range: &DateRange,
) -> Result<LoadedMarketData, StratflowError> {
    let mut data = MarketData::new();
    let mut skipped = Vec::new();

    for symbol in symbols {
        let candles = match port.fetch_candles(symbol, range) {
            Ok(candles) => candles,
            Err(e) => {
                warn!(%symbol, error = %e, "skipping symbol");
                skipped.push(SkippedSymbol {
                    symbol: symbol.clone(),
                    reason: SkipReason::Unreadable(e.to_string()),
                });
                continue;
            }
        };

        if candles.is_empty() {
            warn!(%symbol, "skipping symbol, no candles in range");
            skipped.push(SkippedSymbol {
                symbol: symbol.clone(),
                reason: SkipReason::NoData,
            });
            continue;
        }

        info!(%symbol, candles = candles.len(), "loaded");
        data.try_insert(symbol, candles)?;
    }

    if data.is_empty() {
        return Err(StratflowError::NoData {
            symbol: if symbols.is_empty() {
                "any symbol".to_string()
            } else {
                symbols.join(",")
            },
        });
    }

    Ok(LoadedMarketData { data, skipped })
}
