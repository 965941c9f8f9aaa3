//! CSV candle file adapter.
//!
//! One `<SYMBOL>.csv` per symbol in a base directory, with a header row naming
//! `timestamp,open,high,low,close,volume` in any column order (`date` is
//! accepted for `timestamp`).

use crate::domain::error::StratflowError;
use crate::domain::market_data::{Candle, DateRange, parse_timestamp};
use crate::ports::candle_port::CandlePort;
use std::fs;
use std::path::{Path, PathBuf};

const COLUMNS: [&str; 6] = ["timestamp", "open", "high", "low", "close", "volume"];

pub struct CsvCandleAdapter {
    base_path: PathBuf,
}

impl CsvCandleAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    /// An adapter over the directory holding `path`, plus the file stem to
    /// fetch it by.
    pub fn for_file(path: &Path) -> Result<(Self, String), StratflowError> {
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext == "csv");
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned());
        match (is_csv, stem) {
            (true, Some(stem)) => {
                let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
                Ok((Self::new(base), stem))
            }
            _ => Err(data_error(format!(
                "{}: expected a <SYMBOL>.csv file",
                path.display()
            ))),
        }
    }

    /// `<SYMBOL>.csv`, falling back to the lowercase file name.
    fn csv_path(&self, symbol: &str) -> PathBuf {
        let exact = self.base_path.join(format!("{}.csv", symbol));
        if exact.exists() {
            return exact;
        }
        let lower = self
            .base_path
            .join(format!("{}.csv", symbol.to_lowercase()));
        if lower.exists() { lower } else { exact }
    }
}

fn data_error(reason: String) -> StratflowError {
    StratflowError::Data { reason }
}

/// Maps each expected column to its index in the header row.
fn column_indices(headers: &csv::StringRecord, file: &str) -> Result<[usize; 6], StratflowError> {
    let mut indices = [0usize; 6];
    for (slot, name) in indices.iter_mut().zip(COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| {
                let h = h.trim().to_ascii_lowercase();
                h == name || (name == "timestamp" && h == "date")
            })
            .ok_or_else(|| data_error(format!("{}: missing {} column", file, name)))?;
    }
    Ok(indices)
}

impl CandlePort for CsvCandleAdapter {
    fn fetch_candles(&self, symbol: &str, range: &DateRange) -> Result<Vec<Candle>, StratflowError> {
        let path = self.csv_path(symbol);
        let file = path.display().to_string();
        let content = fs::read_to_string(&path)
            .map_err(|e| data_error(format!("failed to read {}: {}", file, e)))?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| data_error(format!("{}: CSV parse error: {}", file, e)))?
            .clone();
        let [ts_col, open_col, high_col, low_col, close_col, volume_col] = column_indices(&headers, &file)?;

        let mut rows = Vec::new();
        for (i, result) in rdr.records().enumerate() {
            // Header is line 1.
            let line = i + 2;
            let record = result.map_err(|e| data_error(format!("{}: CSV parse error: {}", file, e)))?;

            let timestamp = record.get(ts_col).unwrap_or_default().to_string();
            let parsed = parse_timestamp(&timestamp).ok_or_else(|| {
                data_error(format!(
                    "{} line {}: invalid timestamp '{}'",
                    file, line, timestamp
                ))
            })?;
            if !range.contains(parsed.date()) {
                continue;
            }

            let field = |col: usize, name: &str| -> Result<f64, StratflowError> {
                let raw = record.get(col).unwrap_or_default();
                raw.parse::<f64>().map_err(|_| {
                    data_error(format!("{} line {}: invalid {} value '{}'", file, line, name, raw))
                })
            };

            rows.push((
                parsed,
                Candle {
                    timestamp,
                    open: field(open_col, "open")?,
                    high: field(high_col, "high")?,
                    low: field(low_col, "low")?,
                    close: field(close_col, "close")?,
                    volume: field(volume_col, "volume")?,
                },
            ));
        }

        rows.sort_by_key(|(at, _)| *at);
        Ok(rows.into_iter().map(|(_, candle)| candle).collect())
    }

    fn list_symbols(&self) -> Result<Vec<String>, StratflowError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            data_error(format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ))
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| data_error(format!("directory entry error: {}", e)))?;
            let path = entry.path();
            let is_csv = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
            if let (true, Some(stem)) = (is_csv, path.file_stem()) {
                symbols.push(stem.to_string_lossy().to_uppercase());
            }
        }

        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }
}
