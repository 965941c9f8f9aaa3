//! Configuration validation.
//!
//! Turns raw INI values into typed settings, checking ranges before any
//! graph is compiled or data is read.

use crate::domain::error::StratflowError;
use crate::domain::market_data::{DateRange, parse_symbols};
use crate::domain::payload::ExecutionCosts;
use crate::domain::validator::{CompileOptions, DEFAULT_MAX_DEPTH};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

pub const MAX_DEPTH_LIMIT: usize = 256;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Settings {
    pub compile: CompileOptions,
    pub include_graph: bool,
    pub costs: ExecutionCosts,
    pub data: DataSettings,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataSettings {
    pub dir: Option<PathBuf>,
    pub symbols: Option<Vec<String>>,
    pub range: DateRange,
}

impl DataSettings {
    pub fn require_dir(&self) -> Result<&Path, StratflowError> {
        self.dir.as_deref().ok_or_else(|| StratflowError::ConfigMissing {
            section: "data".to_string(),
            key: "dir".to_string(),
        })
    }
}

pub fn load_settings(config: &dyn ConfigPort) -> Result<Settings, StratflowError> {
    Ok(Settings {
        compile: validate_compile_options(config)?,
        include_graph: config.get_bool("compiler", "include_graph")?.unwrap_or(false),
        costs: validate_costs(config)?,
        data: validate_data(config)?,
    })
}

pub fn validate_compile_options(config: &dyn ConfigPort) -> Result<CompileOptions, StratflowError> {
    let Some(depth) = config.get_int("compiler", "max_depth")? else {
        return Ok(CompileOptions {
            max_depth: DEFAULT_MAX_DEPTH,
        });
    };
    if depth < 1 || depth > MAX_DEPTH_LIMIT as i64 {
        return Err(StratflowError::ConfigInvalid {
            section: "compiler".to_string(),
            key: "max_depth".to_string(),
            reason: format!("max_depth must be between 1 and {}", MAX_DEPTH_LIMIT),
        });
    }
    Ok(CompileOptions {
        max_depth: depth as usize,
    })
}

pub fn validate_costs(config: &dyn ConfigPort) -> Result<ExecutionCosts, StratflowError> {
    Ok(ExecutionCosts {
        sl: non_negative(config, "sl")?,
        tp: non_negative(config, "tp")?,
        fees: non_negative(config, "fees")?,
        slippage: non_negative(config, "slippage")?,
    })
}

fn non_negative(config: &dyn ConfigPort, key: &str) -> Result<Option<f64>, StratflowError> {
    let value = config.get_double("costs", key)?;
    if value.is_some_and(|v| v < 0.0) {
        return Err(StratflowError::ConfigInvalid {
            section: "costs".to_string(),
            key: key.to_string(),
            reason: format!("{} must be non-negative", key),
        });
    }
    Ok(value)
}

pub fn validate_data(config: &dyn ConfigPort) -> Result<DataSettings, StratflowError> {
    let dir = config
        .get_string("data", "dir")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from);

    let symbols = match config.get_string("data", "symbols") {
        Some(s) if !s.trim().is_empty() => {
            Some(parse_symbols(&s).map_err(|e| StratflowError::ConfigInvalid {
                section: "data".to_string(),
                key: "symbols".to_string(),
                reason: e.to_string(),
            })?)
        }
        _ => None,
    };

    let start = parse_date(config.get_string("data", "start").as_deref(), "start")?;
    let end = parse_date(config.get_string("data", "end").as_deref(), "end")?;
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(StratflowError::ConfigInvalid {
                section: "data".to_string(),
                key: "start".to_string(),
                reason: "start must not be after end".to_string(),
            });
        }
    }

    Ok(DataSettings {
        dir,
        symbols,
        range: DateRange { start, end },
    })
}

fn parse_date(value: Option<&str>, field: &str) -> Result<Option<NaiveDate>, StratflowError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| StratflowError::ConfigInvalid {
                section: "data".to_string(),
                key: field.to_string(),
                reason: format!("invalid {} format, expected YYYY-MM-DD", field),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    fn make_config(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn full_config_passes() {
        let config = make_config(
            r#"
[compiler]
max_depth = 12
include_graph = true

[costs]
sl = 0.05
tp = 0.1
fees = 0.001
slippage = 0.0005

[data]
dir = ./data
symbols = btc-usdt,ETH-USDT
start = 2024-01-01
end = 2024-12-31
"#,
        );
        let settings = load_settings(&config).unwrap();
        assert_eq!(settings.compile.max_depth, 12);
        assert!(settings.include_graph);
        assert_eq!(settings.costs.sl, Some(0.05));
        assert_eq!(settings.costs.slippage, Some(0.0005));
        assert_eq!(
            settings.data.symbols,
            Some(vec!["BTC-USDT".to_string(), "ETH-USDT".to_string()])
        );
        assert_eq!(settings.data.require_dir().unwrap(), Path::new("./data"));
        assert_eq!(
            settings.data.range.start,
            NaiveDate::from_ymd_opt(2024, 1, 1)
        );
    }

    #[test]
    fn empty_config_uses_defaults() {
        let settings = load_settings(&make_config("")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.compile.max_depth, DEFAULT_MAX_DEPTH);
        assert!(matches!(
            settings.data.require_dir(),
            Err(StratflowError::ConfigMissing { ref key, .. }) if key == "dir"
        ));
    }

    #[test]
    fn max_depth_out_of_range_fails() {
        for depth in ["0", "257", "-3"] {
            let config = make_config(&format!("[compiler]\nmax_depth = {}\n", depth));
            let err = validate_compile_options(&config).unwrap_err();
            assert!(matches!(err, StratflowError::ConfigInvalid { ref key, .. } if key == "max_depth"));
        }
        let config = make_config("[compiler]\nmax_depth = 256\n");
        assert_eq!(validate_compile_options(&config).unwrap().max_depth, 256);
    }

    #[test]
    fn negative_cost_fails() {
        let config = make_config("[costs]\nfees = -0.1\n");
        let err = validate_costs(&config).unwrap_err();
        assert!(matches!(err, StratflowError::ConfigInvalid { ref key, .. } if key == "fees"));
    }

    #[test]
    fn non_numeric_cost_fails() {
        let config = make_config("[costs]\nsl = five\n");
        let err = validate_costs(&config).unwrap_err();
        assert!(matches!(err, StratflowError::ConfigInvalid { ref key, .. } if key == "sl"));
    }

    #[test]
    fn bad_symbol_list_fails() {
        let config = make_config("[data]\nsymbols = BTC,,ETH\n");
        let err = validate_data(&config).unwrap_err();
        assert!(matches!(err, StratflowError::ConfigInvalid { ref key, .. } if key == "symbols"));
    }

    #[test]
    fn invalid_date_format_fails() {
        let config = make_config("[data]\nstart = 2024/01/01\n");
        let err = validate_data(&config).unwrap_err();
        assert!(matches!(err, StratflowError::ConfigInvalid { ref key, .. } if key == "start"));
    }

    #[test]
    fn start_after_end_fails() {
        let config = make_config("[data]\nstart = 2024-12-31\nend = 2024-01-01\n");
        let err = validate_data(&config).unwrap_err();
        assert!(matches!(err, StratflowError::ConfigInvalid { ref key, .. } if key == "start"));
    }

    #[test]
    fn single_day_range_is_allowed() {
        let config = make_config("[data]\nstart = 2024-06-01\nend = 2024-06-01\n");
        assert!(validate_data(&config).is_ok());
    }
}
