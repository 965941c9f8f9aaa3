//! Engine response shapes.
//!
//! Metrics are opaque numbers computed by the engine. This module only
//! finds the trade list and the equity and drawdown curves, and tells when a
//! progress stream has finished.

use crate::domain::error::StratflowError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const SYMBOL_COMPLETED: &str = "symbol_completed";
pub const PORTFOLIO_COMPLETED: &str = "portfolio_completed";

/// Result for one symbol, or the portfolio aggregate.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_profit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_trades: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub win_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_drawdown: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sharpe_ratio: Option<f64>,
    #[serde(default)]
    pub trades: Vec<Value>,
    #[serde(default)]
    pub equity_curve: Vec<Value>,
    #[serde(default)]
    pub drawdown_curve: Vec<Value>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EngineResult {
    Portfolio {
        portfolio: RunResult,
        #[serde(default)]
        per_symbol: BTreeMap<String, RunResult>,
    },
    Flat(RunResult),
}

impl EngineResult {
    pub fn from_json(text: &str) -> Result<Self, StratflowError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_value(value: Value) -> Result<Self, StratflowError> {
        Ok(serde_json::from_value(value)?)
    }

    /// The flat result, or the portfolio aggregate.
    pub fn primary(&self) -> &RunResult {
        match self {
            EngineResult::Portfolio { portfolio, .. } => portfolio,
            EngineResult::Flat(result) => result,
        }
    }

    pub fn per_symbol(&self) -> impl Iterator<Item = (&str, &RunResult)> {
        let map = match self {
            EngineResult::Portfolio { per_symbol, .. } => Some(per_symbol),
            EngineResult::Flat(_) => None,
        };
        map.into_iter()
            .flatten()
            .map(|(symbol, result)| (symbol.as_str(), result))
    }

    pub fn trades(&self) -> &[Value] {
        &self.primary().trades
    }

    pub fn equity_curve(&self) -> &[Value] {
        self.curve(|r| &r.equity_curve)
    }

    pub fn drawdown_curve(&self) -> &[Value] {
        self.curve(|r| &r.drawdown_curve)
    }

    /// A portfolio without its own curve falls back to the first symbol that has one.
    fn curve<'a>(&'a self, pick: impl Fn(&'a RunResult) -> &'a Vec<Value>) -> &'a [Value] {
        let own = pick(self.primary());
        if !own.is_empty() {
            return own;
        }
        self.per_symbol()
            .map(|(_, r)| pick(r))
            .find(|c| !c.is_empty())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// One message of the engine's progress stream.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interim_metrics: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Everything else, including a `portfolio_completed` frame's top-level
    /// `portfolio` and `per_symbol`.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl StreamMessage {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status.as_deref(),
            Some(SYMBOL_COMPLETED) | Some(PORTFOLIO_COMPLETED)
        )
    }

    /// The final result carried by a terminal message. A single-symbol
    /// completion is lifted into a portfolio of one. A portfolio completion
    /// may nest its result under `result` or carry `portfolio` and
    /// `per_symbol` at the top level of the frame.
    pub fn final_result(&self) -> Option<Result<EngineResult, StratflowError>> {
        match self.status.as_deref() {
            Some(SYMBOL_COMPLETED) => {
                let result = self.result.clone()?;
                let run = match serde_json::from_value::<RunResult>(result) {
                    Ok(run) => run,
                    Err(e) => return Some(Err(StratflowError::from(e))),
                };
                let mut per_symbol = BTreeMap::new();
                if let Some(symbol) = &self.symbol {
                    per_symbol.insert(symbol.clone(), run.clone());
                }
                Some(Ok(EngineResult::Portfolio {
                    portfolio: run,
                    per_symbol,
                }))
            }
            Some(PORTFOLIO_COMPLETED) => match &self.result {
                Some(result) => Some(EngineResult::from_value(result.clone())),
                None => {
                    let portfolio = self.extra.get("portfolio")?.clone();
                    let mut body = serde_json::Map::new();
                    body.insert("portfolio".to_string(), portfolio);
                    if let Some(per_symbol) = self.extra.get("per_symbol") {
                        body.insert("per_symbol".to_string(), per_symbol.clone());
                    }
                    Some(EngineResult::from_value(Value::Object(body)))
                }
            },
            _ => None,
        }
    }
}

/// Folds a stream into the latest progress, interim metrics and final result.
#[derive(Debug, Clone, Default)]
pub struct StreamState {
    pub progress: Option<f64>,
    pub interim_metrics: Option<Value>,
    pub events: usize,
    pub result: Option<EngineResult>,
}

impl StreamState {
    /// Returns true once a terminal message has been applied. An error frame
    /// from the engine ends the stream with a data error.
    pub fn apply(&mut self, message: StreamMessage) -> Result<bool, StratflowError> {
        if let Some(error) = &message.error {
            return Err(StratflowError::Data {
                reason: format!("engine reported: {}", error),
            });
        }
        if message.progress.is_some() {
            self.progress = message.progress;
        }
        if message.event.is_some() {
            self.events += 1;
        }
        if let Some(metrics) = &message.interim_metrics {
            self.interim_metrics = Some(metrics.clone());
        }
        if message.is_terminal() {
            if let Some(result) = message.final_result() {
                self.result = Some(result?);
            }
            return Ok(true);
        }
        Ok(false)
    }

    pub fn is_complete(&self) -> bool {
        self.result.is_some()
    }
}
