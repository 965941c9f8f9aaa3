//! Backtest request payload.
//!
//! Pure transform of compiled rule text, candles and cost settings into the
//! engine's JSON request body.

use crate::domain::document::{EdgeDocument, GraphDocument, NodeDocument};
use crate::domain::error::StratflowError;
use crate::domain::market_data::MarketData;
use crate::domain::rule::CompiledStrategy;
use serde::{Deserialize, Serialize};

pub const CUSTOM_STRATEGY: &str = "custom";

/// Stop loss, take profit, fees and slippage. Unset values are left out of
/// the request so the engine applies its own defaults.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ExecutionCosts {
    pub sl: Option<f64>,
    pub tp: Option<f64>,
    pub fees: Option<f64>,
    pub slippage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub strategy: String,
    pub logic: String,
    pub data: MarketData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sl: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fees: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slippage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<NodeDocument>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<EdgeDocument>>,
}

impl BacktestRequest {
    pub fn to_json(&self) -> Result<String, StratflowError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, StratflowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builds the request body. `graph` attaches the raw nodes and edges.
pub fn build_request(
    strategy: &CompiledStrategy,
    data: MarketData,
    costs: &ExecutionCosts,
    graph: Option<&GraphDocument>,
) -> Result<BacktestRequest, StratflowError> {
    if strategy.is_empty() {
        return Err(StratflowError::NothingCompiled {
            reason: "no execution node is ready".to_string(),
        });
    }
    if data.is_empty() {
        return Err(StratflowError::NoData {
            symbol: "any symbol".to_string(),
        });
    }

    Ok(BacktestRequest {
        strategy: CUSTOM_STRATEGY.to_string(),
        logic: strategy.logic_text(),
        data,
        sl: costs.sl,
        tp: costs.tp,
        fees: costs.fees,
        slippage: costs.slippage,
        nodes: graph.map(|g| g.nodes.clone()),
        edges: graph.map(|g| g.edges.clone()),
    })
}
