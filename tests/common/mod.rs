#![allow(dead_code)]

use std::collections::HashMap;
use stratflow::domain::error::StratflowError;
use stratflow::domain::graph::StrategyGraph;
use stratflow::domain::market_data::{Candle, DateRange, parse_timestamp};
use stratflow::domain::node::{
    AttrValue, INDICATOR_TYPE, LABEL, LOGIC_OPERATOR, MAX_DRAWDOWN_PERCENT, NodeId, NodeKind,
    ORDER_TYPE, PERIOD, SIDE, SYMBOL,
};
use stratflow::ports::candle_port::CandlePort;

pub fn asset(g: &mut StrategyGraph, symbol: &str) -> NodeId {
    g.add_node(NodeKind::Asset, [(SYMBOL, AttrValue::from(symbol))])
        .unwrap()
}

/// An asset node with only a label, rendered as a literal token.
pub fn literal(g: &mut StrategyGraph, text: &str) -> NodeId {
    g.add_node(NodeKind::Asset, [(LABEL, AttrValue::from(text))])
        .unwrap()
}

pub fn indicator(g: &mut StrategyGraph, indicator_type: &str, period: u32) -> NodeId {
    g.add_node(
        NodeKind::Indicator,
        [
            (INDICATOR_TYPE, AttrValue::from(indicator_type)),
            (PERIOD, AttrValue::from(period)),
        ],
    )
    .unwrap()
}

pub fn logic(g: &mut StrategyGraph, op: &str) -> NodeId {
    g.add_node(NodeKind::Logic, [(LOGIC_OPERATOR, AttrValue::from(op))])
        .unwrap()
}

pub fn execution(g: &mut StrategyGraph, order_type: &str) -> NodeId {
    g.add_node(NodeKind::Execution, [(ORDER_TYPE, AttrValue::from(order_type))])
        .unwrap()
}

pub fn execution_with_side(g: &mut StrategyGraph, order_type: &str, side: &str) -> NodeId {
    g.add_node(
        NodeKind::Execution,
        [
            (ORDER_TYPE, AttrValue::from(order_type)),
            (SIDE, AttrValue::from(side)),
        ],
    )
    .unwrap()
}

pub fn risk(g: &mut StrategyGraph, pct: f64) -> NodeId {
    g.add_node(NodeKind::Risk, [(MAX_DRAWDOWN_PERCENT, AttrValue::from(pct))])
        .unwrap()
}

pub fn connect(g: &mut StrategyGraph, source: &NodeId, target: &NodeId) {
    g.add_edge(source, target).unwrap();
}

/// Asset, EMA 9 and EMA 21 feeding a GT node into a market execution node.
pub fn crossover_graph() -> (StrategyGraph, NodeId) {
    let mut g = StrategyGraph::new();
    asset(&mut g, "BTC-USDT");
    let fast = indicator(&mut g, "EMA", 9);
    let slow = indicator(&mut g, "EMA", 21);
    let gt = logic(&mut g, "GT");
    connect(&mut g, &fast, &gt);
    connect(&mut g, &slow, &gt);
    let exec = execution(&mut g, "market");
    connect(&mut g, &gt, &exec);
    (g, exec)
}

pub fn candle(timestamp: &str, close: f64) -> Candle {
    Candle {
        timestamp: timestamp.to_string(),
        open: close,
        high: close + 1.0,
        low: close - 1.0,
        close,
        volume: 1000.0,
    }
}

pub struct MockCandlePort {
    pub data: HashMap<String, Vec<Candle>>,
    pub errors: HashMap<String, String>,
}

impl MockCandlePort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_candles(mut self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.data.insert(symbol.to_string(), candles);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl CandlePort for MockCandlePort {
    fn fetch_candles(&self, symbol: &str, range: &DateRange) -> Result<Vec<Candle>, StratflowError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(StratflowError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(symbol)
            .map(|candles| {
                candles
                    .iter()
                    .filter(|c| {
                        parse_timestamp(&c.timestamp).is_some_and(|t| range.contains(t.date()))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, StratflowError> {
        let mut symbols: Vec<String> = self
            .data
            .keys()
            .chain(self.errors.keys())
            .cloned()
            .collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }
}
