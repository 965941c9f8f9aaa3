//! Strategy graph node types.
//!
//! - `NodeKind`: the five vertex kinds a builder can place
//! - `NodeData`: kind-specific attributes as a sum type
//! - `AttrValue`: loosely-typed attribute value coming from a UI edit or a document
//! - `Node`: id + data + derived display label

use crate::domain::error::StratflowError;
use crate::domain::rule::is_reserved_word;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const SYMBOL: &str = "symbol";
pub const LABEL: &str = "label";
pub const INDICATOR_TYPE: &str = "indicatorType";
pub const PERIOD: &str = "period";
pub const LOGIC_OPERATOR: &str = "logicOperator";
pub const ORDER_TYPE: &str = "orderType";
pub const SIDE: &str = "side";
pub const MAX_DRAWDOWN_PERCENT: &str = "maxDrawdownPercent";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Asset,
    Indicator,
    Logic,
    Execution,
    Risk,
}

impl NodeKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asset" => Some(NodeKind::Asset),
            "indicator" => Some(NodeKind::Indicator),
            "logic" => Some(NodeKind::Logic),
            "execution" => Some(NodeKind::Execution),
            "risk" => Some(NodeKind::Risk),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Asset => "asset",
            NodeKind::Indicator => "indicator",
            NodeKind::Logic => "logic",
            NodeKind::Execution => "execution",
            NodeKind::Risk => "risk",
        };
        f.write_str(name)
    }
}

/// Indicator identity. Unrecognised names are kept verbatim so the validator
/// can report them instead of the edit being lost.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Ema,
    Sma,
    Wma,
    Rsi,
    Macd,
    Roc,
    Atr,
    Stddev,
    Obv,
    Vwap,
    Unknown(String),
}

impl IndicatorType {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "EMA" => IndicatorType::Ema,
            "SMA" => IndicatorType::Sma,
            "WMA" => IndicatorType::Wma,
            "RSI" => IndicatorType::Rsi,
            "MACD" => IndicatorType::Macd,
            "ROC" => IndicatorType::Roc,
            "ATR" => IndicatorType::Atr,
            "STDDEV" => IndicatorType::Stddev,
            "OBV" => IndicatorType::Obv,
            "VWAP" => IndicatorType::Vwap,
            _ => IndicatorType::Unknown(s.trim().to_string()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, IndicatorType::Unknown(_))
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Ema => write!(f, "EMA"),
            IndicatorType::Sma => write!(f, "SMA"),
            IndicatorType::Wma => write!(f, "WMA"),
            IndicatorType::Rsi => write!(f, "RSI"),
            IndicatorType::Macd => write!(f, "MACD"),
            IndicatorType::Roc => write!(f, "ROC"),
            IndicatorType::Atr => write!(f, "ATR"),
            IndicatorType::Stddev => write!(f, "STDDEV"),
            IndicatorType::Obv => write!(f, "OBV"),
            IndicatorType::Vwap => write!(f, "VWAP"),
            IndicatorType::Unknown(raw) => write!(f, "{}", raw.to_ascii_uppercase()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicOperator {
    And,
    Or,
    Not,
    Xor,
    Nand,
    Nor,
    Xnor,
    Gt,
    Lt,
    Eq,
    Neq,
    Unknown(String),
}

impl LogicOperator {
    /// Accepts operator names in any case as well as the comparison symbols.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "and" => LogicOperator::And,
            "or" => LogicOperator::Or,
            "not" => LogicOperator::Not,
            "xor" | "^" => LogicOperator::Xor,
            "nand" => LogicOperator::Nand,
            "nor" => LogicOperator::Nor,
            "xnor" => LogicOperator::Xnor,
            "gt" | ">" => LogicOperator::Gt,
            "lt" | "<" => LogicOperator::Lt,
            "eq" | "==" => LogicOperator::Eq,
            "neq" | "!=" => LogicOperator::Neq,
            _ => LogicOperator::Unknown(s.trim().to_string()),
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, LogicOperator::Unknown(_))
    }

    /// Canonical uppercase name, as shown in labels and documents.
    pub fn name(&self) -> String {
        match self {
            LogicOperator::And => "AND".into(),
            LogicOperator::Or => "OR".into(),
            LogicOperator::Not => "NOT".into(),
            LogicOperator::Xor => "XOR".into(),
            LogicOperator::Nand => "NAND".into(),
            LogicOperator::Nor => "NOR".into(),
            LogicOperator::Xnor => "XNOR".into(),
            LogicOperator::Gt => "GT".into(),
            LogicOperator::Lt => "LT".into(),
            LogicOperator::Eq => "EQ".into(),
            LogicOperator::Neq => "NEQ".into(),
            LogicOperator::Unknown(raw) => raw.to_ascii_uppercase(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "market" => Some(OrderType::Market),
            "limit" => Some(OrderType::Limit),
            _ => None,
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Market => write!(f, "Market"),
            OrderType::Limit => write!(f, "Limit"),
        }
    }
}

/// Trade direction of an execution node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" | "long" => Some(Side::Buy),
            "sell" | "short" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Attribute value as delivered by an edit command or a stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Number(f64),
    Text(String),
}

impl AttrValue {
    pub fn as_text(&self) -> String {
        match self {
            AttrValue::Text(s) => s.clone(),
            AttrValue::Number(n) => n.to_string(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AttrValue::Number(n) => Some(*n),
            AttrValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Number(n)
    }
}

impl From<u32> for AttrValue {
    fn from(n: u32) -> Self {
        AttrValue::Number(n as f64)
    }
}

/// Maps legacy builder keys onto the canonical attribute names.
fn canonical_key(key: &str) -> &str {
    match key {
        "logicType" => LOGIC_OPERATOR,
        "maxDrawdown" => MAX_DRAWDOWN_PERCENT,
        other => other,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Asset {
        symbol: Option<String>,
        label: Option<String>,
    },
    Indicator {
        indicator_type: Option<IndicatorType>,
        period: Option<u32>,
    },
    Logic {
        operator: Option<LogicOperator>,
    },
    Execution {
        order_type: Option<OrderType>,
        side: Option<Side>,
    },
    Risk {
        max_drawdown_pct: Option<f64>,
    },
}

impl NodeData {
    /// Attributes a freshly placed node starts with.
    pub fn with_defaults(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Asset => NodeData::Asset {
                symbol: None,
                label: None,
            },
            NodeKind::Indicator => NodeData::Indicator {
                indicator_type: Some(IndicatorType::Rsi),
                period: Some(14),
            },
            NodeKind::Logic => NodeData::Logic {
                operator: Some(LogicOperator::Gt),
            },
            NodeKind::Execution => NodeData::Execution {
                order_type: Some(OrderType::Market),
                side: None,
            },
            NodeKind::Risk => NodeData::Risk {
                max_drawdown_pct: Some(10.0),
            },
        }
    }

    /// No attributes at all; used when loading documents, where omissions must stay visible.
    pub fn empty(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Asset => NodeData::Asset {
                symbol: None,
                label: None,
            },
            NodeKind::Indicator => NodeData::Indicator {
                indicator_type: None,
                period: None,
            },
            NodeKind::Logic => NodeData::Logic { operator: None },
            NodeKind::Execution => NodeData::Execution {
                order_type: None,
                side: None,
            },
            NodeKind::Risk => NodeData::Risk {
                max_drawdown_pct: None,
            },
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Asset { .. } => NodeKind::Asset,
            NodeData::Indicator { .. } => NodeKind::Indicator,
            NodeData::Logic { .. } => NodeKind::Logic,
            NodeData::Execution { .. } => NodeKind::Execution,
            NodeData::Risk { .. } => NodeKind::Risk,
        }
    }

    pub fn set(&mut self, key: &str, value: &AttrValue) -> Result<(), StratflowError> {
        let kind = self.kind();
        let key = canonical_key(key);
        let invalid = |reason: String| StratflowError::InvalidAttribute {
            kind: kind.to_string(),
            key: key.to_string(),
            reason,
        };

        match (self, key) {
            (NodeData::Asset { symbol, .. }, SYMBOL) => {
                *symbol = asset_token(value).map_err(invalid)?;
            }
            (NodeData::Asset { label, .. }, LABEL) => {
                *label = asset_token(value).map_err(invalid)?;
            }
            (NodeData::Indicator { indicator_type, .. }, INDICATOR_TYPE) => {
                let text = value.as_text();
                if text.trim().is_empty() {
                    return Err(invalid("indicator type must not be empty".into()));
                }
                *indicator_type = Some(IndicatorType::parse(&text));
            }
            (NodeData::Indicator { period, .. }, PERIOD) => {
                *period = Some(parse_period(value).map_err(invalid)?);
            }
            (NodeData::Logic { operator }, LOGIC_OPERATOR) => {
                let text = value.as_text();
                if text.trim().is_empty() {
                    return Err(invalid("operator must not be empty".into()));
                }
                *operator = Some(LogicOperator::parse(&text));
            }
            (NodeData::Execution { order_type, .. }, ORDER_TYPE) => {
                let text = value.as_text();
                let parsed = OrderType::parse(&text)
                    .ok_or_else(|| invalid(format!("expected market or limit, found '{}'", text)))?;
                *order_type = Some(parsed);
            }
            (NodeData::Execution { side, .. }, SIDE) => {
                let text = value.as_text();
                let parsed = Side::parse(&text)
                    .ok_or_else(|| invalid(format!("expected buy or sell, found '{}'", text)))?;
                *side = Some(parsed);
            }
            (NodeData::Risk { max_drawdown_pct }, MAX_DRAWDOWN_PERCENT) => {
                let pct = value
                    .as_number()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| invalid(format!("'{}' is not a number", value.as_text())))?;
                if pct < 0.0 {
                    return Err(invalid("max drawdown must be non-negative".into()));
                }
                // -0.0 would render as MAX_DRAWDOWN_-0.
                *max_drawdown_pct = Some(pct + 0.0);
            }
            _ => return Err(invalid("not an attribute of this node kind".into())),
        }
        Ok(())
    }

    pub fn clear(&mut self, key: &str) -> Result<(), StratflowError> {
        let kind = self.kind();
        let key = canonical_key(key);
        match (self, key) {
            (NodeData::Asset { symbol, .. }, SYMBOL) => *symbol = None,
            (NodeData::Asset { label, .. }, LABEL) => *label = None,
            (NodeData::Indicator { indicator_type, .. }, INDICATOR_TYPE) => *indicator_type = None,
            (NodeData::Indicator { period, .. }, PERIOD) => *period = None,
            (NodeData::Logic { operator }, LOGIC_OPERATOR) => *operator = None,
            (NodeData::Execution { order_type, .. }, ORDER_TYPE) => *order_type = None,
            (NodeData::Execution { side, .. }, SIDE) => *side = None,
            (NodeData::Risk { max_drawdown_pct }, MAX_DRAWDOWN_PERCENT) => *max_drawdown_pct = None,
            _ => {
                return Err(StratflowError::InvalidAttribute {
                    kind: kind.to_string(),
                    key: key.to_string(),
                    reason: "not an attribute of this node kind".into(),
                });
            }
        }
        Ok(())
    }

    /// Display label; a pure function of kind and attributes.
    pub fn label(&self) -> String {
        match self {
            NodeData::Asset { symbol, label } => symbol
                .clone()
                .or_else(|| label.clone())
                .unwrap_or_else(|| "Asset/Market Selector".to_string()),
            NodeData::Indicator {
                indicator_type,
                period,
            } => match (indicator_type, period) {
                (Some(t), Some(p)) => format!("{}({})", t, p),
                (Some(t), None) => t.to_string(),
                (None, _) => "Indicator".to_string(),
            },
            NodeData::Logic { operator } => operator
                .as_ref()
                .map(LogicOperator::name)
                .unwrap_or_else(|| "Logic Operator".to_string()),
            NodeData::Execution { order_type, side } => match (order_type, side) {
                (Some(o), Some(s)) => format!("{} {}", o, s),
                (Some(o), None) => format!("{} order", o),
                (None, Some(s)) => format!("Execution {}", s),
                (None, None) => "Execution".to_string(),
            },
            NodeData::Risk { max_drawdown_pct } => match max_drawdown_pct {
                Some(pct) => format!("Max drawdown {}%", pct),
                None => "Risk Management".to_string(),
            },
        }
    }

    /// Attributes that are set, keyed by canonical name.
    pub fn attributes(&self) -> BTreeMap<String, AttrValue> {
        let mut attrs = BTreeMap::new();
        let mut put = |key: &str, value: Option<AttrValue>| {
            if let Some(v) = value {
                attrs.insert(key.to_string(), v);
            }
        };
        match self {
            NodeData::Asset { symbol, label } => {
                put(SYMBOL, symbol.clone().map(AttrValue::Text));
                put(LABEL, label.clone().map(AttrValue::Text));
            }
            NodeData::Indicator {
                indicator_type,
                period,
            } => {
                put(
                    INDICATOR_TYPE,
                    indicator_type.as_ref().map(|t| AttrValue::Text(t.to_string())),
                );
                put(PERIOD, period.map(AttrValue::from));
            }
            NodeData::Logic { operator } => {
                put(
                    LOGIC_OPERATOR,
                    operator.as_ref().map(|o| AttrValue::Text(o.name())),
                );
            }
            NodeData::Execution { order_type, side } => {
                put(
                    ORDER_TYPE,
                    order_type.map(|o| AttrValue::Text(o.to_string().to_ascii_lowercase())),
                );
                put(
                    SIDE,
                    side.map(|s| AttrValue::Text(s.to_string().to_ascii_lowercase())),
                );
            }
            NodeData::Risk { max_drawdown_pct } => {
                put(MAX_DRAWDOWN_PERCENT, max_drawdown_pct.map(AttrValue::Number));
            }
        }
        attrs
    }
}

/// Asset text is emitted verbatim into rule text, so it must stay one token
/// that reads back as an operand.
fn asset_token(value: &AttrValue) -> Result<Option<String>, String> {
    let text = value.as_text();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed
        .chars()
        .any(|c| c.is_whitespace() || c == '(' || c == ')')
    {
        return Err(format!(
            "'{}' must not contain whitespace or parentheses",
            trimmed
        ));
    }
    if is_reserved_word(trimmed) {
        return Err(format!("'{}' is reserved in rule text", trimmed));
    }
    Ok(Some(trimmed.to_string()))
}

fn parse_period(value: &AttrValue) -> Result<u32, String> {
    let n = value
        .as_number()
        .ok_or_else(|| format!("'{}' is not a number", value.as_text()))?;
    if !n.is_finite() || n.fract() != 0.0 {
        return Err(format!("period must be a whole number, found {}", n));
    }
    if n < 1.0 || n > u32::MAX as f64 {
        return Err(format!("period must be positive, found {}", n));
    }
    Ok(n as u32)
}

/// A vertex of the strategy graph. Holds no behaviour; the graph is the only mutator.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: NodeId,
    data: NodeData,
    label: String,
}

impl Node {
    pub fn new(id: NodeId, data: NodeData) -> Self {
        let label = data.label();
        Self { id, data, label }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.data.kind()
    }

    pub fn data(&self) -> &NodeData {
        &self.data
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn set_attribute(&mut self, key: &str, value: &AttrValue) -> Result<(), StratflowError> {
        self.data.set(key, value)?;
        self.label = self.data.label();
        Ok(())
    }

    pub(crate) fn clear_attribute(&mut self, key: &str) -> Result<(), StratflowError> {
        self.data.clear(key)?;
        self.label = self.data.label();
        Ok(())
    }
}
