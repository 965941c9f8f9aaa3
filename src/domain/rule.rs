//! Rule IR emitted by the compiler.
//!
//! - `Operand`: a leaf token (indicator, asset/literal, drawdown limit)
//! - `Connective`: the infix operator joining the operands of one logic node
//! - `Condition`: the condition tree, nested logic nodes become nested conditions
//! - `RuleLine`: one `IF ... THEN ...` line
//! - `CompiledStrategy`: all lines of a graph, in execution-node creation order
//!
//! `Display` is the canonical text form sent to the engine.

use crate::domain::node::{IndicatorType, NodeId, Side};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Indicator {
        indicator_type: IndicatorType,
        period: u32,
    },
    /// Asset symbol or literal value, emitted verbatim.
    Asset(String),
    MaxDrawdown(f64),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Indicator {
                indicator_type,
                period,
            } => write!(f, "{}_{}", indicator_type, period),
            Operand::Asset(text) => f.write_str(text),
            Operand::MaxDrawdown(pct) => write!(f, "MAX_DRAWDOWN_{}", pct),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connective {
    Gt,
    Lt,
    Eq,
    Neq,
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Xnor,
}

impl Connective {
    pub const ALL: [Connective; 10] = [
        Connective::Gt,
        Connective::Lt,
        Connective::Eq,
        Connective::Neq,
        Connective::And,
        Connective::Or,
        Connective::Xor,
        Connective::Nand,
        Connective::Nor,
        Connective::Xnor,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Connective::Gt => ">",
            Connective::Lt => "<",
            Connective::Eq => "==",
            Connective::Neq => "!=",
            Connective::And => "and",
            Connective::Or => "or",
            Connective::Xor => "^",
            Connective::Nand => "nand",
            Connective::Nor => "nor",
            Connective::Xnor => "xnor",
        }
    }

    pub fn from_symbol(s: &str) -> Option<Self> {
        Connective::ALL.into_iter().find(|c| c.symbol() == s)
    }
}

pub const KEYWORD_IF: &str = "IF";
pub const KEYWORD_THEN: &str = "THEN";
pub const KEYWORD_NOT: &str = "not";

/// Keywords and connective symbols, which can never stand as an operand.
pub fn is_reserved_word(token: &str) -> bool {
    matches!(token, KEYWORD_IF | KEYWORD_THEN | KEYWORD_NOT) || Connective::from_symbol(token).is_some()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Operand(Operand),
    Compose {
        op: Connective,
        operands: Vec<Condition>,
    },
    Not(Box<Condition>),
}

impl Condition {
    /// A single operand needs no connective, so it is returned as is.
    pub fn compose(op: Connective, mut operands: Vec<Condition>) -> Condition {
        if operands.len() == 1 {
            return operands.remove(0);
        }
        Condition::Compose { op, operands }
    }

    pub fn negate(inner: Condition) -> Condition {
        Condition::Not(Box::new(inner))
    }

    /// Renders as an operand of an enclosing condition: anything but a leaf is parenthesised.
    fn fmt_nested(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Operand(op) => write!(f, "{}", op),
            other => write!(f, "({})", other),
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Condition::Operand(_) => 0,
            Condition::Compose { operands, .. } => {
                1 + operands.iter().map(Condition::depth).max().unwrap_or(0)
            }
            Condition::Not(inner) => 1 + inner.depth(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Operand(op) => write!(f, "{}", op),
            Condition::Compose { op, operands } => {
                for (i, operand) in operands.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", op.symbol())?;
                    }
                    operand.fmt_nested(f)?;
                }
                Ok(())
            }
            Condition::Not(inner) => {
                write!(f, "{} ", KEYWORD_NOT)?;
                inner.fmt_nested(f)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleLine {
    pub condition: Condition,
    pub action: Side,
}

impl fmt::Display for RuleLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            KEYWORD_IF, self.condition, KEYWORD_THEN, self.action
        )
    }
}

/// A compiled line together with the execution node it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    pub execution: NodeId,
    pub rule: RuleLine,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledStrategy {
    pub rules: Vec<CompiledRule>,
}

impl CompiledStrategy {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Newline-separated rule text; empty when nothing compiled.
    pub fn logic_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CompiledStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, compiled) in self.rules.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", compiled.rule)?;
        }
        Ok(())
    }
}

/// Distinct indicator operands in first-appearance order.
pub fn extract_indicators(condition: &Condition) -> Vec<Operand> {
    fn walk(condition: &Condition, out: &mut Vec<Operand>) {
        match condition {
            Condition::Operand(op @ Operand::Indicator { .. }) => {
                if !out.contains(op) {
                    out.push(op.clone());
                }
            }
            Condition::Operand(_) => {}
            Condition::Compose { operands, .. } => {
                for operand in operands {
                    walk(operand, out);
                }
            }
            Condition::Not(inner) => walk(inner, out),
        }
    }

    let mut out = Vec::new();
    walk(condition, &mut out);
    out
}
