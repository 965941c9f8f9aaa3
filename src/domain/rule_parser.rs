//! Rule text parser.
//!
//! Recursive descent parser for the canonical rule lines produced by the
//! compiler:
//!
//! ```text
//! line      := "IF" condition "THEN" ("BUY" | "SELL")
//! condition := "not" atom | atom (op atom)*
//! atom      := "(" condition ")" | token
//! op        := ">" | "<" | "==" | "!=" | "and" | "or" | "^" | "nand" | "nor" | "xnor"
//! ```
//!
//! One level may use only one operator; mixing requires parentheses, which is
//! exactly how the compiler renders nested logic nodes. Parentheses may nest
//! as deeply as the compiler is allowed to nest logic, and no deeper.

use crate::domain::config_validation::MAX_DEPTH_LIMIT;
use crate::domain::error::ParseError;
use crate::domain::node::{IndicatorType, Side};
use crate::domain::rule::{
    Condition, Connective, KEYWORD_IF, KEYWORD_NOT, KEYWORD_THEN, Operand, RuleLine,
    is_reserved_word,
};

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    /// Open parentheses around the current position.
    nesting: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            nesting: 0,
        }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(ParseError {
                message: format!("expected '{}', found '{}'", expected, ch),
                position: self.pos,
            }),
            None => Err(ParseError {
                message: format!("expected '{}', found end of input", expected),
                position: self.pos,
            }),
        }
    }

    /// The next token without consuming it: a run of characters up to
    /// whitespace or a parenthesis.
    fn peek_token(&self) -> Option<&'a str> {
        let rest = self.remaining();
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '(' || c == ')')
            .unwrap_or(rest.len());
        if end == 0 { None } else { Some(&rest[..end]) }
    }

    fn describe_next(&self) -> String {
        match (self.peek_token(), self.peek()) {
            (Some(token), _) => format!("'{}'", token),
            (None, Some(ch)) => format!("'{}'", ch),
            (None, None) => "end of input".to_string(),
        }
    }

    fn consume_keyword(&mut self, keyword: &str) -> bool {
        let Some(after) = self.remaining().strip_prefix(keyword) else {
            return false;
        };
        let boundary = after
            .chars()
            .next()
            .map(|c| c.is_whitespace() || c == '(')
            .unwrap_or(true);
        if boundary {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.consume_keyword(keyword) {
            Ok(())
        } else {
            Err(ParseError {
                message: format!("expected '{}', found {}", keyword, self.describe_next()),
                position: self.pos,
            })
        }
    }

    fn parse_line(&mut self) -> Result<RuleLine, ParseError> {
        self.expect_keyword(KEYWORD_IF)?;
        let condition = self.parse_condition()?;
        self.expect_keyword(KEYWORD_THEN)?;
        let action = self.parse_action()?;
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(ParseError {
                message: format!("unexpected trailing input {}", self.describe_next()),
                position: self.pos,
            });
        }
        Ok(RuleLine { condition, action })
    }

    fn parse_condition(&mut self) -> Result<Condition, ParseError> {
        self.skip_whitespace();
        if self.consume_keyword(KEYWORD_NOT) {
            let inner = self.parse_atom()?;
            return Ok(Condition::negate(inner));
        }

        let mut operands = vec![self.parse_atom()?];
        let mut op: Option<Connective> = None;
        loop {
            self.skip_whitespace();
            let Some(next) = self.peek_token().and_then(Connective::from_symbol) else {
                break;
            };
            if let Some(current) = op.filter(|c| *c != next) {
                return Err(ParseError {
                    message: format!(
                        "cannot mix '{}' and '{}' without parentheses",
                        current.symbol(),
                        next.symbol()
                    ),
                    position: self.pos,
                });
            }
            op = Some(next);
            self.pos += next.symbol().len();
            operands.push(self.parse_atom()?);
        }

        Ok(match op {
            Some(op) => Condition::Compose { op, operands },
            None => operands.remove(0),
        })
    }

    fn parse_atom(&mut self) -> Result<Condition, ParseError> {
        self.skip_whitespace();
        if self.peek() == Some('(') {
            if self.nesting >= MAX_DEPTH_LIMIT {
                return Err(ParseError {
                    message: "nesting too deep".to_string(),
                    position: self.pos,
                });
            }
            self.advance();
            self.nesting += 1;
            let inner = self.parse_condition()?;
            self.expect_char(')')?;
            self.nesting -= 1;
            return Ok(inner);
        }

        let start = self.pos;
        let token = match self.peek_token() {
            Some(t) if !is_reserved_word(t) => t,
            _ => {
                return Err(ParseError {
                    message: format!("expected operand, found {}", self.describe_next()),
                    position: start,
                });
            }
        };
        self.pos += token.len();
        Ok(Condition::Operand(classify(token)))
    }

    fn parse_action(&mut self) -> Result<Side, ParseError> {
        self.skip_whitespace();
        let side = match self.peek_token() {
            Some("BUY") => Side::Buy,
            Some("SELL") => Side::Sell,
            _ => {
                return Err(ParseError {
                    message: format!("expected 'BUY' or 'SELL', found {}", self.describe_next()),
                    position: self.pos,
                });
            }
        };
        self.pos += side.to_string().len();
        Ok(side)
    }
}

/// `MAX_DRAWDOWN_{pct}`, `{TYPE}_{period}` for a known indicator, otherwise an
/// asset or literal taken verbatim.
fn classify(token: &str) -> Operand {
    if let Some(pct) = token
        .strip_prefix("MAX_DRAWDOWN_")
        .filter(|r| !r.is_empty() && r.chars().all(|c| c.is_ascii_digit() || c == '.'))
        .and_then(|r| r.parse::<f64>().ok())
    {
        return Operand::MaxDrawdown(pct);
    }

    if let Some((name, period)) = token.rsplit_once('_') {
        let indicator_type = IndicatorType::parse(name);
        let uppercase = !name.is_empty() && name.chars().all(|c| c.is_ascii_uppercase());
        let digits = !period.is_empty() && period.chars().all(|c| c.is_ascii_digit());
        if uppercase && digits && indicator_type.is_known() {
            if let Ok(period) = period.parse::<u32>() {
                if period > 0 {
                    return Operand::Indicator {
                        indicator_type,
                        period,
                    };
                }
            }
        }
    }

    Operand::Asset(token.to_string())
}

/// Parse a single rule line.
pub fn parse_line(input: &str) -> Result<RuleLine, ParseError> {
    Parser::new(input).parse_line()
}

/// Parse newline-separated rule text. Blank lines are skipped; error
/// positions are offsets into the whole text.
pub fn parse(text: &str) -> Result<Vec<RuleLine>, ParseError> {
    let mut rules = Vec::new();
    let mut offset = 0;
    for line in text.split('\n') {
        let line_body = line.strip_suffix('\r').unwrap_or(line);
        if !line_body.trim().is_empty() {
            let rule = parse_line(line_body).map_err(|e| ParseError {
                message: e.message,
                position: e.position + offset,
            })?;
            rules.push(rule);
        }
        offset += line.len() + 1;
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(text: &str) {
        let rule = parse_line(text).unwrap();
        assert_eq!(rule.to_string(), text);
    }

    #[test]
    fn parse_simple_comparison() {
        let rule = parse_line("IF RSI_14 > 30 THEN BUY").unwrap();
        assert_eq!(rule.action, Side::Buy);
        match rule.condition {
            Condition::Compose { op, ref operands } => {
                assert_eq!(op, Connective::Gt);
                assert_eq!(
                    operands[0],
                    Condition::Operand(Operand::Indicator {
                        indicator_type: IndicatorType::Rsi,
                        period: 14
                    })
                );
                assert_eq!(operands[1], Condition::Operand(Operand::Asset("30".into())));
            }
            other => panic!("expected compose, got {:?}", other),
        }
    }

    #[test]
    fn canonical_lines_round_trip() {
        round_trip("IF EMA_9 > EMA_21 THEN BUY");
        round_trip("IF RSI_14 < 30 THEN SELL");
        round_trip("IF (EMA_9 > EMA_21) and (not MAX_DRAWDOWN_12.5) THEN BUY");
        round_trip("IF not (a == b) THEN SELL");
        round_trip("IF (not a) or b THEN BUY");
        round_trip("IF not (not a) THEN BUY");
        round_trip("IF BTC-USDT and RSI_7 and VWAP_20 THEN BUY");
        round_trip("IF x ^ y THEN SELL");
        round_trip("IF flag THEN BUY");
    }

    #[test]
    fn classify_tokens() {
        assert_eq!(
            classify("MAX_DRAWDOWN_10"),
            Operand::MaxDrawdown(10.0)
        );
        assert_eq!(
            classify("STDDEV_20"),
            Operand::Indicator {
                indicator_type: IndicatorType::Stddev,
                period: 20
            }
        );
        assert_eq!(classify("rsi_14"), Operand::Asset("rsi_14".into()));
        assert_eq!(classify("ICHIMOKU_9"), Operand::Asset("ICHIMOKU_9".into()));
        assert_eq!(classify("RSI_0"), Operand::Asset("RSI_0".into()));
        assert_eq!(classify("BTC_USDT"), Operand::Asset("BTC_USDT".into()));
    }

    #[test]
    fn mixed_operators_need_parentheses() {
        let err = parse_line("IF a > b and c THEN BUY").unwrap_err();
        assert!(err.message.contains("cannot mix"), "{}", err.message);
        assert_eq!(err.position, 9);
    }

    #[test]
    fn missing_then() {
        let err = parse_line("IF a > b BUY").unwrap_err();
        assert!(err.message.contains("expected 'THEN'"), "{}", err.message);
        assert_eq!(err.position, 9);
    }

    #[test]
    fn unbalanced_parenthesis() {
        let err = parse_line("IF (a > b THEN BUY").unwrap_err();
        assert!(err.message.contains("expected ')'"), "{}", err.message);
    }

    #[test]
    fn bad_action() {
        let err = parse_line("IF a THEN HOLD").unwrap_err();
        assert!(err.message.contains("BUY"), "{}", err.message);
        assert_eq!(err.position, 10);
    }

    #[test]
    fn empty_condition() {
        let err = parse_line("IF THEN BUY").unwrap_err();
        assert!(err.message.contains("expected operand"), "{}", err.message);
        assert_eq!(err.position, 3);
    }

    #[test]
    fn dangling_operator() {
        let err = parse_line("IF a > THEN BUY").unwrap_err();
        assert!(err.message.contains("expected operand, found 'THEN'"), "{}", err.message);
    }

    #[test]
    fn trailing_input_rejected() {
        let err = parse_line("IF a THEN BUY now").unwrap_err();
        assert!(err.message.contains("trailing"), "{}", err.message);
        assert_eq!(err.position, 14);
    }

    #[test]
    fn keyword_needs_boundary() {
        assert!(parse_line("IFa THEN BUY").is_err());
        let rule = parse_line("IF nothing THEN BUY").unwrap();
        assert_eq!(rule.condition, Condition::Operand(Operand::Asset("nothing".into())));
    }

    #[test]
    fn multi_line_positions_are_absolute() {
        let text = "IF a THEN BUY\n\nIF b THEN HOLD\n";
        let err = parse(text).unwrap_err();
        assert_eq!(err.position, 15 + 10);

        let rules = parse("IF a THEN BUY\r\nIF b THEN SELL").unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].action, Side::Sell);
    }

    #[test]
    fn nesting_is_capped() {
        let nested = |n: usize| format!("IF {}a{} THEN BUY", "(".repeat(n), ")".repeat(n));

        let rule = parse_line(&nested(MAX_DEPTH_LIMIT)).unwrap();
        assert_eq!(rule.condition, Condition::Operand(Operand::Asset("a".into())));

        let err = parse_line(&nested(MAX_DEPTH_LIMIT + 1)).unwrap_err();
        assert_eq!(err.message, "nesting too deep");
        assert_eq!(err.position, 3 + MAX_DEPTH_LIMIT);

        let err = parse(&nested(100_000)).unwrap_err();
        assert_eq!(err.message, "nesting too deep");
    }

    #[test]
    fn empty_text_is_no_rules() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("  \n\n").unwrap().is_empty());
    }
}
