//! Configuration access port trait.
//!
//! Implementors provide raw string lookup; the typed getters parse on top of
//! it and treat a present but unparsable value as `ConfigInvalid` rather than
//! silently falling back.

use crate::domain::error::StratflowError;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    fn get_int(&self, section: &str, key: &str) -> Result<Option<i64>, StratflowError> {
        parse_value(self.get_string(section, key), section, key, "an integer", |s| {
            s.parse::<i64>().ok()
        })
    }

    fn get_double(&self, section: &str, key: &str) -> Result<Option<f64>, StratflowError> {
        parse_value(self.get_string(section, key), section, key, "a number", |s| {
            s.parse::<f64>().ok().filter(|v| v.is_finite())
        })
    }

    fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>, StratflowError> {
        parse_value(self.get_string(section, key), section, key, "true or false", |s| {
            match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            }
        })
    }
}

/// Blank values count as unset.
fn parse_value<T>(
    raw: Option<String>,
    section: &str,
    key: &str,
    expected: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, StratflowError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    parse(trimmed)
        .map(Some)
        .ok_or_else(|| StratflowError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: format!("expected {}, found '{}'", expected, trimmed),
        })
}
