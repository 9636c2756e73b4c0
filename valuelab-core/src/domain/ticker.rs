//! Ticker — canonical B3 instrument code.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

fn canonical_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Z]{4}[0-9]{1,2}$").expect("static ticker pattern"))
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TickerError {
    #[error("malformed ticker '{0}': expected 4 letters followed by 1-2 digits (e.g. PETR4)")]
    Malformed(String),
}

/// A validated ticker code: four uppercase letters followed by one or two digits.
///
/// Construction trims and upper-cases the input, so `" petr4 "` parses as `PETR4`.
/// Anything else is rejected before it can reach an adapter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    pub fn parse(raw: &str) -> Result<Self, TickerError> {
        let code = raw.trim().to_uppercase();
        if canonical_pattern().is_match(&code) {
            Ok(Self(code))
        } else {
            Err(TickerError::Malformed(raw.trim().to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Ticker {
    type Error = TickerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Ticker> for String {
    fn from(t: Ticker) -> Self {
        t.0
    }
}

/// Split raw requested codes into valid tickers and rejected inputs.
///
/// Valid tickers keep request order with duplicates removed. Blank entries are
/// dropped silently; everything else that fails validation is returned as rejected.
pub fn parse_requested<S: AsRef<str>>(raw: &[S]) -> (Vec<Ticker>, Vec<String>) {
    let mut valid: Vec<Ticker> = Vec::with_capacity(raw.len());
    let mut rejected = Vec::new();
    for item in raw {
        let item = item.as_ref();
        if item.trim().is_empty() {
            continue;
        }
        match Ticker::parse(item) {
            Ok(t) => {
                if !valid.contains(&t) {
                    valid.push(t);
                }
            }
            Err(TickerError::Malformed(code)) => rejected.push(code),
        }
    }
    (valid, rejected)
}
