//! Per-ticker fundamentals rows and the merged market snapshot.

use super::ticker::Ticker;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which source produced a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// The bulk multi-ticker source.
    Primary,
    /// The per-ticker fallback source.
    Fallback,
}

/// A row as it comes out of an adapter, before the merge boundary.
///
/// Every numeric field is optional: sources disagree on schema and coercion of
/// locale-formatted text can fail. `into_record` is the one place where absence
/// becomes 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub ticker: Ticker,
    pub price: Option<f64>,
    pub price_to_earnings: Option<f64>,
    pub price_to_book: Option<f64>,
    /// Decimal fraction (0.08 for 8%).
    pub dividend_yield: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub current_liquidity: Option<f64>,
    pub ev_to_ebitda: Option<f64>,
    pub growth_5y: Option<f64>,
    pub reported_eps: Option<f64>,
    pub reported_book_value: Option<f64>,
    pub provenance: Provenance,
}

impl RawRecord {
    pub fn empty(ticker: Ticker, provenance: Provenance) -> Self {
        Self {
            ticker,
            price: None,
            price_to_earnings: None,
            price_to_book: None,
            dividend_yield: None,
            return_on_equity: None,
            current_liquidity: None,
            ev_to_ebitda: None,
            growth_5y: None,
            reported_eps: None,
            reported_book_value: None,
            provenance,
        }
    }

    /// Apply the merge-boundary defaulting rule: anything absent or non-finite is 0.
    pub fn into_record(self) -> TickerRecord {
        fn or_zero(v: Option<f64>) -> f64 {
            v.filter(|x| x.is_finite()).unwrap_or(0.0)
        }

        TickerRecord {
            ticker: self.ticker,
            price: or_zero(self.price),
            price_to_earnings: or_zero(self.price_to_earnings),
            price_to_book: or_zero(self.price_to_book),
            dividend_yield: or_zero(self.dividend_yield),
            return_on_equity: or_zero(self.return_on_equity),
            current_liquidity: or_zero(self.current_liquidity),
            ev_to_ebitda: or_zero(self.ev_to_ebitda),
            growth_5y: or_zero(self.growth_5y),
            reported_eps: or_zero(self.reported_eps),
            reported_book_value: or_zero(self.reported_book_value),
            provenance: self.provenance,
        }
    }
}

/// A fully defaulted row: past the merge boundary no field is ever missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerRecord {
    pub ticker: Ticker,
    pub price: f64,
    pub price_to_earnings: f64,
    pub price_to_book: f64,
    pub dividend_yield: f64,
    pub return_on_equity: f64,
    pub current_liquidity: f64,
    pub ev_to_ebitda: f64,
    pub growth_5y: f64,
    pub reported_eps: f64,
    pub reported_book_value: f64,
    pub provenance: Provenance,
}

/// Ticker → record, built fresh per request. Keys are unique by construction.
pub type MarketSnapshot = BTreeMap<Ticker, TickerRecord>;
