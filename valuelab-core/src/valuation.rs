//! Graham fair price and Barsi ceiling price from a point-in-time record.
//!
//! `compute_valuation` is pure and total: every division is guarded, the
//! square root only ever sees a positive operand, and identical inputs always
//! give identical output.

use crate::domain::{MarketSnapshot, Ticker, TickerRecord};
use serde::{Deserialize, Serialize};

/// Graham's constant: 15 (max P/E) × 1.5 (max P/B).
pub const GRAHAM_MULTIPLIER: f64 = 22.5;

/// Target trailing dividend yield for the Barsi ceiling price.
pub const BARSI_TARGET_YIELD: f64 = 0.06;

/// Derived valuation metrics for one ticker. Margins are percentages.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ValuationResult {
    pub graham_price: f64,
    pub graham_margin: f64,
    pub ceiling_price: f64,
    pub ceiling_margin: f64,
    pub eps: f64,
    pub book_value_per_share: f64,
}

/// Graham fair price and Barsi ceiling price from a quote's multiples.
///
/// EPS and book value per share are backed out of P/E and P/B; a zero
/// multiple gives zero. Never fails.
pub fn compute_valuation(
    price: f64,
    price_to_earnings: f64,
    price_to_book: f64,
    dividend_yield: f64,
) -> ValuationResult {
    let eps = if price_to_earnings != 0.0 {
        price / price_to_earnings
    } else {
        0.0
    };
    let book_value_per_share = if price_to_book != 0.0 {
        price / price_to_book
    } else {
        0.0
    };

    let (graham_price, graham_margin) = if eps > 0.0 && book_value_per_share > 0.0 {
        let fair = (GRAHAM_MULTIPLIER * book_value_per_share * eps).sqrt();
        (fair, margin(fair, price))
    } else {
        (0.0, 0.0)
    };

    let estimated_dividends = dividend_yield * price;
    let ceiling_price = estimated_dividends / BARSI_TARGET_YIELD;

    ValuationResult {
        graham_price,
        graham_margin,
        ceiling_price,
        ceiling_margin: margin(ceiling_price, price),
        eps,
        book_value_per_share,
    }
}

fn margin(target: f64, price: f64) -> f64 {
    if price > 0.0 {
        (target / price - 1.0) * 100.0
    } else {
        0.0
    }
}

impl ValuationResult {
    pub fn from_record(record: &TickerRecord) -> Self {
        compute_valuation(
            record.price,
            record.price_to_earnings,
            record.price_to_book,
            record.dividend_yield,
        )
    }
}

/// A snapshot row with its valuation attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRow {
    #[serde(flatten)]
    pub record: TickerRecord,
    #[serde(flatten)]
    pub valuation: ValuationResult,
}

/// Value every row of `snapshot`, or only the `requested` ones when the list is
/// non-empty. Output follows snapshot (ticker) order.
pub fn analyze(snapshot: &MarketSnapshot, requested: &[Ticker]) -> Vec<AnalysisRow> {
    snapshot
        .values()
        .filter(|record| requested.is_empty() || requested.contains(&record.ticker))
        .map(|record| {
            let valuation = sanitized(ValuationResult::from_record(record));
            AnalysisRow {
                record: record.clone(),
                valuation,
            }
        })
        .collect()
}

fn sanitized(v: ValuationResult) -> ValuationResult {
    fn finite(x: f64) -> f64 {
        if x.is_finite() {
            x
        } else {
            0.0
        }
    }
    ValuationResult {
        graham_price: finite(v.graham_price),
        graham_margin: finite(v.graham_margin),
        ceiling_price: finite(v.ceiling_price),
        ceiling_margin: finite(v.ceiling_margin),
        eps: finite(v.eps),
        book_value_per_share: finite(v.book_value_per_share),
    }
}
