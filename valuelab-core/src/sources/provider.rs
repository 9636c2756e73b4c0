//! Source adapter traits and structured error types.
//!
//! The traits abstract over the bulk screener, the per-ticker quote service and
//! the history endpoints so the merger and the history service can be driven by
//! stubs in tests. The response cache sits below these traits, inside the HTTP
//! fetcher; adapters don't know whether a body came from the network.

use crate::domain::{DividendEvent, FundamentalSnapshot, PriceSeries, Series, Ticker};
use thiserror::Error;

/// Structured error types for source operations.
///
/// None of these reach the caller of the merger: they degrade to an empty or
/// partial snapshot. The history service maps `MalformedTimestamp` to an
/// alignment failure and everything else to an empty indicator.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("malformed timestamp in source data: {0}")]
    MalformedTimestamp(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("source error: {0}")]
    Other(String),
}

/// A header row plus string cells, exactly as the bulk source presents them.
///
/// Header normalization and numeric coercion happen in `merge`, not here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Per-ticker quote fields. Everything is optional; the quote service omits
/// whatever it doesn't know (funds rarely report P/E, for instance).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteInfo {
    pub current_price: Option<f64>,
    pub regular_market_price: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub price_to_book: Option<f64>,
    /// Either a fraction (0.08) or a percentage (8.0); the merger decides.
    pub dividend_yield: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub trailing_eps: Option<f64>,
    pub book_value: Option<f64>,
}

impl QuoteInfo {
    /// Current price, falling back to the regular-session price.
    pub fn live_price(&self) -> Option<f64> {
        self.current_price
            .filter(|p| p.is_finite() && *p != 0.0)
            .or(self.regular_market_price)
            .filter(|p| p.is_finite() && *p != 0.0)
    }
}

/// Bulk multi-ticker screener.
pub trait BulkSource {
    fn name(&self) -> &str;

    fn fetch_table(&self) -> Result<RawTable, SourceError>;
}

/// Per-ticker fallback and live price source.
pub trait QuoteSource {
    fn name(&self) -> &str;

    fn fetch_quote(&self, ticker: &Ticker) -> Result<QuoteInfo, SourceError>;
}

/// Daily close history over a window such as `"5y"`.
pub trait PriceHistorySource {
    fn fetch_prices(&self, ticker: &Ticker, range: &str) -> Result<PriceSeries, SourceError>;
}

/// Quarterly EPS, equity and share count.
pub trait FundamentalsSource {
    fn fetch_fundamentals(
        &self,
        ticker: &Ticker,
    ) -> Result<Series<FundamentalSnapshot>, SourceError>;
}

/// Cash dividends per share.
pub trait DividendSource {
    fn fetch_dividends(&self, ticker: &Ticker) -> Result<Series<DividendEvent>, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_price_prefers_current_then_regular() {
        let q = QuoteInfo {
            current_price: Some(10.0),
            regular_market_price: Some(9.0),
            ..Default::default()
        };
        assert_eq!(q.live_price(), Some(10.0));

        let q = QuoteInfo {
            current_price: Some(0.0),
            regular_market_price: Some(9.0),
            ..Default::default()
        };
        assert_eq!(q.live_price(), Some(9.0));

        assert_eq!(QuoteInfo::default().live_price(), None);
    }
}
