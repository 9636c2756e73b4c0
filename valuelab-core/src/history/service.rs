//! Adapter-driven history loading.

use super::engine::{align_indicators, HistoricalIndicators};
use super::timezone::AlignmentError;
use crate::domain::{Series, Ticker};
use crate::sources::{DividendSource, FundamentalsSource, PriceHistorySource, SourceError};
use tracing::{debug, warn};

/// Fetches the three inputs for a ticker and runs [`align_indicators`].
pub struct HistoryService<'a> {
    prices: &'a dyn PriceHistorySource,
    fundamentals: &'a dyn FundamentalsSource,
    dividends: &'a dyn DividendSource,
    range: String,
}

impl<'a> HistoryService<'a> {
    pub fn new(
        prices: &'a dyn PriceHistorySource,
        fundamentals: &'a dyn FundamentalsSource,
        dividends: &'a dyn DividendSource,
        range: impl Into<String>,
    ) -> Self {
        Self {
            prices,
            fundamentals,
            dividends,
            range: range.into(),
        }
    }

    /// Without a price history there is no calendar, so the result is empty.
    /// Unavailable fundamentals or dividends leave that half empty; malformed
    /// timestamps are also recorded in `failures`.
    pub fn load(&self, ticker: &Ticker) -> HistoricalIndicators {
        let prices = match self.prices.fetch_prices(ticker, &self.range) {
            Ok(prices) => prices,
            Err(e) => {
                warn!(%ticker, error = %e, "no price history");
                return HistoricalIndicators::default();
            }
        };
        debug!(%ticker, bars = prices.len(), "price history loaded");

        let mut failures = Vec::new();
        let fundamentals = half_or_empty(
            ticker,
            "fundamentals",
            self.fundamentals.fetch_fundamentals(ticker),
            &mut failures,
        );
        let dividends = half_or_empty(
            ticker,
            "dividends",
            self.dividends.fetch_dividends(ticker),
            &mut failures,
        );

        let mut result = align_indicators(&prices, &fundamentals, &dividends);
        failures.append(&mut result.failures);
        result.failures = failures;
        result
    }
}

fn half_or_empty<T>(
    ticker: &Ticker,
    kind: &str,
    fetched: Result<Series<T>, SourceError>,
    failures: &mut Vec<AlignmentError>,
) -> Series<T> {
    match fetched {
        Ok(series) => series,
        Err(SourceError::MalformedTimestamp(detail)) => {
            warn!(%ticker, kind, %detail, "malformed timestamp in source data");
            failures.push(AlignmentError::UnparseableTimestamp {
                series: kind.to_string(),
                detail,
            });
            Series::empty()
        }
        Err(e) => {
            warn!(%ticker, kind, error = %e, "source unavailable, indicator left empty");
            Series::empty()
        }
    }
}
