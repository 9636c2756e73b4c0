//! Market data merger: bulk snapshot, per-ticker fallback, live price refresh.
//!
//! Nothing here returns an error. The bulk source failing degrades to an empty
//! base, a fallback failure drops that ticker (reported in `unresolved`), and a
//! refresh failure keeps the price already in the snapshot. Fallback and refresh
//! calls run one ticker at a time, so latency is linear in the ticker count.

use super::normalize::table_to_records;
use crate::domain::{parse_requested, MarketSnapshot, Provenance, RawRecord, Ticker};
use crate::sources::{BulkSource, QuoteInfo, QuoteSource};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Bulk rows before the merge boundary.
pub type BaseSnapshot = BTreeMap<Ticker, RawRecord>;

/// Result of a merge: the snapshot plus what couldn't be delivered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedSnapshot {
    pub snapshot: MarketSnapshot,
    /// Valid tickers that neither source could provide, in request order.
    pub unresolved: Vec<Ticker>,
    /// Requested codes that failed ticker validation and were never fetched.
    pub rejected: Vec<String>,
}

/// Builds a [`MarketSnapshot`] from a bulk source, falling back to a
/// per-ticker quote source for anything the bulk table lacks.
pub struct MarketDataMerger<'a> {
    bulk: &'a dyn BulkSource,
    quotes: &'a dyn QuoteSource,
}

impl<'a> MarketDataMerger<'a> {
    /// Merger over `bulk` (the primary table) and `quotes` (fallback rows and
    /// live prices).
    pub fn new(bulk: &'a dyn BulkSource, quotes: &'a dyn QuoteSource) -> Self {
        Self { bulk, quotes }
    }

    /// Fetch and normalize the bulk table. Unreachable or unparseable sources
    /// give an empty base.
    pub fn fetch_base(&self) -> BaseSnapshot {
        match self.bulk.fetch_table() {
            Ok(table) => {
                let records = table_to_records(&table);
                debug!(source = self.bulk.name(), rows = records.len(), "bulk snapshot loaded");
                records
            }
            Err(e) => {
                warn!(source = self.bulk.name(), error = %e, "bulk source unavailable, continuing with empty base");
                BaseSnapshot::new()
            }
        }
    }

    /// Fill requested tickers absent from `base` through the fallback source and
    /// apply the defaulting rule to every row.
    ///
    /// Base rows always win; the fallback only adds rows that are missing.
    pub fn resolve(&self, base: BaseSnapshot, requested: &[Ticker]) -> ResolvedSnapshot {
        let missing: Vec<&Ticker> = requested.iter().filter(|t| !base.contains_key(*t)).collect();

        let mut raw = base;
        let mut unresolved = Vec::new();

        if !missing.is_empty() {
            info!(
                source = self.quotes.name(),
                count = missing.len(),
                "fetching missing tickers from fallback"
            );
        }

        for ticker in missing {
            match self.quotes.fetch_quote(ticker) {
                Ok(quote) => {
                    debug!(%ticker, "resolved via fallback");
                    raw.insert(ticker.clone(), fallback_record(ticker.clone(), &quote));
                }
                Err(e) => {
                    warn!(%ticker, error = %e, "fallback failed, ticker omitted");
                    unresolved.push(ticker.clone());
                }
            }
        }

        ResolvedSnapshot {
            snapshot: raw
                .into_iter()
                .map(|(ticker, record)| (ticker, record.into_record()))
                .collect(),
            unresolved,
            rejected: Vec::new(),
        }
    }

    /// Overwrite the price of each requested ticker present in `snapshot` with a
    /// live quote. Failures leave the existing price untouched.
    pub fn refresh_prices(&self, snapshot: &mut MarketSnapshot, requested: &[Ticker]) {
        for ticker in requested {
            let Some(record) = snapshot.get_mut(ticker) else {
                continue;
            };
            match self.quotes.fetch_quote(ticker) {
                Ok(quote) => match quote.live_price() {
                    Some(price) => record.price = price,
                    None => debug!(%ticker, "no live price in quote, keeping snapshot price"),
                },
                Err(e) => debug!(%ticker, error = %e, "price refresh failed, keeping snapshot price"),
            }
        }
    }

    /// Full pipeline for a raw request list.
    ///
    /// An empty (or all-blank) request returns the whole bulk snapshot with no
    /// fallback or refresh calls.
    pub fn build<S: AsRef<str>>(&self, requested: &[S]) -> ResolvedSnapshot {
        let (tickers, rejected) = parse_requested(requested);
        for code in &rejected {
            warn!(code = %code, "rejected malformed ticker");
        }

        if tickers.is_empty() && !rejected.is_empty() {
            return ResolvedSnapshot {
                rejected,
                ..Default::default()
            };
        }

        let base = self.fetch_base();

        if tickers.is_empty() {
            return ResolvedSnapshot {
                snapshot: base
                    .into_iter()
                    .map(|(ticker, record)| (ticker, record.into_record()))
                    .collect(),
                ..Default::default()
            };
        }

        let mut resolved = self.resolve(base, &tickers);
        self.refresh_prices(&mut resolved.snapshot, &tickers);
        resolved.rejected = rejected;
        resolved
    }
}

/// Dividend yields above 1 are taken to be percentages.
pub fn normalize_yield(raw: f64) -> f64 {
    if raw.abs() > 1.0 {
        raw / 100.0
    } else {
        raw
    }
}

/// Map a per-ticker quote onto the record schema. Fields the quote service
/// doesn't publish (EV/EBITDA, 5y growth) are 0.
pub fn fallback_record(ticker: Ticker, quote: &QuoteInfo) -> RawRecord {
    let mut record = RawRecord::empty(ticker, Provenance::Fallback);
    record.price = quote.live_price();
    record.price_to_earnings = quote.trailing_pe;
    record.price_to_book = quote.price_to_book;
    record.dividend_yield = quote.dividend_yield.map(normalize_yield);
    record.return_on_equity = quote.return_on_equity;
    record.reported_eps = quote.trailing_eps;
    record.reported_book_value = quote.book_value;
    record.ev_to_ebitda = Some(0.0);
    record.growth_5y = Some(0.0);
    record
}
