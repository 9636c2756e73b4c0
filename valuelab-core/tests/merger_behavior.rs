//! Merger behavior against stub sources: fallback resolution, failure
//! isolation, price refresh and degradation when the bulk source is down.

use std::cell::RefCell;
use std::collections::HashMap;
use valuelab_core::domain::{Provenance, Ticker};
use valuelab_core::merge::MarketDataMerger;
use valuelab_core::sources::{BulkSource, CsvBulkSource, QuoteInfo, QuoteSource, RawTable, SourceError};

// ── Stubs ────────────────────────────────────────────────────────────

struct StubBulk {
    table: Option<RawTable>,
}

impl StubBulk {
    fn with_rows(rows: &[[&str; 8]]) -> Self {
        let headers = [
            "Papel", "Cotação", "P/L", "P/VP", "Div.Yield", "ROE", "EV/EBITDA", "Cresc. Rec.5a",
        ];
        Self {
            table: Some(RawTable {
                headers: headers.iter().map(|s| s.to_string()).collect(),
                rows: rows
                    .iter()
                    .map(|r| r.iter().map(|s| s.to_string()).collect())
                    .collect(),
            }),
        }
    }

    fn unreachable() -> Self {
        Self { table: None }
    }
}

impl BulkSource for StubBulk {
    fn name(&self) -> &str {
        "stub_bulk"
    }

    fn fetch_table(&self) -> Result<RawTable, SourceError> {
        self.table
            .clone()
            .ok_or_else(|| SourceError::NetworkUnreachable("stub offline".into()))
    }
}

#[derive(Default)]
struct StubQuotes {
    quotes: HashMap<String, QuoteInfo>,
    calls: RefCell<Vec<String>>,
}

impl StubQuotes {
    fn with(mut self, code: &str, quote: QuoteInfo) -> Self {
        self.quotes.insert(code.to_string(), quote);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl QuoteSource for StubQuotes {
    fn name(&self) -> &str {
        "stub_quotes"
    }

    fn fetch_quote(&self, ticker: &Ticker) -> Result<QuoteInfo, SourceError> {
        self.calls.borrow_mut().push(ticker.to_string());
        self.quotes
            .get(ticker.as_str())
            .cloned()
            .ok_or_else(|| SourceError::SymbolNotFound {
                symbol: format!("{ticker}.SA"),
            })
    }
}

fn t(code: &str) -> Ticker {
    Ticker::parse(code).unwrap()
}

fn petr4_row() -> [&'static str; 8] {
    ["PETR4", "38,50", "4,12", "1,05", "12,34%", "25,10%", "3,20", "15,00%"]
}

fn visc11_quote() -> QuoteInfo {
    QuoteInfo {
        current_price: Some(118.4),
        regular_market_price: Some(118.0),
        price_to_book: Some(0.95),
        dividend_yield: Some(9.8),
        ..Default::default()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[test]
fn missing_ticker_is_resolved_through_fallback() {
    let bulk = StubBulk::with_rows(&[petr4_row()]);
    let quotes = StubQuotes::default().with("VISC11", visc11_quote());
    let merger = MarketDataMerger::new(&bulk, &quotes);

    let resolved = merger.build(&["PETR4", "VISC11"]);
    let snapshot = &resolved.snapshot;

    assert_eq!(snapshot.len(), 2);
    assert!(resolved.unresolved.is_empty());
    assert!(resolved.rejected.is_empty());

    let petr = &snapshot[&t("PETR4")];
    assert_eq!(petr.provenance, Provenance::Primary);
    assert_eq!(petr.price, 38.5);
    assert_eq!(petr.price_to_earnings, 4.12);
    assert!((petr.dividend_yield - 0.1234).abs() < 1e-12);
    assert_eq!(petr.ev_to_ebitda, 3.2);

    let visc = &snapshot[&t("VISC11")];
    assert_eq!(visc.provenance, Provenance::Fallback);
    assert_eq!(visc.price, 118.4);
    assert!((visc.dividend_yield - 0.098).abs() < 1e-12);
    assert_eq!(visc.ev_to_ebitda, 0.0);
    assert_eq!(visc.growth_5y, 0.0);
    assert_eq!(visc.price_to_earnings, 0.0);
}

#[test]
fn fallback_never_overwrites_a_primary_row() {
    let bulk = StubBulk::with_rows(&[petr4_row()]);
    let quotes = StubQuotes::default();
    let merger = MarketDataMerger::new(&bulk, &quotes);

    let base = merger.fetch_base();
    let resolved = merger.resolve(base, &[t("PETR4")]);

    assert!(quotes.calls().is_empty());
    assert_eq!(resolved.snapshot[&t("PETR4")].provenance, Provenance::Primary);
}

#[test]
fn one_failing_fallback_does_not_block_the_others() {
    let bulk = StubBulk::with_rows(&[petr4_row()]);
    let quotes = StubQuotes::default().with("VISC11", visc11_quote());
    let merger = MarketDataMerger::new(&bulk, &quotes);

    let base = merger.fetch_base();
    let resolved = merger.resolve(base, &[t("XXXX3"), t("VISC11"), t("PETR4")]);

    assert_eq!(resolved.snapshot.len(), 2);
    assert!(resolved.snapshot.contains_key(&t("VISC11")));
    assert_eq!(resolved.unresolved, vec![t("XXXX3")]);
}

#[test]
fn bulk_outage_degrades_to_fallback_only() {
    let bulk = StubBulk::unreachable();
    let quotes = StubQuotes::default().with("VISC11", visc11_quote());
    let merger = MarketDataMerger::new(&bulk, &quotes);

    assert!(merger.fetch_base().is_empty());

    let resolved = merger.build(&["PETR4", "VISC11"]);
    assert_eq!(resolved.snapshot.len(), 1);
    assert_eq!(resolved.unresolved, vec![t("PETR4")]);
}

#[test]
fn refresh_overwrites_price_only_on_success() {
    let bulk = StubBulk::with_rows(&[petr4_row(), ["VALE3", "61,20", "6,00", "1,10", "8,00%", "", "", ""]]);
    let quotes = StubQuotes::default().with(
        "PETR4",
        QuoteInfo {
            current_price: None,
            regular_market_price: Some(39.9),
            trailing_pe: Some(99.0),
            ..Default::default()
        },
    );
    let merger = MarketDataMerger::new(&bulk, &quotes);

    let resolved = merger.build(&["petr4", "VALE3"]);
    let snapshot = resolved.snapshot;

    let petr = &snapshot[&t("PETR4")];
    assert_eq!(petr.price, 39.9);
    // Only the price moves.
    assert_eq!(petr.price_to_earnings, 4.12);

    // VALE3 refresh failed: price kept.
    assert_eq!(snapshot[&t("VALE3")].price, 61.2);
    assert_eq!(snapshot[&t("VALE3")].return_on_equity, 0.0);

    assert_eq!(quotes.calls(), vec!["PETR4".to_string(), "VALE3".to_string()]);
}

#[test]
fn malformed_tickers_are_rejected_before_any_fetch() {
    let bulk = StubBulk::with_rows(&[petr4_row()]);
    let quotes = StubQuotes::default();
    let merger = MarketDataMerger::new(&bulk, &quotes);

    let resolved = merger.build(&["PETR4", "PETR", "12345", "  "]);
    assert_eq!(resolved.rejected, vec!["PETR".to_string(), "12345".to_string()]);
    assert_eq!(quotes.calls(), vec!["PETR4".to_string()]);
}

#[test]
fn only_malformed_tickers_give_an_empty_snapshot() {
    let bulk = StubBulk::with_rows(&[petr4_row()]);
    let quotes = StubQuotes::default();
    let merger = MarketDataMerger::new(&bulk, &quotes);

    let resolved = merger.build(&["PETR"]);
    assert!(resolved.snapshot.is_empty());
    assert_eq!(resolved.rejected, vec!["PETR".to_string()]);
    assert!(quotes.calls().is_empty());
}

#[test]
fn empty_request_returns_full_base_without_quote_calls() {
    let bulk = StubBulk::with_rows(&[
        petr4_row(),
        ["VALE3", "61,20", "6,00", "1,10", "8,00%", "", "", ""],
    ]);
    let quotes = StubQuotes::default();
    let merger = MarketDataMerger::new(&bulk, &quotes);

    let resolved = merger.build::<&str>(&[]);
    assert_eq!(resolved.snapshot.len(), 2);
    assert!(quotes.calls().is_empty());
}

#[test]
fn csv_export_feeds_the_merger() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resultado.csv");
    std::fs::write(
        &path,
        "papel;cotacao;pl;pvp;dy\nTAEE11;35,10;7,5;1,9;9,50%\nBBAS3;1.027,00;4,0;0,8;10,00%\n",
    )
    .unwrap();

    let bulk = CsvBulkSource::new(&path);
    let quotes = StubQuotes::default();
    let merger = MarketDataMerger::new(&bulk, &quotes);

    let base = merger.fetch_base();
    assert_eq!(base.len(), 2);
    assert_eq!(base[&t("BBAS3")].price, Some(1027.0));
    assert_eq!(base[&t("TAEE11")].dividend_yield, Some(0.095));
}
