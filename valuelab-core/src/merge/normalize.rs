//! Bulk table normalization: header aliases and locale-aware numeric coercion.
//!
//! Coercion never fails loudly. A cell that doesn't parse becomes `None` and
//! is defaulted at the merge boundary like any other missing field.

use crate::domain::{Provenance, RawRecord, Ticker};
use crate::sources::RawTable;
use std::collections::BTreeMap;
use tracing::debug;

/// Canonical columns the merger understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Ticker,
    Price,
    PriceToEarnings,
    PriceToBook,
    DividendYield,
    ReturnOnEquity,
    CurrentLiquidity,
    EvToEbitda,
    Growth5y,
    Eps,
    BookValuePerShare,
}

/// Map a source header to its canonical field. Unknown headers yield `None`.
pub fn canonical_field(header: &str) -> Option<Field> {
    let key = header
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let field = match key.as_str() {
        "papel" | "ticker" => Field::Ticker,
        "cotação" | "cotacao" | "price" => Field::Price,
        "p/l" | "pl" | "pe" => Field::PriceToEarnings,
        "p/vp" | "pvp" | "pb" => Field::PriceToBook,
        "div.yield" | "div. yield" | "dy" | "dividend_yield" => Field::DividendYield,
        "roe" | "return_on_equity" => Field::ReturnOnEquity,
        "liq. corr." | "liq.corr." | "liqc" | "current_liquidity" => Field::CurrentLiquidity,
        "ev/ebitda" | "evebitda" | "ev_ebitda" => Field::EvToEbitda,
        "cresc. rec.5a" | "cresc. rec. 5a" | "c5y" | "cresc_rec_5a" | "growth_5y" => {
            Field::Growth5y
        }
        "lpa" | "eps" => Field::Eps,
        "vpa" | "bvps" => Field::BookValuePerShare,
        _ => return None,
    };
    Some(field)
}

/// Parse a possibly locale-formatted number.
///
/// - `"6,78%"` → `0.0678` (a trailing `%` divides by 100)
/// - `"1.234,56"` → `1234.56` (with a decimal comma, dots group thousands)
/// - `"12.5"` → `12.5`
/// - `""`, `"-"`, `"abc"`, `"NaN"` → `None`
pub fn coerce_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() || text == "-" {
        return None;
    }

    let (body, percent) = match text.strip_suffix('%') {
        Some(body) => (body.trim(), true),
        None => (text, false),
    };

    let mut cleaned: String = body
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    if cleaned.contains(',') {
        cleaned = cleaned.replace('.', "").replace(',', ".");
    }

    let value = cleaned.parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some(if percent { value / 100.0 } else { value })
}

/// Turn a bulk table into primary-provenance records keyed by ticker.
///
/// Rows without a canonical ticker are skipped; the first row of a duplicated
/// ticker wins.
pub fn table_to_records(table: &RawTable) -> BTreeMap<Ticker, RawRecord> {
    let columns: Vec<Option<Field>> = table.headers.iter().map(|h| canonical_field(h)).collect();
    let mut records = BTreeMap::new();

    let Some(ticker_col) = columns.iter().position(|c| *c == Some(Field::Ticker)) else {
        debug!(headers = ?table.headers, "bulk table has no ticker column");
        return records;
    };

    for row in &table.rows {
        let Some(cell) = row.get(ticker_col) else {
            continue;
        };
        let ticker = match Ticker::parse(cell) {
            Ok(t) => t,
            Err(e) => {
                debug!(error = %e, "skipping bulk row");
                continue;
            }
        };
        if records.contains_key(&ticker) {
            debug!(%ticker, "duplicate bulk row ignored");
            continue;
        }

        let mut record = RawRecord::empty(ticker.clone(), Provenance::Primary);
        for (field, cell) in columns.iter().zip(row) {
            let Some(field) = field else { continue };
            let value = coerce_number(cell);
            match field {
                Field::Ticker => {}
                Field::Price => record.price = value,
                Field::PriceToEarnings => record.price_to_earnings = value,
                Field::PriceToBook => record.price_to_book = value,
                Field::DividendYield => record.dividend_yield = value,
                Field::ReturnOnEquity => record.return_on_equity = value,
                Field::CurrentLiquidity => record.current_liquidity = value,
                Field::EvToEbitda => record.ev_to_ebitda = value,
                Field::Growth5y => record.growth_5y = value,
                Field::Eps => record.reported_eps = value,
                Field::BookValuePerShare => record.reported_book_value = value,
            }
        }
        records.insert(ticker, record);
    }

    records
}
