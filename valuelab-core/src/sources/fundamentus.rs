//! Fundamentus screener: the bulk source for listed stocks.
//!
//! The screener publishes every listed company in one HTML table. This adapter
//! only lifts the table into header and cell strings; the page uses Brazilian
//! number formatting ("1.234,56", "6,78%") which `merge::normalize` coerces.

use super::http::HttpFetcher;
use super::provider::{BulkSource, RawTable, SourceError};
use regex::Regex;
use std::sync::{Arc, OnceLock};

struct TablePatterns {
    results_table: Regex,
    any_table: Regex,
    row: Regex,
    cell: Regex,
    tag: Regex,
    numeric_entity: Regex,
}

fn patterns() -> &'static TablePatterns {
    static PATTERNS: OnceLock<TablePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| TablePatterns {
        results_table: Regex::new(r#"(?is)<table[^>]*id\s*=\s*["']resultado["'][^>]*>(.*?)</table>"#)
            .expect("static pattern"),
        any_table: Regex::new(r"(?is)<table[^>]*>(.*?)</table>").expect("static pattern"),
        row: Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("static pattern"),
        cell: Regex::new(r"(?is)<t([hd])[^>]*>(.*?)</t[hd]>").expect("static pattern"),
        tag: Regex::new(r"(?s)<[^>]*>").expect("static pattern"),
        numeric_entity: Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("static pattern"),
    })
}

/// Bulk screener over the Fundamentus results page.
pub struct FundamentusSource {
    http: Arc<HttpFetcher>,
    url: String,
}

impl FundamentusSource {
    /// Source reading the results page at `url`.
    pub fn new(http: Arc<HttpFetcher>, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

impl BulkSource for FundamentusSource {
    fn name(&self) -> &str {
        "fundamentus"
    }

    fn fetch_table(&self) -> Result<RawTable, SourceError> {
        let html = self.http.get_text(&self.url)?;
        parse_results_table(&html)
    }
}

/// Extract the screener table (`id="resultado"`, or the first table on the page).
pub fn parse_results_table(html: &str) -> Result<RawTable, SourceError> {
    let p = patterns();
    let body = p
        .results_table
        .captures(html)
        .or_else(|| p.any_table.captures(html))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| SourceError::ResponseFormatChanged("no results table in page".into()))?;

    let mut table = RawTable::default();

    for row in p.row.captures_iter(body) {
        let row_html = row.get(1).map_or("", |m| m.as_str());
        let mut is_header = false;
        let mut cells = Vec::new();
        for cell in p.cell.captures_iter(row_html) {
            is_header |= cell.get(1).is_some_and(|m| m.as_str().eq_ignore_ascii_case("h"));
            cells.push(cell_text(cell.get(2).map_or("", |m| m.as_str())));
        }
        if cells.is_empty() {
            continue;
        }
        if is_header && table.headers.is_empty() {
            table.headers = cells;
        } else if !is_header {
            table.rows.push(cells);
        }
    }

    if table.headers.is_empty() {
        return Err(SourceError::ResponseFormatChanged(
            "results table has no header row".into(),
        ));
    }
    Ok(table)
}

fn cell_text(html: &str) -> String {
    let p = patterns();
    let stripped = p.tag.replace_all(html, "");
    let decoded = p.numeric_entity.replace_all(&stripped, |caps: &regex::Captures| {
        let code = &caps[1];
        let value = match code.strip_prefix('x').or_else(|| code.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse::<u32>().ok(),
        };
        value
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    decoded
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}
