//! Yahoo Finance adapters: per-ticker quote, price history, dividends and
//! quarterly fundamentals.
//!
//! Every ticker is requested with the configured exchange suffix (`PETR4` →
//! `PETR4.SA`). Yahoo has no official API and is subject to unannounced format
//! changes; parse failures surface as `ResponseFormatChanged` and the callers
//! degrade gracefully.
//!
//! The quote summary endpoint needs a session: a cookie from the consent host
//! plus a crumb fetched with that cookie and sent as a query parameter. The
//! crumb is kept for the lifetime of the source and renewed once on a 401.
//! When no session can be had, the quote falls back to the chart metadata,
//! which carries the live price and nothing else.

use super::http::HttpFetcher;
use super::provider::{
    DividendSource, FundamentalsSource, PriceHistorySource, QuoteInfo, QuoteSource, SourceError,
};
use crate::config::SourceSettings;
use crate::domain::{DividendEvent, FundamentalSnapshot, PriceSeries, Series, Ticker};
use crate::history::parse_zone;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use reqwest::Url;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

/// Yahoo wraps most numbers as `{"raw": 1.23, "fmt": "1.23"}` and sends `{}`
/// when it has nothing. `raw` is sometimes a string (`"Infinity"` for an
/// undefined P/E); anything that isn't a finite number reads as missing.
#[derive(Debug, Default, Deserialize)]
struct RawValue {
    #[serde(default)]
    raw: Option<serde_json::Value>,
}

fn raw(v: &Option<RawValue>) -> Option<f64> {
    v.as_ref()
        .and_then(|r| r.raw.as_ref())
        .and_then(serde_json::Value::as_f64)
        .filter(|x| x.is_finite())
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    #[serde(default)]
    meta: ChartMeta,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
    events: Option<ChartEvents>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    exchange_timezone_name: Option<String>,
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteBars>,
}

#[derive(Debug, Deserialize)]
struct QuoteBars {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ChartEvents {
    dividends: Option<HashMap<String, DividendData>>,
}

#[derive(Debug, Deserialize)]
struct DividendData {
    amount: f64,
    date: i64,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryResult,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResult {
    result: Option<Vec<QuoteModules>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteModules {
    price: Option<PriceModule>,
    summary_detail: Option<SummaryDetail>,
    default_key_statistics: Option<KeyStatistics>,
    financial_data: Option<FinancialData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    regular_market_price: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetail {
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<RawValue>,
    dividend_yield: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyStatistics {
    price_to_book: Option<RawValue>,
    trailing_eps: Option<RawValue>,
    book_value: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinancialData {
    current_price: Option<RawValue>,
    return_on_equity: Option<RawValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportedPoint {
    as_of_date: String,
    reported_value: Option<RawValue>,
}

const REFERER_URL: &str = "https://finance.yahoo.com/";

const QUOTE_MODULES: &str = "price,summaryDetail,defaultKeyStatistics,financialData";

const FUNDAMENTAL_TYPES: [&str; 4] = [
    "quarterlyBasicEPS",
    "quarterlyDilutedEPS",
    "quarterlyStockholdersEquity",
    "quarterlyOrdinarySharesNumber",
];

// ── Adapter ─────────────────────────────────────────────────────────

/// All four Yahoo endpoints behind one HTTP fetcher and one session.
pub struct YahooSource {
    http: Arc<HttpFetcher>,
    base_url: String,
    cookie_url: String,
    suffix: String,
    fundamentals_years: u32,
    crumb: Mutex<Option<String>>,
}

impl YahooSource {
    /// Create a source that sends every request through `http`. No request is
    /// made until the first fetch.
    pub fn new(http: Arc<HttpFetcher>, settings: &SourceSettings) -> Self {
        Self {
            http,
            base_url: settings.yahoo_base_url.trim_end_matches('/').to_string(),
            cookie_url: settings.yahoo_cookie_url.clone(),
            suffix: settings.exchange_suffix.clone(),
            fundamentals_years: settings.fundamentals_years,
            crumb: Mutex::new(None),
        }
    }

    fn symbol(&self, ticker: &Ticker) -> String {
        format!("{ticker}{}", self.suffix)
    }

    fn crumb_slot(&self) -> MutexGuard<'_, Option<String>> {
        self.crumb.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The session crumb, running the cookie + crumb handshake on first use.
    fn session_crumb(&self) -> Result<String, SourceError> {
        if let Some(crumb) = self.crumb_slot().clone() {
            return Ok(crumb);
        }
        self.http.prime_cookies(&self.cookie_url, REFERER_URL)?;
        let body = self
            .http
            .get_uncached(&format!("{}/v1/test/getcrumb", self.base_url))?;
        let crumb = parse_crumb(&body)?;
        debug!("yahoo session established");
        *self.crumb_slot() = Some(crumb.clone());
        Ok(crumb)
    }

    fn quote_summary(&self, symbol: &str, crumb: &str) -> Result<QuoteInfo, SourceError> {
        let body = self.http.get_text(&quote_url(&self.base_url, symbol, crumb)?)?;
        parse_quote_summary(symbol, &body)
    }

    /// Price-only quote from the chart metadata, which needs no session.
    fn chart_quote(&self, ticker: &Ticker, cause: &SourceError) -> Result<QuoteInfo, SourceError> {
        warn!(%ticker, error = %cause, "quote summary unavailable, using chart price only");
        let data = self.fetch_chart(ticker, "1d", "1d")?;
        quote_from_chart(&self.symbol(ticker), &data)
    }

    fn chart_url(&self, symbol: &str, range: &str, interval: &str) -> String {
        format!(
            "{}/v8/finance/chart/{symbol}?range={range}&interval={interval}&events=div",
            self.base_url
        )
    }

    /// Request window ends at today's midnight so the URL, and therefore the
    /// cache key, is stable within a day.
    fn fundamentals_url(&self, symbol: &str, today: NaiveDate) -> String {
        let end = today.and_time(NaiveTime::MIN).and_utc().timestamp();
        let start = end - i64::from(self.fundamentals_years) * 366 * 86_400;
        format!(
            "{}/ws/fundamentals-timeseries/v1/finance/timeseries/{symbol}\
             ?symbol={symbol}&type={}&period1={start}&period2={end}",
            self.base_url,
            FUNDAMENTAL_TYPES.join(",")
        )
    }

    fn fetch_chart(&self, ticker: &Ticker, range: &str, interval: &str) -> Result<ChartData, SourceError> {
        let symbol = self.symbol(ticker);
        let body = self.http.get_text(&self.chart_url(&symbol, range, interval))?;
        let resp: ChartResponse = serde_json::from_str(&body).map_err(|e| {
            SourceError::ResponseFormatChanged(format!("chart response for {symbol}: {e}"))
        })?;
        chart_data(&symbol, resp)
    }
}

impl QuoteSource for YahooSource {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch_quote(&self, ticker: &Ticker) -> Result<QuoteInfo, SourceError> {
        let symbol = self.symbol(ticker);
        debug!(%symbol, "fetching quote summary");

        let mut renewed = false;
        loop {
            let crumb = match self.session_crumb() {
                Ok(crumb) => crumb,
                Err(e) if is_session_failure(&e) => return self.chart_quote(ticker, &e),
                Err(e) => return Err(e),
            };
            match self.quote_summary(&symbol, &crumb) {
                Err(SourceError::Unauthorized(_)) if !renewed => {
                    debug!(%symbol, "crumb rejected, renewing session");
                    *self.crumb_slot() = None;
                    renewed = true;
                }
                Err(e @ SourceError::Unauthorized(_)) => return self.chart_quote(ticker, &e),
                other => return other,
            }
        }
    }
}

impl PriceHistorySource for YahooSource {
    fn fetch_prices(&self, ticker: &Ticker, range: &str) -> Result<PriceSeries, SourceError> {
        let data = self.fetch_chart(ticker, range, "1d")?;
        price_series(&self.symbol(ticker), &data)
    }
}

impl DividendSource for YahooSource {
    fn fetch_dividends(&self, ticker: &Ticker) -> Result<Series<DividendEvent>, SourceError> {
        let data = self.fetch_chart(ticker, "max", "1mo")?;
        dividend_series(&data)
    }
}

impl FundamentalsSource for YahooSource {
    fn fetch_fundamentals(
        &self,
        ticker: &Ticker,
    ) -> Result<Series<FundamentalSnapshot>, SourceError> {
        let symbol = self.symbol(ticker);
        let url = self.fundamentals_url(&symbol, Utc::now().date_naive());
        let body = self.http.get_text(&url)?;
        parse_fundamentals(&body)
    }
}

// ── Parsing ─────────────────────────────────────────────────────────

/// Errors meaning "no usable session", as opposed to the provider being down.
fn is_session_failure(err: &SourceError) -> bool {
    matches!(
        err,
        SourceError::Unauthorized(_) | SourceError::Http(_) | SourceError::ResponseFormatChanged(_)
    )
}

fn quote_url(base_url: &str, symbol: &str, crumb: &str) -> Result<String, SourceError> {
    let mut url = Url::parse(&format!("{base_url}/v10/finance/quoteSummary/{symbol}"))
        .map_err(|e| SourceError::Other(format!("invalid quote URL for {symbol}: {e}")))?;
    url.query_pairs_mut()
        .append_pair("modules", QUOTE_MODULES)
        .append_pair("crumb", crumb);
    Ok(url.to_string())
}

/// The getcrumb body is the bare crumb. Error pages come back as HTML or
/// prose with a 200, so anything with markup or whitespace is rejected.
fn parse_crumb(body: &str) -> Result<String, SourceError> {
    let crumb = body.trim();
    if crumb.is_empty() || crumb.len() >= 100 || crumb.contains(char::is_whitespace) || crumb.contains('<') {
        return Err(SourceError::ResponseFormatChanged(format!(
            "unexpected crumb response: {crumb:.40}"
        )));
    }
    Ok(crumb.to_string())
}

fn quote_from_chart(symbol: &str, data: &ChartData) -> Result<QuoteInfo, SourceError> {
    let price = data
        .meta
        .regular_market_price
        .filter(|p| p.is_finite() && *p > 0.0)
        .ok_or_else(|| SourceError::SymbolNotFound {
            symbol: symbol.to_string(),
        })?;
    Ok(QuoteInfo {
        regular_market_price: Some(price),
        ..Default::default()
    })
}

fn api_error(symbol: &str, err: Option<ApiError>, what: &str) -> SourceError {
    match err {
        Some(err) if err.code == "Not Found" => SourceError::SymbolNotFound {
            symbol: symbol.to_string(),
        },
        Some(err) => SourceError::ResponseFormatChanged(format!("{}: {}", err.code, err.description)),
        None => SourceError::ResponseFormatChanged(format!("empty {what} result with no error")),
    }
}

pub(crate) fn parse_quote_summary(symbol: &str, body: &str) -> Result<QuoteInfo, SourceError> {
    let resp: QuoteSummaryResponse = serde_json::from_str(body).map_err(|e| {
        SourceError::ResponseFormatChanged(format!("quote summary for {symbol}: {e}"))
    })?;
    let error = resp.quote_summary.error;
    let modules = resp
        .quote_summary
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| api_error(symbol, error, "quote summary"))?;

    let mut info = QuoteInfo::default();
    if let Some(price) = &modules.price {
        info.regular_market_price = raw(&price.regular_market_price);
    }
    if let Some(detail) = &modules.summary_detail {
        info.trailing_pe = raw(&detail.trailing_pe);
        info.dividend_yield = raw(&detail.dividend_yield);
    }
    if let Some(stats) = &modules.default_key_statistics {
        info.price_to_book = raw(&stats.price_to_book);
        info.trailing_eps = raw(&stats.trailing_eps);
        info.book_value = raw(&stats.book_value);
    }
    if let Some(fin) = &modules.financial_data {
        info.current_price = raw(&fin.current_price);
        info.return_on_equity = raw(&fin.return_on_equity);
    }
    Ok(info)
}

fn chart_data(symbol: &str, resp: ChartResponse) -> Result<ChartData, SourceError> {
    let error = resp.chart.error;
    resp.chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| api_error(symbol, error, "chart"))
}

fn exchange_zone(meta: &ChartMeta) -> Result<Tz, SourceError> {
    match meta.exchange_timezone_name.as_deref() {
        None => Ok(Tz::UTC),
        Some(name) => parse_zone(name).map_err(|e| SourceError::MalformedTimestamp(e.to_string())),
    }
}

fn instant(ts: i64) -> Result<DateTime<Utc>, SourceError> {
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| SourceError::MalformedTimestamp(format!("invalid epoch seconds: {ts}")))
}

fn price_series(symbol: &str, data: &ChartData) -> Result<PriceSeries, SourceError> {
    let tz = exchange_zone(&data.meta)?;
    let timestamps = data
        .timestamp
        .as_ref()
        .ok_or_else(|| SourceError::SymbolNotFound {
            symbol: symbol.to_string(),
        })?;
    let closes = &data
        .indicators
        .quote
        .first()
        .ok_or_else(|| SourceError::ResponseFormatChanged("no quote data".into()))?
        .close;

    let mut points = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        // Holidays come back as null closes.
        if let Some(close) = closes.get(i).copied().flatten().filter(|c| c.is_finite()) {
            points.push((instant(ts)?, close));
        }
    }

    if points.is_empty() {
        return Err(SourceError::SymbolNotFound {
            symbol: symbol.to_string(),
        });
    }
    Ok(Series::zoned(tz, points).sorted())
}

fn dividend_series(data: &ChartData) -> Result<Series<DividendEvent>, SourceError> {
    let tz = exchange_zone(&data.meta)?;
    let mut points = Vec::new();
    if let Some(dividends) = data.events.as_ref().and_then(|e| e.dividends.as_ref()) {
        for div in dividends.values() {
            if div.amount.is_finite() {
                points.push((instant(div.date)?, DividendEvent { amount: div.amount }));
            }
        }
    }
    Ok(Series::zoned(tz, points).sorted())
}

pub(crate) fn parse_fundamentals(body: &str) -> Result<Series<FundamentalSnapshot>, SourceError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| SourceError::ResponseFormatChanged(format!("fundamentals response: {e}")))?;
    let results = value
        .pointer("/timeseries/result")
        .and_then(|r| r.as_array())
        .ok_or_else(|| SourceError::ResponseFormatChanged("fundamentals: no result array".into()))?;

    let mut by_type: HashMap<&str, BTreeMap<NaiveDate, f64>> = HashMap::new();
    for result in results {
        let Some(kind) = result.pointer("/meta/type/0").and_then(|t| t.as_str()) else {
            continue;
        };
        let Some(kind) = FUNDAMENTAL_TYPES.iter().copied().find(|k| *k == kind) else {
            continue;
        };
        let Some(entries) = result.get(kind) else {
            continue;
        };
        let points: Vec<Option<ReportedPoint>> = serde_json::from_value(entries.clone())
            .map_err(|e| SourceError::ResponseFormatChanged(format!("fundamentals {kind}: {e}")))?;

        let column = by_type.entry(kind).or_default();
        for point in points.into_iter().flatten() {
            let date = NaiveDate::parse_from_str(point.as_of_date.trim(), "%Y-%m-%d").map_err(|e| {
                SourceError::MalformedTimestamp(format!(
                    "{kind} asOfDate '{}': {e}",
                    point.as_of_date
                ))
            })?;
            if let Some(v) = raw(&point.reported_value) {
                column.insert(date, v);
            }
        }
    }

    let eps = match by_type.get("quarterlyBasicEPS") {
        Some(basic) if !basic.is_empty() => Some(basic),
        _ => by_type.get("quarterlyDilutedEPS"),
    };

    let mut snapshots: BTreeMap<NaiveDate, FundamentalSnapshot> = BTreeMap::new();
    for (date, v) in eps.into_iter().flatten() {
        snapshots.entry(*date).or_default().eps = Some(*v);
    }
    for (date, v) in by_type.get("quarterlyStockholdersEquity").into_iter().flatten() {
        snapshots.entry(*date).or_default().equity = Some(*v);
    }
    for (date, v) in by_type.get("quarterlyOrdinarySharesNumber").into_iter().flatten() {
        snapshots.entry(*date).or_default().shares_outstanding = Some(*v);
    }

    Ok(Series::naive(
        snapshots
            .into_iter()
            .filter_map(|(date, snap)| date.and_hms_opt(0, 0, 0).map(|dt| (dt, snap)))
            .collect(),
    ))
}
