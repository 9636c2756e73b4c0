//! Historical indicator alignment: quarterly fundamentals and dividends onto a
//! daily price calendar.
//!
//! The engine is a pure function of its three inputs. Each half (Graham,
//! Barsi) is computed independently: a half with no input data comes back
//! empty, and a half whose timestamps can't be conformed comes back empty with
//! the reason recorded in `failures`. Non-finite values are clamped to 0 once,
//! on the way out.

use super::barsi::barsi_indicator;
use super::graham::graham_indicator;
use super::timezone::{conform, AlignmentError};
use crate::domain::{DividendEvent, FundamentalSnapshot, PriceSeries, Series};
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorName {
    Graham,
    Barsi,
}

impl IndicatorName {
    pub const ALL: [IndicatorName; 2] = [IndicatorName::Graham, IndicatorName::Barsi];

    pub fn label(self) -> &'static str {
        match self {
            IndicatorName::Graham => "fair price (Graham)",
            IndicatorName::Barsi => "ceiling price (6%)",
        }
    }
}

impl fmt::Display for IndicatorName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for IndicatorName {
    type Err = String;

    /// Accepts the short name (`graham`, `barsi`) or the full label.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|name| {
                key == name.label().to_lowercase()
                    || key == format!("{name:?}").to_lowercase()
            })
            .ok_or_else(|| format!("unknown indicator '{s}' (expected graham or barsi)"))
    }
}

/// Indicator series aligned to a price calendar.
///
/// `graham` and `ceiling` are each either empty or exactly as long as `dates`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoricalIndicators {
    pub dates: Vec<NaiveDate>,
    pub prices: Vec<f64>,
    pub graham: Vec<f64>,
    pub ceiling: Vec<f64>,
    pub failures: Vec<AlignmentError>,
}

impl HistoricalIndicators {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn series(&self, name: IndicatorName) -> &[f64] {
        match name {
            IndicatorName::Graham => &self.graham,
            IndicatorName::Barsi => &self.ceiling,
        }
    }

    /// The named series, or `fallback` repeated over the calendar when that
    /// half is empty.
    pub fn series_or_constant(&self, name: IndicatorName, fallback: f64) -> Vec<f64> {
        let series = self.series(name);
        if series.is_empty() {
            let fallback = if fallback.is_finite() { fallback } else { 0.0 };
            vec![fallback; self.dates.len()]
        } else {
            series.to_vec()
        }
    }
}

/// Align fundamentals and dividends to the calendar of `prices`.
pub fn align_indicators(
    prices: &PriceSeries,
    fundamentals: &Series<FundamentalSnapshot>,
    dividends: &Series<DividendEvent>,
) -> HistoricalIndicators {
    if prices.is_empty() {
        return HistoricalIndicators::default();
    }

    let target = prices.timeline().zone();
    let dates = prices.timeline().local_dates();
    let mut failures = Vec::new();

    let graham = match graham_half(&dates, fundamentals, target) {
        Ok(values) => values,
        Err(e) => {
            failures.push(e);
            Vec::new()
        }
    };

    let ceiling = match barsi_half(&dates, dividends, target) {
        Ok(values) => values,
        Err(e) => {
            failures.push(e);
            Vec::new()
        }
    };

    HistoricalIndicators {
        prices: prices.values().to_vec(),
        dates,
        graham: sanitize(graham),
        ceiling: sanitize(ceiling),
        failures,
    }
}

fn graham_half(
    dates: &[NaiveDate],
    fundamentals: &Series<FundamentalSnapshot>,
    target: Option<Tz>,
) -> Result<Vec<f64>, AlignmentError> {
    if fundamentals.is_empty() {
        return Ok(Vec::new());
    }

    let conformed = conform(fundamentals, target)?.sorted();
    let mut eps = Vec::new();
    let mut bvps = Vec::new();
    for (date, snap) in conformed.dated() {
        if let Some(v) = snap.eps.filter(|v| !v.is_nan()) {
            eps.push((date, v));
        }
        if let Some(v) = snap.book_value_per_share().filter(|v| !v.is_nan()) {
            bvps.push((date, v));
        }
    }

    if eps.is_empty() || bvps.is_empty() {
        return Ok(Vec::new());
    }
    Ok(graham_indicator(dates, &eps, &bvps))
}

fn barsi_half(
    dates: &[NaiveDate],
    dividends: &Series<DividendEvent>,
    target: Option<Tz>,
) -> Result<Vec<f64>, AlignmentError> {
    if dividends.is_empty() {
        return Ok(Vec::new());
    }

    let conformed = conform(dividends, target)?;
    let events: Vec<(NaiveDate, f64)> = conformed
        .dated()
        .map(|(date, event)| (date, event.amount))
        .filter(|(_, amount)| !amount.is_nan())
        .collect();

    Ok(barsi_indicator(dates, &events))
}

/// Clamp NaN and ±∞ to 0.
pub fn sanitize(mut values: Vec<f64>) -> Vec<f64> {
    for v in values.iter_mut() {
        if !v.is_finite() {
            *v = 0.0;
        }
    }
    values
}
