//! Daily Barsi ceiling price from a trailing 365-day dividend sum.

use super::fill::forward_fill;
use crate::valuation::BARSI_TARGET_YIELD;
use chrono::{Days, NaiveDate};

/// Trailing window length in calendar days.
pub const ROLLING_WINDOW_DAYS: u64 = 365;

/// Every calendar day from `start` to `end`, inclusive.
pub fn daily_calendar(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start.iter_days().take_while(|day| *day <= end).collect()
}

/// For each day `d` in `calendar`, the sum of event amounts dated in
/// `(d - 365 days, d]`. Events outside the calendar span are dropped.
///
/// Sums are taken directly over the events in each window rather than with a
/// running add/subtract, so a day whose window holds no events is exactly 0.
pub fn rolling_dividend_sum(calendar: &[NaiveDate], events: &[(NaiveDate, f64)]) -> Vec<f64> {
    let (Some(first), Some(last)) = (calendar.first(), calendar.last()) else {
        return Vec::new();
    };

    let mut in_span: Vec<(NaiveDate, f64)> = events
        .iter()
        .copied()
        .filter(|(date, _)| date >= first && date <= last)
        .collect();
    in_span.sort_by_key(|(date, _)| *date);

    calendar
        .iter()
        .map(|day| {
            let hi = in_span.partition_point(|(date, _)| date <= day);
            let lo = match day.checked_sub_days(Days::new(ROLLING_WINDOW_DAYS)) {
                Some(open_bound) => in_span.partition_point(|(date, _)| *date <= open_bound),
                None => 0,
            };
            in_span[lo..hi].iter().map(|(_, amount)| amount).sum()
        })
        .collect()
}

/// Ceiling price on each of `dates`: the trailing dividend sum over a daily
/// calendar spanning `[min(dates) - 365 days, max(dates)]`, carried onto
/// `dates`, divided by the 6% target yield.
pub fn barsi_indicator(dates: &[NaiveDate], events: &[(NaiveDate, f64)]) -> Vec<f64> {
    let (Some(min), Some(max)) = (dates.iter().min(), dates.iter().max()) else {
        return Vec::new();
    };
    let start = min
        .checked_sub_days(Days::new(ROLLING_WINDOW_DAYS))
        .unwrap_or(NaiveDate::MIN);

    let calendar = daily_calendar(start, *max);
    let rolling = rolling_dividend_sum(&calendar, events);
    let points: Vec<(NaiveDate, f64)> = calendar.into_iter().zip(rolling).collect();

    forward_fill(&points, dates)
        .into_iter()
        .map(|sum| sum.unwrap_or(0.0) / BARSI_TARGET_YIELD)
        .collect()
}
