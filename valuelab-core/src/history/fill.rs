//! Causal forward-fill onto a target calendar.

use chrono::NaiveDate;

/// For every date in `calendar`, the value of the last point dated on or before
/// it. Dates before the first point get `None`.
///
/// `points` must be sorted by date; when several share a date the last one wins.
pub fn forward_fill(points: &[(NaiveDate, f64)], calendar: &[NaiveDate]) -> Vec<Option<f64>> {
    calendar
        .iter()
        .map(|day| {
            let idx = points.partition_point(|(date, _)| date <= day);
            idx.checked_sub(1).map(|i| points[i].1)
        })
        .collect()
}
