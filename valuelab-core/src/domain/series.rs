//! Time-indexed series: price history, quarterly fundamentals, dividends.
//!
//! A series carries a single [`Timeline`] that is either naive (wall-clock
//! timestamps with no zone) or zoned (UTC instants plus the zone they are
//! displayed in). Mixing the two inside one series is unrepresentable; joining
//! two series with different timelines goes through
//! [`crate::history::normalize_timezone`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// The time axis of a series.
#[derive(Debug, Clone, PartialEq)]
pub enum Timeline {
    Naive(Vec<NaiveDateTime>),
    Zoned {
        tz: Tz,
        instants: Vec<DateTime<Utc>>,
    },
}

impl Timeline {
    /// Number of points on the axis.
    pub fn len(&self) -> usize {
        match self {
            Timeline::Naive(stamps) => stamps.len(),
            Timeline::Zoned { instants, .. } => instants.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The zone of an aware timeline, `None` for a naive one.
    pub fn zone(&self) -> Option<Tz> {
        match self {
            Timeline::Naive(_) => None,
            Timeline::Zoned { tz, .. } => Some(*tz),
        }
    }

    /// Calendar date of every point, as seen in the timeline's own zone.
    pub fn local_dates(&self) -> Vec<NaiveDate> {
        match self {
            Timeline::Naive(stamps) => stamps.iter().map(|s| s.date()).collect(),
            Timeline::Zoned { tz, instants } => instants
                .iter()
                .map(|i| i.with_timezone(tz).date_naive())
                .collect(),
        }
    }
}

/// Values paired one-to-one with a timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Series<T> {
    timeline: Timeline,
    values: Vec<T>,
}

impl<T> Series<T> {
    /// Build a series on a naive (zone-less) timeline.
    pub fn naive(points: Vec<(NaiveDateTime, T)>) -> Self {
        let (stamps, values) = points.into_iter().unzip();
        Self {
            timeline: Timeline::Naive(stamps),
            values,
        }
    }

    /// Build a series of instants that belong to `tz`.
    pub fn zoned(tz: Tz, points: Vec<(DateTime<Utc>, T)>) -> Self {
        let (instants, values) = points.into_iter().unzip();
        Self {
            timeline: Timeline::Zoned { tz, instants },
            values,
        }
    }

    pub fn empty() -> Self {
        Self {
            timeline: Timeline::Naive(Vec::new()),
            values: Vec::new(),
        }
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace the timeline, keeping values in place.
    ///
    /// Panics if the new timeline has a different length.
    pub fn with_timeline(self, timeline: Timeline) -> Self {
        assert_eq!(
            timeline.len(),
            self.values.len(),
            "timeline length must match value count"
        );
        Self {
            timeline,
            values: self.values,
        }
    }

    /// Pair each value with its calendar date in the series' own zone.
    pub fn dated(&self) -> impl Iterator<Item = (NaiveDate, &T)> {
        self.timeline.local_dates().into_iter().zip(self.values.iter())
    }

    /// Stable chronological sort of the points.
    pub fn sorted(self) -> Self {
        match self.timeline {
            Timeline::Naive(stamps) => {
                let mut points: Vec<_> = stamps.into_iter().zip(self.values).collect();
                points.sort_by_key(|(s, _)| *s);
                Self::naive(points)
            }
            Timeline::Zoned { tz, instants } => {
                let mut points: Vec<_> = instants.into_iter().zip(self.values).collect();
                points.sort_by_key(|(i, _)| *i);
                Self::zoned(tz, points)
            }
        }
    }
}

/// Daily closes, ascending. Its timeline defines the output calendar of every
/// derived indicator series.
pub type PriceSeries = Series<f64>;

/// One quarterly fundamentals report. Fields are optional because EPS and the
/// balance sheet come from different statements with their own report dates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    pub eps: Option<f64>,
    pub equity: Option<f64>,
    pub shares_outstanding: Option<f64>,
}

impl FundamentalSnapshot {
    /// Equity divided by shares outstanding. Zero shares yields an infinite
    /// value, which alignment clamps at its output boundary.
    pub fn book_value_per_share(&self) -> Option<f64> {
        match (self.equity, self.shares_outstanding) {
            (Some(equity), Some(shares)) => Some(equity / shares),
            _ => None,
        }
    }
}

/// A cash dividend, per share.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DividendEvent {
    pub amount: f64,
}
