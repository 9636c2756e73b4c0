//! One rule for putting an auxiliary series on the price calendar's zone.
//!
//! | source  | target  | result                                             |
//! |---------|---------|----------------------------------------------------|
//! | naive   | aware   | wall-clock stamps localized in the target zone     |
//! | aware   | naive   | converted to UTC, then the zone is dropped         |
//! | aware   | aware   | same instants, displayed in the target zone        |
//! | naive   | naive   | unchanged                                          |
//!
//! Localization is where daylight saving bites. An ambiguous wall-clock time
//! (the repeated hour when clocks go back) resolves to its earliest instant. A
//! nonexistent one (the skipped hour when clocks go forward, which in some
//! zones is midnight) moves forward to the first valid hour of the same
//! calendar day. After conversion every join is by calendar date in the target
//! zone, so neither case can shift a point onto a neighbouring day.

use crate::domain::{Series, Timeline};
use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Timestamp problems in auxiliary data. These are reported alongside the
/// indicators, never turned into zeros.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlignmentError {
    #[error("unknown time zone '{0}'")]
    UnknownTimeZone(String),

    #[error("local time {local} does not exist in {zone}")]
    NonexistentLocalTime { local: NaiveDateTime, zone: String },

    #[error("unparseable timestamp in {series} data: {detail}")]
    UnparseableTimestamp { series: String, detail: String },
}

/// Parse an IANA zone name such as `America/Sao_Paulo`.
pub fn parse_zone(name: &str) -> Result<Tz, AlignmentError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| AlignmentError::UnknownTimeZone(name.to_string()))
}

/// Conform `timeline` to `target` (`None` means naive).
pub fn normalize_timezone(
    timeline: &Timeline,
    target: Option<Tz>,
) -> Result<Timeline, AlignmentError> {
    match (timeline, target) {
        (Timeline::Naive(_), None) => Ok(timeline.clone()),
        (Timeline::Naive(stamps), Some(tz)) => {
            let instants = stamps
                .iter()
                .map(|local| localize(tz, *local))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Timeline::Zoned { tz, instants })
        }
        (Timeline::Zoned { instants, .. }, None) => Ok(Timeline::Naive(
            instants.iter().map(|i| i.naive_utc()).collect(),
        )),
        (Timeline::Zoned { instants, .. }, Some(tz)) => Ok(Timeline::Zoned {
            tz,
            instants: instants.clone(),
        }),
    }
}

/// [`normalize_timezone`] applied to a whole series.
pub fn conform<T: Clone>(series: &Series<T>, target: Option<Tz>) -> Result<Series<T>, AlignmentError> {
    let timeline = normalize_timezone(series.timeline(), target)?;
    Ok(series.clone().with_timeline(timeline))
}

fn localize(tz: Tz, local: NaiveDateTime) -> Result<DateTime<Utc>, AlignmentError> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => {
            let mut probe = local;
            loop {
                probe += Duration::hours(1);
                if probe.date() != local.date() {
                    break;
                }
                if let Some(dt) = tz.from_local_datetime(&probe).earliest() {
                    return Ok(dt.with_timezone(&Utc));
                }
            }
            Err(AlignmentError::NonexistentLocalTime {
                local,
                zone: tz.name().to_string(),
            })
        }
    }
}
