//! Historical indicator reconstruction

pub mod barsi;
pub mod engine;
pub mod fill;
pub mod graham;
pub mod service;
pub mod timezone;

pub use barsi::{barsi_indicator, daily_calendar, rolling_dividend_sum, ROLLING_WINDOW_DAYS};
pub use engine::{align_indicators, sanitize, HistoricalIndicators, IndicatorName};
pub use fill::forward_fill;
pub use graham::{graham_indicator, graham_value};
pub use service::HistoryService;
pub use timezone::{conform, normalize_timezone, parse_zone, AlignmentError};
