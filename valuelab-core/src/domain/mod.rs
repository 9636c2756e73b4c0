//! Domain types for valuelab

pub mod record;
pub mod series;
pub mod ticker;

pub use record::{MarketSnapshot, Provenance, RawRecord, TickerRecord};
pub use series::{DividendEvent, FundamentalSnapshot, PriceSeries, Series, Timeline};
pub use ticker::{parse_requested, Ticker, TickerError};
