//! ValueLab Core — market data merge, valuation formulas and historical
//! indicator reconstruction for B3 equities.
//!
//! - Domain types (validated tickers, raw and defaulted records, time series)
//! - Source adapters behind traits, with a blocking HTTP fetcher, circuit
//!   breaker and injected response cache
//! - Bulk + per-ticker merge with per-ticker failure isolation
//! - Graham fair price and Barsi ceiling price
//! - Daily Graham/Barsi series aligned to a price calendar

pub mod config;
pub mod domain;
pub mod history;
pub mod merge;
pub mod sources;
pub mod valuation;

pub use config::{ConfigError, EngineConfig};
pub use domain::{MarketSnapshot, Ticker, TickerRecord};
pub use history::{align_indicators, HistoricalIndicators, HistoryService, IndicatorName};
pub use merge::{MarketDataMerger, ResolvedSnapshot};
pub use valuation::{analyze, compute_valuation, AnalysisRow, ValuationResult};
