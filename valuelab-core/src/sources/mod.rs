//! Source adapters, HTTP plumbing and the response cache

pub mod circuit_breaker;
pub mod csv_bulk;
pub mod fundamentus;
pub mod http;
pub mod provider;
pub mod response_cache;
pub mod yahoo;

pub use circuit_breaker::CircuitBreaker;
pub use csv_bulk::CsvBulkSource;
pub use fundamentus::FundamentusSource;
pub use http::HttpFetcher;
pub use provider::{
    BulkSource, DividendSource, FundamentalsSource, PriceHistorySource, QuoteInfo, QuoteSource,
    RawTable, SourceError,
};
pub use response_cache::{DiskCache, DiskCacheStatus, MemoryCache, ResponseCache};
pub use yahoo::YahooSource;
