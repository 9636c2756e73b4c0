//! Bulk + per-ticker market data merge

pub mod merger;
pub mod normalize;

pub use merger::{fallback_record, normalize_yield, BaseSnapshot, MarketDataMerger, ResolvedSnapshot};
pub use normalize::{canonical_field, coerce_number, table_to_records, Field};
