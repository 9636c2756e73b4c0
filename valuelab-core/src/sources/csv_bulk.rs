//! Bulk source backed by a spreadsheet export on disk.
//!
//! Brazilian exports are usually `;`-delimited because `,` is the decimal
//! separator; the delimiter is sniffed from the header line.

use super::provider::{BulkSource, RawTable, SourceError};
use std::path::PathBuf;

/// Bulk source reading a local export, re-read on every fetch.
pub struct CsvBulkSource {
    path: PathBuf,
}

impl CsvBulkSource {
    /// Source over the file at `path`. The file isn't touched until a fetch.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl BulkSource for CsvBulkSource {
    fn name(&self) -> &str {
        "csv_export"
    }

    fn fetch_table(&self) -> Result<RawTable, SourceError> {
        let content = std::fs::read_to_string(&self.path)?;
        parse_csv_table(&content)
    }
}

/// Read a headed CSV document into a [`RawTable`].
pub fn parse_csv_table(content: &str) -> Result<RawTable, SourceError> {
    let header_line = content.lines().next().unwrap_or_default();
    let delimiter = if header_line.matches(';').count() > header_line.matches(',').count() {
        b';'
    } else {
        b','
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| SourceError::ResponseFormatChanged(format!("csv header: {e}")))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| SourceError::ResponseFormatChanged(format!("csv row: {e}")))?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RawTable { headers, rows })
}
