//! ValueLab CLI — valuation table, indicator history and cache management.
//!
//! Commands:
//! - `analyze` — merge bulk + per-ticker data and print Graham/Barsi valuations
//! - `history` — daily Graham and ceiling-price series aligned to 5y of closes
//! - `cache status` — report the on-disk response cache
//! - `cache clear` — remove cached responses
//! - `config show` — print the effective configuration as TOML

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use valuelab_core::domain::{parse_requested, Ticker};
use valuelab_core::history::{HistoricalIndicators, HistoryService, IndicatorName};
use valuelab_core::merge::MarketDataMerger;
use valuelab_core::sources::{
    BulkSource, CsvBulkSource, DiskCache, FundamentusSource, HttpFetcher, ResponseCache,
    YahooSource,
};
use valuelab_core::valuation::{analyze, AnalysisRow};
use valuelab_core::EngineConfig;

#[derive(Parser)]
#[command(
    name = "valuelab",
    about = "ValueLab CLI — Graham and Barsi valuation for B3 equities"
)]
struct Cli {
    /// Path to a TOML config file. Defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (overridden by RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print valuations for the given tickers (all screener rows when none given).
    Analyze {
        /// Tickers (e.g., PETR4 VALE3 VISC11).
        tickers: Vec<String>,

        /// Read the bulk table from a CSV export instead of the screener.
        #[arg(long)]
        bulk_csv: Option<PathBuf>,

        /// Print JSON records instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Bypass the on-disk response cache.
        #[arg(long, default_value_t = false)]
        no_cache: bool,
    },
    /// Reconstruct daily indicator series for one ticker.
    History {
        ticker: String,

        /// graham or barsi. Both when omitted.
        #[arg(long)]
        indicator: Option<String>,

        /// Constant used when an indicator cannot be reconstructed.
        #[arg(long, default_value_t = 0.0)]
        fallback: f64,

        /// Write the series to a CSV file.
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Print JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Bypass the on-disk response cache.
        #[arg(long, default_value_t = false)]
        no_cache: bool,
    },
    /// Response cache management.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Configuration commands.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report entry count, expired entries and size.
    Status,
    /// Remove cached responses.
    Clear {
        /// Only remove expired or unreadable entries.
        #[arg(long, default_value_t = false)]
        expired: bool,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration.
    Show,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze {
            tickers,
            bulk_csv,
            json,
            no_cache,
        } => run_analyze(&config, &tickers, bulk_csv, json, no_cache),
        Commands::History {
            ticker,
            indicator,
            fallback,
            csv,
            json,
            no_cache,
        } => run_history(&config, &ticker, indicator.as_deref(), fallback, csv, json, no_cache),
        Commands::Cache { action } => match action {
            CacheAction::Status => run_cache_status(&config),
            CacheAction::Clear { expired } => run_cache_clear(&config, expired),
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                print!("{}", config.to_toml()?);
                Ok(())
            }
        },
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "valuelab=debug" } else { "valuelab=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

/// Configured directory, else the platform cache dir, else the temp dir.
fn cache_dir(config: &EngineConfig) -> PathBuf {
    config
        .cache
        .dir
        .clone()
        .or_else(|| dirs::cache_dir().map(|d| d.join("valuelab")))
        .unwrap_or_else(|| std::env::temp_dir().join("valuelab"))
}

fn disk_cache(config: &EngineConfig) -> DiskCache {
    DiskCache::new(cache_dir(config), config.cache.ttl())
}

fn http_fetcher(config: &EngineConfig, no_cache: bool) -> Result<Arc<HttpFetcher>> {
    let cache: Option<Arc<dyn ResponseCache>> = if no_cache {
        None
    } else {
        let cache = disk_cache(config);
        debug!(dir = %cache.dir().display(), ttl_secs = config.cache.ttl_secs, "response cache enabled");
        Some(Arc::new(cache))
    };
    Ok(Arc::new(HttpFetcher::new(&config.http, cache)?))
}

/// Tell the user when the provider cut us off, so missing rows make sense.
fn report_breaker(http: &HttpFetcher) {
    if !http.is_available() {
        let wait = http.circuit_breaker().remaining_cooldown();
        eprintln!(
            "Data provider is refusing requests; retry in about {} min.",
            wait.as_secs().div_ceil(60)
        );
    }
}

fn run_analyze(
    config: &EngineConfig,
    tickers: &[String],
    bulk_csv: Option<PathBuf>,
    json: bool,
    no_cache: bool,
) -> Result<()> {
    let http = http_fetcher(config, no_cache)?;
    let yahoo = YahooSource::new(Arc::clone(&http), &config.sources);
    let bulk: Box<dyn BulkSource> = match bulk_csv {
        Some(path) => {
            if !path.exists() {
                bail!("bulk CSV not found: {}", path.display());
            }
            Box::new(CsvBulkSource::new(path))
        }
        None => Box::new(FundamentusSource::new(
            Arc::clone(&http),
            config.sources.fundamentus_url.clone(),
        )),
    };

    let merger = MarketDataMerger::new(bulk.as_ref(), &yahoo);
    let resolved = merger.build(tickers);
    let (requested, _) = parse_requested(tickers);
    let rows = analyze(&resolved.snapshot, &requested);

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("No data for the requested tickers.");
    } else {
        print_analysis(&rows);
    }

    report_breaker(&http);
    if !resolved.unresolved.is_empty() {
        let codes: Vec<&str> = resolved.unresolved.iter().map(Ticker::as_str).collect();
        eprintln!("Not found in any source: {}", codes.join(", "));
    }
    if !resolved.rejected.is_empty() {
        eprintln!("Rejected (not a ticker): {}", resolved.rejected.join(", "));
    }

    Ok(())
}

fn print_analysis(rows: &[AnalysisRow]) {
    println!(
        "{:<8} {:>10} {:>8} {:>8} {:>8} {:>10} {:>9} {:>10} {:>9}  {:<8}",
        "Ticker", "Price", "P/L", "P/VP", "DY %", "Graham", "Margin %", "Ceiling", "Margin %", "Source"
    );
    println!("{}", "-".repeat(99));
    for row in rows {
        let r = &row.record;
        let v = &row.valuation;
        println!(
            "{:<8} {:>10.2} {:>8.2} {:>8.2} {:>8.2} {:>10.2} {:>9.1} {:>10.2} {:>9.1}  {:<8}",
            r.ticker.as_str(),
            r.price,
            r.price_to_earnings,
            r.price_to_book,
            r.dividend_yield * 100.0,
            v.graham_price,
            v.graham_margin,
            v.ceiling_price,
            v.ceiling_margin,
            format!("{:?}", r.provenance).to_lowercase(),
        );
    }
}

fn run_history(
    config: &EngineConfig,
    ticker: &str,
    indicator: Option<&str>,
    fallback: f64,
    csv_path: Option<PathBuf>,
    json: bool,
    no_cache: bool,
) -> Result<()> {
    let ticker = Ticker::parse(ticker)?;
    let indicators = match indicator {
        Some(name) => vec![name.parse::<IndicatorName>().map_err(anyhow::Error::msg)?],
        None => IndicatorName::ALL.to_vec(),
    };

    let http = http_fetcher(config, no_cache)?;
    let yahoo = YahooSource::new(Arc::clone(&http), &config.sources);
    let service = HistoryService::new(&yahoo, &yahoo, &yahoo, config.sources.history_range.clone());

    let history = service.load(&ticker);
    report_breaker(&http);
    if history.is_empty() {
        bail!("no price history found for {ticker}");
    }
    for failure in &history.failures {
        eprintln!("warning: {failure}");
    }

    let columns: Vec<(IndicatorName, Vec<f64>)> = indicators
        .iter()
        .map(|name| (*name, history.series_or_constant(*name, fallback)))
        .collect();

    if let Some(path) = &csv_path {
        write_history_csv(path, &history, &columns)?;
        eprintln!("Wrote {} rows to {}", history.len(), path.display());
    }

    if json {
        let indicators: serde_json::Map<String, serde_json::Value> = columns
            .iter()
            .map(|(name, values)| (name.label().to_string(), serde_json::json!(values)))
            .collect();
        let doc = serde_json::json!({
            "ticker": ticker.as_str(),
            "dates": history.dates.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect::<Vec<_>>(),
            "prices": history.prices,
            "indicators": indicators,
            "failures": history.failures.iter().map(|f| f.to_string()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else if csv_path.is_none() {
        print_history(&ticker, &history, &columns);
    }

    Ok(())
}

fn write_history_csv(
    path: &Path,
    history: &HistoricalIndicators,
    columns: &[(IndicatorName, Vec<f64>)],
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    let mut header = vec!["date".to_string(), "close".to_string()];
    header.extend(columns.iter().map(|(name, _)| name.label().to_string()));
    writer.write_record(&header)?;

    for (i, date) in history.dates.iter().enumerate() {
        let mut record = vec![date.format("%Y-%m-%d").to_string(), history.prices[i].to_string()];
        record.extend(columns.iter().map(|(_, values)| values[i].to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn print_history(ticker: &Ticker, history: &HistoricalIndicators, columns: &[(IndicatorName, Vec<f64>)]) {
    println!();
    println!("=== {ticker} ===");
    println!(
        "Period: {} to {} ({} sessions)",
        history.dates[0],
        history.dates[history.len() - 1],
        history.len()
    );
    println!();

    print!("{:<12} {:>10}", "Date", "Close");
    for (name, _) in columns {
        print!(" {:>22}", name.label());
    }
    println!();
    println!("{}", "-".repeat(23 + 23 * columns.len()));

    for (i, date) in history.dates.iter().enumerate() {
        print!("{:<12} {:>10.2}", date.format("%Y-%m-%d").to_string(), history.prices[i]);
        for (_, values) in columns {
            print!(" {:>22.2}", values[i]);
        }
        println!();
    }
}

fn run_cache_status(config: &EngineConfig) -> Result<()> {
    let cache = disk_cache(config);
    if !cache.dir().exists() {
        println!("Cache directory does not exist: {}", cache.dir().display());
        return Ok(());
    }

    let status = cache.status()?;
    println!("Cache: {}", cache.dir().display());
    println!("TTL: {}s", config.cache.ttl_secs);
    println!("Entries: {} ({} expired)", status.entries, status.expired);
    println!("Total size: {}", format_size(status.bytes));
    Ok(())
}

fn run_cache_clear(config: &EngineConfig, expired_only: bool) -> Result<()> {
    let cache = disk_cache(config);
    let removed = if expired_only {
        cache.purge_expired()?
    } else {
        cache.clear()?
    };
    println!("Removed {removed} entries from {}", cache.dir().display());
    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
