//! Topscan Binary - Multi-Timeframe Topping Pattern Scanner
//!
//! Discovers Kraken USD spot pairs, refreshes the OHLC cache and ranks pairs
//! by descending-highs structure across monthly, daily and 4h candles.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin topscan
//! cargo run --release --bin topscan -- --pairs BONKUSD,WIFUSD --refresh
//! cargo run --release --bin topscan -- --start 50 --limit 25 --top 10
//! cargo run --release --bin topscan -- --export-pairs
//! cargo run --release --bin topscan -- --refresh-metadata
//! cargo run --release --bin topscan -- --status
//! ```
//!
//! ## Flags
//!
//! - --refresh - Ignore cache TTLs and fetch from Kraken
//! - --pairs A,B - Only scan these pairs (altname or wsname without slash)
//! - --start N / --limit N - Window into the discovered pair list
//! - --timeframes monthly,daily,4h - Timeframes to scan
//! - --top N - Rows in the console summary (default: TOP_N)
//! - --export-pairs - Write the discovered pairs to data/pairs_usd.csv
//! - --refresh-metadata - Save the Assets and AssetPairs listings under data/cache
//! - --status - Print the cache cursors and exit
//!
//! ## Environment Variables
//!
//! - TOPSCAN_DATA_DIR - Cache, indicator and state root (default: data)
//! - TOPSCAN_RESULTS_DIR - Report output directory (default: results)
//! - KRAKEN_BASE_URL - Public REST root (default: https://api.kraken.com/0/public)
//! - PUBLIC_MIN_INTERVAL_MS - Minimum spacing between API calls (default: 1100)
//! - HTTP_TIMEOUT_SECS - Per-request timeout (default: 30)
//! - HTTP_MAX_RETRIES - Retries on transport errors (default: 3)
//! - PATTERN_DETECTOR - 1 = statistical descent, 2 = windowed rules (default: 2)
//! - SOL_BONUS - Score bonus for Solana-origin pairs (default: 0.0)
//! - TIMEFRAME_WEIGHTS - e.g. monthly:0.4,daily:0.35,4h:0.25
//! - SOL_MEME_BASES - Bases treated as Solana-origin (default: BONK,WIF,SAMO,JTO)
//! - PAIR_WHITELIST - Altnames always scanned (default: JTOUSD)
//! - TOP_N - Rows in the console summary (default: 20)
//! - RUST_LOG - Logging level (optional, default: info)

use topscan::cache::CacheStore;
use topscan::config::{ConfigError, ScanArgs, ScanConfig};
use topscan::kraken::pairs::{discover_usd_pairs, export_pairs_csv, select_pairs};
use topscan::kraken::KrakenClient;
use topscan::report;
use topscan::scan::Scanner;

fn print_status(config: &ScanConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = CacheStore::open(config.cache_dir(), config.state_db_path())?;
    let cursors = store.cursors()?;

    if cursors.is_empty() {
        println!("No cached series yet ({})", config.state_db_path().display());
        return Ok(());
    }

    println!("{:12} {:8} {:>12} {:>12}", "Pair", "TF", "last_ts", "updated_at");
    for row in cursors {
        println!(
            "{:12} {:8} {:>12} {:>12}",
            row.pair, row.timeframe, row.last_ts, row.updated_at
        );
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = ScanConfig::from_env()?;
    let args = ScanArgs::from_env_args()?;

    for tf in &args.timeframes {
        if !config.timeframes.contains(tf) {
            return Err(ConfigError::InvalidValue(format!("unknown timeframe '{}'", tf)).into());
        }
    }

    config.ensure_dirs()?;

    if args.status {
        return print_status(&config);
    }

    log::info!("🚀 Starting Topscan");
    log::info!("   Data dir: {}", config.data_dir.display());
    log::info!("   Results dir: {}", config.results_dir.display());
    log::info!("   Detector: {}", config.detector.as_str());
    log::info!("   Timeframes: {:?}", args.timeframes);

    let client = KrakenClient::from_config(&config)?;

    log::info!("📖 Loading Kraken asset pairs...");
    let listing = client.get_asset_pairs()?;
    let discovered = discover_usd_pairs(&listing, &config);
    log::info!("✅ Found {} USD pairs", discovered.len());

    if args.refresh_metadata {
        let assets = client.get_assets()?;
        let store = CacheStore::open(config.cache_dir(), config.state_db_path())?;
        store.write_json(&store.metadata_path("asset_info"), &assets)?;
        store.write_json(&store.metadata_path("asset_pairs"), &listing)?;
        log::info!("💾 Saved {} assets and {} asset pairs to {}", assets.len(), listing.len(), config.cache_dir().display());
    }

    if args.export_pairs {
        export_pairs_csv(&discovered, &config.pairs_csv_path())?;
    }

    let pairs = select_pairs(discovered, args.pairs.as_deref(), args.start, args.limit);
    if pairs.is_empty() {
        log::warn!("⚠️  No pairs selected, nothing to scan");
        return Ok(());
    }

    let scanner = Scanner::from_config(&config, client)?;
    let results = scanner.run(&pairs, &args.timeframes, args.refresh);

    print!("{}", report::format_summary(&results, args.top.unwrap_or(config.top_n)));

    report::export_json(&results, &config.results_json_path())?;
    report::export_csv(&results, &config.results_csv_path())?;

    Ok(())
}
