//! Compute Indicators Binary - Trend Average Builder
//!
//! Reads cached OHLC series and writes `<pair>_<tf>_indicators.csv` files
//! (close, EMAs and, for daily, YTD / 30d / 7d returns) consumed by the
//! windowed-rules detector.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --release --bin compute_indicators
//! cargo run --release --bin compute_indicators -- --pairs BONKUSD --timeframes daily,4h
//! ```
//!
//! Pairs come from data/pairs_usd.csv when present (see `topscan --export-pairs`),
//! otherwise from the series files found in the cache directory.
//!
//! ## Environment Variables
//!
//! - TOPSCAN_DATA_DIR - Cache, indicator and state root (default: data)
//! - RUST_LOG - Logging level (optional, default: info)

use std::collections::BTreeSet;
use std::path::Path;

use topscan::analysis::indicators::{compute_indicator_frame, IndicatorStore};
use topscan::cache::CacheStore;
use topscan::config::{ScanArgs, ScanConfig};
use topscan::kraken::pairs::select_pairs;
use topscan::types::PairMeta;

/// Pair names with a `<pair>_<tf>.csv` series file for any of `timeframes`
fn pairs_in_cache(cache_dir: &Path, timeframes: &[String]) -> std::io::Result<Vec<String>> {
    let mut pairs = BTreeSet::new();

    for entry in std::fs::read_dir(cache_dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        let stem = match name.strip_suffix(".csv") {
            Some(stem) if !stem.ends_with(".base") => stem,
            _ => continue,
        };
        for tf in timeframes {
            if let Some(pair) = stem.strip_suffix(&format!("_{}", tf)) {
                pairs.insert(pair.to_string());
            }
        }
    }

    Ok(pairs.into_iter().collect())
}

fn load_pairs(config: &ScanConfig, timeframes: &[String]) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let csv_path = config.pairs_csv_path();
    if csv_path.exists() {
        let mut reader = csv::Reader::from_path(&csv_path)?;
        let metas = reader.deserialize::<PairMeta>().collect::<Result<Vec<_>, _>>()?;
        log::info!("📖 Loaded {} pairs from {}", metas.len(), csv_path.display());
        return Ok(metas.into_iter().map(|m| m.altname).collect());
    }

    log::info!("📖 {} not found, scanning {}", csv_path.display(), config.cache_dir().display());
    Ok(pairs_in_cache(&config.cache_dir(), timeframes)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = ScanConfig::from_env()?;
    let args = ScanArgs::from_env_args()?;
    config.ensure_dirs()?;

    let store = CacheStore::open(config.cache_dir(), config.state_db_path())?;
    let indicators = IndicatorStore::new(config.indicators_dir());

    // Reuse the scanner's pair filter on bare names
    let names = load_pairs(&config, &args.timeframes)?;
    let metas: Vec<PairMeta> = names
        .into_iter()
        .map(|altname| PairMeta {
            wsname: altname.clone(),
            base: String::new(),
            quote: String::new(),
            is_solana: false,
            altname,
        })
        .collect();
    let pairs = select_pairs(metas, args.pairs.as_deref(), args.start, args.limit);

    log::info!("🚀 Computing indicators for {} pairs across {:?}", pairs.len(), args.timeframes);

    let mut written = 0;
    for pair in &pairs {
        for tf in &args.timeframes {
            let path = store.series_path(&pair.altname, tf);
            let series = match store.read_series(&path) {
                Ok(Some(series)) => series,
                Ok(None) => {
                    log::debug!("   No cache for {} {}", pair.altname, tf);
                    continue;
                }
                Err(e) => {
                    log::warn!("⚠️  Skipping {} {}: {}", pair.altname, tf, e);
                    continue;
                }
            };

            let frame = compute_indicator_frame(&series, tf);
            match indicators.write(&pair.altname, tf, &frame) {
                Ok(out) => {
                    written += 1;
                    log::info!("💾 Wrote {} ({} rows)", out.display(), frame.len());
                }
                Err(e) => log::warn!("⚠️  Failed to write indicators for {} {}: {}", pair.altname, tf, e),
            }
        }
    }

    log::info!("✅ Wrote {} indicator files", written);
    Ok(())
}
