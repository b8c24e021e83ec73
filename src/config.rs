//! Scanner configuration
//!
//! Runtime knobs come from environment variables (a `.env` file is honoured
//! by the binaries) with defaults matching the production scan. Timeframe
//! and detector tables are static and validated on construction.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Timeframes evaluated when `--timeframes` is not given, in report order
pub const DEFAULT_TIMEFRAMES: [&str; 3] = ["monthly", "daily", "4h"];

const MINUTES_PER_DAY: u32 = 1440;

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// How a timeframe's merged base candles are collapsed before caching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleRule {
    /// Calendar-month buckets labelled at the month's last day
    MonthEnd,
}

/// Static per-timeframe fetch and cache policy
#[derive(Debug, Clone, PartialEq)]
pub struct TimeframeConfig {
    pub interval_minutes: u32,
    /// `None` requests the full upstream history
    pub history_days: Option<u32>,
    pub cache_ttl: Duration,
    pub resample: Option<ResampleRule>,
}

impl TimeframeConfig {
    /// Build a timeframe, rejecting intervals that do not evenly divide a day
    pub fn new(
        interval_minutes: u32,
        history_days: Option<u32>,
        cache_ttl_hours: u64,
        resample: Option<ResampleRule>,
    ) -> Result<Self, ConfigError> {
        if interval_minutes == 0 || MINUTES_PER_DAY % interval_minutes != 0 {
            return Err(ConfigError::InvalidValue(format!(
                "interval of {} minutes does not evenly divide a day",
                interval_minutes
            )));
        }

        Ok(Self {
            interval_minutes,
            history_days,
            cache_ttl: Duration::from_secs(cache_ttl_hours * 3600),
            resample,
        })
    }

    pub fn interval_secs(&self) -> i64 {
        i64::from(self.interval_minutes) * 60
    }
}

/// Name → timeframe policy lookup
#[derive(Debug, Clone)]
pub struct TimeframeTable {
    entries: BTreeMap<String, TimeframeConfig>,
}

impl TimeframeTable {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, config: TimeframeConfig) {
        self.entries.insert(name.into(), config);
    }

    pub fn get(&self, name: &str) -> Option<&TimeframeConfig> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

impl Default for TimeframeTable {
    /// Kraken serves daily candles that are resampled to month-end for the
    /// monthly view; 4h history is capped at a week.
    fn default() -> Self {
        let mut table = Self::empty();
        let entries = [
            ("monthly", TimeframeConfig::new(1440, None, 24, Some(ResampleRule::MonthEnd))),
            ("daily", TimeframeConfig::new(1440, None, 6, None)),
            ("4h", TimeframeConfig::new(240, Some(7), 2, None)),
        ];
        for (name, config) in entries {
            if let Ok(config) = config {
                table.insert(name, config);
            }
        }
        table
    }
}

/// Which pattern detector the scan runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorKind {
    /// Peak-to-peak descent scoring (legacy, continuous score)
    StatisticalDescent,
    /// Windowed-high rules plus trend-average checks (binary score)
    WindowedRules,
}

impl DetectorKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "1" | "descent" => Some(DetectorKind::StatisticalDescent),
            "2" | "windowed" => Some(DetectorKind::WindowedRules),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::StatisticalDescent => "descent",
            DetectorKind::WindowedRules => "windowed",
        }
    }
}

/// A "trend-average must be falling" check
#[derive(Debug, Clone, PartialEq)]
pub struct TrendRule {
    /// Indicator column, e.g. `ema_50`
    pub column: String,
    /// Periods between the compared values
    pub lag: usize,
    /// Recent may sit up to `tolerance` (fraction) above the lagged value
    pub tolerance: f64,
}

impl TrendRule {
    pub fn strict(column: &str, lag: usize) -> Self {
        Self {
            column: column.to_string(),
            lag,
            tolerance: 0.0,
        }
    }

    pub fn tolerant(column: &str, lag: usize, tolerance: f64) -> Self {
        Self {
            column: column.to_string(),
            lag,
            tolerance,
        }
    }
}

/// Windows and trend checks for the windowed-rules detector
#[derive(Debug, Clone, PartialEq)]
pub struct WindowedRulesConfig {
    pub months_lookback: usize,
    pub daily_lookback_days: i64,
    pub daily_recent_days: i64,
    pub h4_lookback_days: i64,
    pub h4_recent_bars: usize,
    pub monthly_trend: TrendRule,
    pub daily_medium_trend: TrendRule,
    pub daily_long_trend: TrendRule,
    /// Intraday data is noisier, so this one carries a small tolerance
    pub h4_trend: TrendRule,
}

impl Default for WindowedRulesConfig {
    fn default() -> Self {
        Self {
            months_lookback: 2,
            daily_lookback_days: 30,
            daily_recent_days: 7,
            h4_lookback_days: 7,
            h4_recent_bars: 12,
            monthly_trend: TrendRule::strict("ema_12", 12),
            daily_medium_trend: TrendRule::strict("ema_50", 50),
            daily_long_trend: TrendRule::strict("ema_200", 200),
            h4_trend: TrendRule::tolerant("ema_7", 7, 0.002),
        }
    }
}

/// Peak detection parameters for the statistical-descent detector
#[derive(Debug, Clone, PartialEq)]
pub struct DescentConfig {
    pub min_peaks: BTreeMap<String, usize>,
    pub default_min_peaks: usize,
    pub order: usize,
}

impl DescentConfig {
    /// `(min_peaks, order)` for a timeframe
    pub fn params_for(&self, timeframe: &str) -> (usize, usize) {
        let min_peaks = self
            .min_peaks
            .get(timeframe)
            .copied()
            .unwrap_or(self.default_min_peaks);
        (min_peaks, self.order)
    }
}

impl Default for DescentConfig {
    fn default() -> Self {
        let min_peaks = [("monthly", 3), ("daily", 4), ("4h", 4)]
            .into_iter()
            .map(|(tf, n)| (tf.to_string(), n))
            .collect();
        Self {
            min_peaks,
            default_min_peaks: 3,
            order: 2,
        }
    }
}

/// Full scanner configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub data_dir: PathBuf,
    pub results_dir: PathBuf,
    pub kraken_base_url: String,
    pub min_call_interval: Duration,
    pub http_timeout: Duration,
    pub http_max_retries: u32,
    pub detector: DetectorKind,
    /// Additive bonus for Solana-origin pairs; 0.0 keeps the hook inert
    pub sol_bonus: f64,
    pub timeframe_weights: BTreeMap<String, f64>,
    pub sol_meme_bases: BTreeSet<String>,
    pub pair_whitelist: BTreeSet<String>,
    pub top_n: usize,
    pub timeframes: TimeframeTable,
    pub windowed: WindowedRulesConfig,
    pub descent: DescentConfig,
}

impl ScanConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `TOPSCAN_DATA_DIR` (default: data)
    /// - `TOPSCAN_RESULTS_DIR` (default: results)
    /// - `KRAKEN_BASE_URL` (default: https://api.kraken.com/0/public)
    /// - `PUBLIC_MIN_INTERVAL_MS` (default: 1100)
    /// - `HTTP_TIMEOUT_SECS` (default: 30)
    /// - `HTTP_MAX_RETRIES` (default: 3)
    /// - `PATTERN_DETECTOR` (default: 2 / windowed)
    /// - `SOL_BONUS` (default: 0.0)
    /// - `TIMEFRAME_WEIGHTS` (default: monthly:0.4,daily:0.35,4h:0.25)
    /// - `SOL_MEME_BASES` (default: BONK,WIF,SAMO,JTO)
    /// - `PAIR_WHITELIST` (default: JTOUSD)
    /// - `TOP_N` (default: 20)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`ScanConfig::from_env`] but reading from an arbitrary source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("KRAKEN_BASE_URL")
            .unwrap_or_else(|| "https://api.kraken.com/0/public".to_string());
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "KRAKEN_BASE_URL must start with http:// or https://".to_string(),
            ));
        }

        let detector = match lookup("PATTERN_DETECTOR") {
            Some(raw) => DetectorKind::parse(&raw).ok_or_else(|| {
                ConfigError::InvalidValue(format!("PATTERN_DETECTOR '{}' (expected 1 or 2)", raw))
            })?,
            None => DetectorKind::WindowedRules,
        };

        let timeframe_weights = match lookup("TIMEFRAME_WEIGHTS") {
            Some(raw) => parse_weights(&raw)?,
            None => parse_weights("monthly:0.4,daily:0.35,4h:0.25")?,
        };

        Ok(Self {
            data_dir: PathBuf::from(lookup("TOPSCAN_DATA_DIR").unwrap_or_else(|| "data".to_string())),
            results_dir: PathBuf::from(
                lookup("TOPSCAN_RESULTS_DIR").unwrap_or_else(|| "results".to_string()),
            ),
            kraken_base_url: base_url.trim_end_matches('/').to_string(),
            min_call_interval: Duration::from_millis(parse_or(&lookup, "PUBLIC_MIN_INTERVAL_MS", 1100)?),
            http_timeout: Duration::from_secs(parse_or(&lookup, "HTTP_TIMEOUT_SECS", 30)?),
            http_max_retries: parse_or(&lookup, "HTTP_MAX_RETRIES", 3)?,
            detector,
            sol_bonus: parse_or(&lookup, "SOL_BONUS", 0.0)?,
            timeframe_weights,
            sol_meme_bases: parse_set(lookup("SOL_MEME_BASES").as_deref().unwrap_or("BONK,WIF,SAMO,JTO")),
            pair_whitelist: parse_set(lookup("PAIR_WHITELIST").as_deref().unwrap_or("JTOUSD")),
            top_n: parse_or(&lookup, "TOP_N", 20)?,
            timeframes: TimeframeTable::default(),
            windowed: WindowedRulesConfig::default(),
            descent: DescentConfig::default(),
        })
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    pub fn indicators_dir(&self) -> PathBuf {
        self.data_dir.join("indicators")
    }

    pub fn state_db_path(&self) -> PathBuf {
        self.data_dir.join("ohlc_state.db")
    }

    pub fn pairs_csv_path(&self) -> PathBuf {
        self.data_dir.join("pairs_usd.csv")
    }

    pub fn results_json_path(&self) -> PathBuf {
        self.results_dir.join("analysis.json")
    }

    pub fn results_csv_path(&self) -> PathBuf {
        self.results_dir.join("analysis.csv")
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        for dir in [self.cache_dir(), self.indicators_dir(), self.results_dir.clone()] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(format!("{}='{}'", key, raw))),
        None => Ok(default),
    }
}

/// Parse `name:weight` pairs separated by commas
fn parse_weights(raw: &str) -> Result<BTreeMap<String, f64>, ConfigError> {
    let mut weights = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, weight) = entry
            .split_once(':')
            .ok_or_else(|| ConfigError::InvalidValue(format!("timeframe weight '{}'", entry)))?;
        let weight = weight
            .trim()
            .parse::<f64>()
            .map_err(|_| ConfigError::InvalidValue(format!("timeframe weight '{}'", entry)))?;
        weights.insert(name.trim().to_string(), weight);
    }
    Ok(weights)
}

fn parse_set(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Command-line switches for the scanner binary
#[derive(Debug, Clone, PartialEq)]
pub struct ScanArgs {
    pub refresh: bool,
    pub pairs: Option<Vec<String>>,
    pub start: Option<usize>,
    pub limit: Option<usize>,
    pub timeframes: Vec<String>,
    pub top: Option<usize>,
    pub export_pairs: bool,
    pub refresh_metadata: bool,
    pub status: bool,
}

impl Default for ScanArgs {
    fn default() -> Self {
        Self {
            refresh: false,
            pairs: None,
            start: None,
            limit: None,
            timeframes: DEFAULT_TIMEFRAMES.iter().map(|s| s.to_string()).collect(),
            top: None,
            export_pairs: false,
            refresh_metadata: false,
            status: false,
        }
    }
}

impl ScanArgs {
    pub fn from_env_args() -> Result<Self, ConfigError> {
        Self::parse(env::args().skip(1))
    }

    /// Parse flags (program name already stripped)
    pub fn parse<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut iter = args.into_iter();

        while let Some(flag) = iter.next() {
            match flag.as_str() {
                "--refresh" => parsed.refresh = true,
                "--export-pairs" => parsed.export_pairs = true,
                "--refresh-metadata" => parsed.refresh_metadata = true,
                "--status" => parsed.status = true,
                "--pairs" => parsed.pairs = Some(split_list(&next_value(&mut iter, &flag)?)),
                "--timeframes" => parsed.timeframes = split_list(&next_value(&mut iter, &flag)?),
                "--start" => parsed.start = Some(parse_count(&next_value(&mut iter, &flag)?, &flag)?),
                "--limit" => parsed.limit = Some(parse_count(&next_value(&mut iter, &flag)?, &flag)?),
                "--top" => parsed.top = Some(parse_count(&next_value(&mut iter, &flag)?, &flag)?),
                other => {
                    return Err(ConfigError::InvalidValue(format!("unknown argument '{}'", other)));
                }
            }
        }

        Ok(parsed)
    }
}

fn next_value<I: Iterator<Item = String>>(iter: &mut I, flag: &str) -> Result<String, ConfigError> {
    iter.next()
        .ok_or_else(|| ConfigError::MissingVariable(format!("value for {}", flag)))
}

fn parse_count(raw: &str, flag: &str) -> Result<usize, ConfigError> {
    raw.parse::<usize>()
        .map_err(|_| ConfigError::InvalidValue(format!("{} expects a non-negative integer, got '{}'", flag, raw)))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Lookup helper for tests and embedding callers
pub fn lookup_from(map: HashMap<String, String>) -> impl Fn(&str) -> Option<String> {
    move |key| map.get(key).cloned()
}
