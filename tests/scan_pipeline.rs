//! End-to-end tests for the cache -> detector -> profile -> scorer pipeline
//!
//! Every test runs against a temporary data directory and an in-memory
//! candle source, so nothing touches the network.

#[cfg(test)]
mod scan_pipeline_tests {
    use chrono::{DateTime, Duration, Utc};
    use std::collections::HashMap;
    use tempfile::{tempdir, TempDir};
    use topscan::analysis::indicators::{compute_indicator_frame, IndicatorFrame, IndicatorSource, IndicatorStore};
    use topscan::analysis::{detect_lower_highs, volume_profile, PatternDetector, PatternResult, WindowedRules};
    use topscan::cache::{CacheStore, OhlcCache};
    use topscan::config::{lookup_from, ScanConfig, TimeframeTable, WindowedRulesConfig};
    use topscan::scan::Scanner;
    use topscan::scoring::{PairScorer, TimeframeOutcome};
    use topscan::source::{CandleSource, OhlcBatch, SourceError};
    use topscan::types::{Candle, CandleSeries, PairMeta};
    use topscan::report;

    /// Canned candles per pair; unknown pairs fail like a delisted market
    struct MemorySource {
        series: HashMap<String, Vec<Candle>>,
    }

    impl MemorySource {
        fn new(entries: Vec<(&str, Vec<Candle>)>) -> Self {
            Self {
                series: entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            }
        }
    }

    impl CandleSource for MemorySource {
        fn get_candles(&self, pair: &str, _interval: u32, since: Option<i64>) -> Result<OhlcBatch, SourceError> {
            let candles: Vec<Candle> = self
                .series
                .get(pair)
                .ok_or_else(|| SourceError::Api(vec!["EQuery:Unknown asset pair".to_string()]))?
                .iter()
                .filter(|c| since.map_or(true, |s| c.time.timestamp() >= s))
                .copied()
                .collect();
            let last = candles.last().map(|c| c.time.timestamp());
            Ok(OhlcBatch { candles, last })
        }
    }

    struct NoIndicators;

    impl IndicatorSource for NoIndicators {
        fn load_indicators(&self, _pair: &str, _timeframe: &str) -> Option<IndicatorFrame> {
            None
        }
    }

    fn today() -> DateTime<Utc> {
        Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc()
    }

    /// Daily bars for day offsets `from..=to` relative to today
    fn daily(from: i64, to: i64, high: impl Fn(i64) -> f64) -> Vec<Candle> {
        (from..=to)
            .map(|offset| {
                let h = high(offset);
                Candle::bar(today() + Duration::days(offset), h - 1.0, h, h - 2.0, h - 1.0, 10.0)
            })
            .collect()
    }

    /// 40 daily bars with a swing high every fifth bar
    fn swings(peak: impl Fn(i64) -> f64) -> Vec<Candle> {
        daily(-39, 0, |offset| {
            let i = offset + 39;
            if i % 5 == 2 {
                peak(i / 5)
            } else {
                100.0
            }
        })
    }

    fn pair(altname: &str) -> PairMeta {
        let base = altname.trim_end_matches("USD").to_string();
        PairMeta {
            altname: altname.to_string(),
            wsname: format!("{}/USD", base),
            base,
            quote: "ZUSD".to_string(),
            is_solana: false,
        }
    }

    fn config(dir: &TempDir, detector: Option<&str>) -> ScanConfig {
        let mut vars: HashMap<String, String> = [
            ("TOPSCAN_DATA_DIR", dir.path().join("data")),
            ("TOPSCAN_RESULTS_DIR", dir.path().join("results")),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.display().to_string()))
        .collect();
        vars.insert("TIMEFRAME_WEIGHTS".to_string(), "daily:1.0".to_string());
        if let Some(detector) = detector {
            vars.insert("PATTERN_DETECTOR".to_string(), detector.to_string());
        }

        let config = ScanConfig::from_lookup(lookup_from(vars)).unwrap();
        config.ensure_dirs().unwrap();
        config
    }

    fn series_from_highs(highs: &[f64]) -> CandleSeries {
        CandleSeries::new(
            highs
                .iter()
                .enumerate()
                .map(|(i, &h)| Candle::bar(today() + Duration::days(i as i64), h, h, h - 1.0, h - 0.5, 1.0 + i as f64))
                .collect(),
        )
    }

    #[test]
    fn test_merge_is_idempotent_and_keeps_rows() {
        let dir = tempdir().unwrap();
        let store_at = || CacheStore::open(dir.path().join("cache"), dir.path().join("state.db")).unwrap();

        let first = MemorySource::new(vec![("BONKUSD", daily(-20, -3, |d| 50.0 - d as f64))]);
        let cache = OhlcCache::new(store_at(), &first, TimeframeTable::default());
        let initial = cache.fetch("BONKUSD", "daily", false).unwrap();
        let path = cache.store().series_path("BONKUSD", "daily");
        let bytes = std::fs::read(&path).unwrap();

        let again = cache.fetch("BONKUSD", "daily", true).unwrap();
        assert_eq!(again, initial);
        assert_eq!(std::fs::read(&path).unwrap(), bytes, "re-merge changed the cache file");

        // Overlapping batch with revised closes plus three new days
        let second = MemorySource::new(vec![("BONKUSD", daily(-5, 0, |d| 80.0 - d as f64))]);
        let cache = OhlcCache::new(store_at(), &second, TimeframeTable::default());
        let merged = cache.fetch("BONKUSD", "daily", true).unwrap();

        assert_eq!(merged.len(), initial.len() + 3);
        for candle in initial.iter() {
            assert!(merged.iter().any(|m| m.time == candle.time));
        }
        let revised = merged.iter().find(|c| c.time == today() - Duration::days(4)).unwrap();
        assert_eq!(revised.high, 84.0);
        assert_eq!(cache.store().cursor("BONKUSD", "daily").unwrap(), Some(today().timestamp()));
    }

    #[test]
    fn test_volume_profile_properties() {
        let series = series_from_highs(&[10.0, 12.5, 11.0, 15.0, 14.2, 13.3, 12.1, 18.0, 16.4, 10.5, 11.7, 12.9]);
        let total: f64 = series.volumes().iter().sum();

        let profile = volume_profile::compute(&series, volume_profile::DEFAULT_BINS, volume_profile::DEFAULT_VALUE_AREA);

        let binned: f64 = profile.histogram.iter().sum();
        assert!((binned - total).abs() < 1e-9);

        let max = profile.histogram.iter().cloned().fold(f64::MIN, f64::max);
        let poc_bin = profile
            .bin_edges
            .windows(2)
            .position(|edge| (edge[0] + edge[1]) / 2.0 == profile.poc)
            .unwrap();
        assert_eq!(profile.histogram[poc_bin], max);
        assert!(profile.val <= profile.bin_edges[poc_bin]);
        assert!(profile.vah >= profile.bin_edges[poc_bin + 1]);
    }

    #[test]
    fn test_descending_peaks_score_near_one() {
        let series = series_from_highs(&[10.0, 30.0, 10.0, 10.0, 25.0, 10.0, 10.0, 20.0, 10.0, 10.0]);

        let result = detect_lower_highs(&series, 3, 2);

        assert!(result.passed);
        assert!((result.score - 1.0).abs() < 1e-9);
        assert_eq!(result.violations, 0);
    }

    #[test]
    fn test_monthly_higher_high_fails() {
        let detector = WindowedRules::new(Box::new(NoIndicators), WindowedRulesConfig::default());
        let series = series_from_highs(&[90.0, 100.0]);

        let result = detector.detect(&series, "monthly", "BONKUSD");

        assert!(!result.passed);
        assert!(result.reason.is_some());
    }

    #[test]
    fn test_perfect_timeframe_aggregates_to_one() {
        let mut pattern = PatternResult::rejected("unused", Vec::new());
        pattern.passed = true;
        pattern.score = 1.0;
        pattern.reason = None;
        let outcome = TimeframeOutcome {
            name: "daily".to_string(),
            pattern,
            volume_profile: volume_profile::compute(&CandleSeries::empty(), 30, 0.7),
            volume_decline_score: 1.0,
            poc_distance_score: 1.0,
        };

        let scorer = PairScorer::new([("daily".to_string(), 1.0)].into(), 0.0);

        assert_eq!(scorer.aggregate(&[outcome], false), 1.0);
    }

    #[test]
    fn test_empty_series_fails_everywhere() {
        let empty = CandleSeries::empty();
        let windowed = WindowedRules::new(Box::new(NoIndicators), WindowedRulesConfig::default());

        for result in [detect_lower_highs(&empty, 3, 2), windowed.detect(&empty, "daily", "BONKUSD")] {
            assert!(!result.passed);
            assert!(result.reason.is_some());
        }

        let profile = volume_profile::compute(&empty, 30, 0.7);
        assert!(profile.poc.is_nan() && profile.vah.is_nan() && profile.val.is_nan());
    }

    #[test]
    fn test_scan_ranks_exports_and_is_deterministic() {
        let dir = tempdir().unwrap();
        let config = config(&dir, Some("1"));
        let source = MemorySource::new(vec![
            ("TOPUSD", swings(|k| 200.0 - 10.0 * k as f64)),
            ("RISEUSD", swings(|k| 120.0 + 10.0 * k as f64)),
        ]);
        let scanner = Scanner::from_config(&config, source).unwrap();
        let pairs = vec![pair("RISEUSD"), pair("GONEUSD"), pair("TOPUSD")];
        let timeframes = vec!["daily".to_string()];

        let results = scanner.run(&pairs, &timeframes, false);

        let names: Vec<&str> = results.iter().map(|r| r.pair.as_str()).collect();
        assert_eq!(names, vec!["TOPUSD", "RISEUSD"]);
        assert!(results[0].outcome("daily").unwrap().passed());
        assert!(!results[1].outcome("daily").unwrap().passed());
        assert_eq!(results[0].frames["daily"].len(), 40);

        // Second pass is served from the fresh cache
        let rerun = scanner.run(&pairs, &timeframes, false);
        let scores: Vec<f64> = results.iter().map(|r| r.score).collect();
        let rerun_scores: Vec<f64> = rerun.iter().map(|r| r.score).collect();
        assert_eq!(scores, rerun_scores);

        report::export_json(&results, &config.results_json_path()).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(config.results_json_path()).unwrap()).unwrap();
        assert_eq!(json[0]["pair"], "TOPUSD");
        assert_eq!(json[0]["timeframes"]["daily"]["passed"], true);
        assert_eq!(json[1]["timeframes"]["daily"]["reason"], "weak descent");

        let summary = report::format_summary(&results, 1);
        assert!(summary.contains("TOP/USD"));
        assert!(!summary.contains("RISE/USD"));
    }

    #[test]
    fn test_windowed_scan_uses_computed_indicators() {
        let dir = tempdir().unwrap();
        let config = config(&dir, None);
        let source = MemorySource::new(vec![("FADEUSD", daily(-259, 0, |d| 250.0 - d as f64))]);
        let scanner = Scanner::from_config(&config, source).unwrap();
        let pairs = vec![pair("FADEUSD")];
        let timeframes = vec!["daily".to_string()];

        let before = scanner.run(&pairs, &timeframes, false);
        let daily_before = before[0].outcome("daily").unwrap();
        assert!(!daily_before.passed());
        assert_eq!(daily_before.pattern.reason.as_deref(), Some("missing ema_50"));

        let store = scanner.cache().store();
        let series = store.read_series(&store.series_path("FADEUSD", "daily")).unwrap().unwrap();
        IndicatorStore::new(config.indicators_dir())
            .write("FADEUSD", "daily", &compute_indicator_frame(&series, "daily"))
            .unwrap();

        let after = scanner.run(&pairs, &timeframes, false);
        let daily_after = after[0].outcome("daily").unwrap();
        assert!(daily_after.passed(), "{:?}", daily_after.pattern.reason);
        assert_eq!(daily_after.pattern.score, 1.0);
        assert!(after[0].score > before[0].score);
    }
}
