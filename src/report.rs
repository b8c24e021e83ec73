//! Console summary and tabular exports of scan results

use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::config::DEFAULT_TIMEFRAMES;
use crate::scoring::TimeframeOutcome;
use crate::types::PairResult;

fn column_label(timeframe: &str) -> &str {
    match timeframe {
        "monthly" => "M",
        "daily" => "D",
        other => other,
    }
}

fn passed_flag(outcome: Option<&TimeframeOutcome>) -> &'static str {
    match outcome {
        Some(o) if o.passed() => "Y",
        _ => "N",
    }
}

/// Top `top_n` results as a fixed-width table
pub fn format_summary(results: &[PairResult], top_n: usize) -> String {
    let mut out = String::from("Top pairs:\n");
    out.push_str(&format!("{:10} {:>8}", "Pair", "Score"));
    for tf in DEFAULT_TIMEFRAMES {
        out.push_str(&format!(" {:>3}", column_label(tf)));
    }
    out.push('\n');

    for result in results.iter().take(top_n) {
        out.push_str(&format!("{:10} {:>8.3}", result.wsname, result.score));
        for tf in DEFAULT_TIMEFRAMES {
            out.push_str(&format!(" {:>3}", passed_flag(result.outcome(tf))));
        }
        out.push('\n');
    }
    out
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

#[derive(Debug, Serialize)]
struct TimeframeRecord<'a> {
    passed: bool,
    slope: f64,
    pattern_score: f64,
    volume_decline_score: f64,
    poc_distance_score: f64,
    poc: Option<f64>,
    vah: Option<f64>,
    val: Option<f64>,
    reason: Option<&'a str>,
    candles: usize,
}

#[derive(Debug, Serialize)]
struct PairRecord<'a> {
    pair: &'a str,
    wsname: &'a str,
    score: f64,
    is_solana: bool,
    timeframes: BTreeMap<&'a str, TimeframeRecord<'a>>,
}

impl<'a> From<&'a PairResult> for PairRecord<'a> {
    fn from(result: &'a PairResult) -> Self {
        let timeframes = result
            .outcomes
            .iter()
            .map(|o| {
                let record = TimeframeRecord {
                    passed: o.passed(),
                    slope: o.pattern.slope,
                    pattern_score: o.pattern.score,
                    volume_decline_score: o.volume_decline_score,
                    poc_distance_score: o.poc_distance_score,
                    poc: finite(o.volume_profile.poc),
                    vah: finite(o.volume_profile.vah),
                    val: finite(o.volume_profile.val),
                    reason: o.pattern.reason.as_deref(),
                    candles: result.frames.get(&o.name).map_or(0, |s| s.len()),
                };
                (o.name.as_str(), record)
            })
            .collect();

        Self {
            pair: &result.pair,
            wsname: &result.wsname,
            score: result.score,
            is_solana: result.is_solana,
            timeframes,
        }
    }
}

fn create_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// One JSON record per pair, in result order
pub fn export_json(results: &[PairResult], path: &Path) -> io::Result<()> {
    create_parent(path)?;
    let records: Vec<PairRecord> = results.iter().map(PairRecord::from).collect();

    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, &records)?;
    writer.write_all(b"\n")?;
    writer.flush()?;

    log::info!("💾 Wrote {} results to {}", records.len(), path.display());
    Ok(())
}

/// Flat rows with `<tf>_passed`, `<tf>_slope`, ... columns per default timeframe
///
/// Timeframes that were not scanned read as failed with zero scores.
pub fn export_csv(results: &[PairResult], path: &Path) -> io::Result<()> {
    create_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec![
        "pair".to_string(),
        "wsname".to_string(),
        "score".to_string(),
        "is_solana".to_string(),
    ];
    for tf in DEFAULT_TIMEFRAMES {
        for suffix in ["passed", "slope", "pattern_score", "volume_decline", "poc_score"] {
            header.push(format!("{}_{}", tf, suffix));
        }
    }
    writer.write_record(&header)?;

    for result in results {
        let mut row = vec![
            result.pair.clone(),
            result.wsname.clone(),
            result.score.to_string(),
            result.is_solana.to_string(),
        ];
        for tf in DEFAULT_TIMEFRAMES {
            match result.outcome(tf) {
                Some(o) => row.extend([
                    o.passed().to_string(),
                    o.pattern.slope.to_string(),
                    o.pattern.score.to_string(),
                    o.volume_decline_score.to_string(),
                    o.poc_distance_score.to_string(),
                ]),
                None => row.extend(["false", "0", "0", "0", "0"].map(String::from)),
            }
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;

    log::info!("💾 Wrote {} rows to {}", results.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{volume_profile, PatternResult};
    use crate::types::{Candle, CandleSeries};
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn outcome(name: &str, passed: bool, profile_series: &CandleSeries) -> TimeframeOutcome {
        let mut pattern = PatternResult::rejected("weak descent", Vec::new());
        if passed {
            pattern.passed = true;
            pattern.score = 1.0;
            pattern.slope = -2.5;
            pattern.reason = None;
        }
        TimeframeOutcome {
            name: name.to_string(),
            pattern,
            volume_profile: volume_profile::compute(profile_series, 30, 0.7),
            volume_decline_score: 0.5,
            poc_distance_score: 0.25,
        }
    }

    fn results() -> Vec<PairResult> {
        let candle = Candle::bar(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(), 1.0, 2.0, 0.5, 1.5, 10.0);
        let series = CandleSeries::new(vec![candle]);

        vec![
            PairResult {
                pair: "BONKUSD".to_string(),
                wsname: "BONK/USD".to_string(),
                score: 0.875,
                is_solana: true,
                outcomes: vec![outcome("monthly", true, &series), outcome("daily", false, &series)],
                frames: [("monthly".to_string(), series.clone()), ("daily".to_string(), series.clone())].into(),
            },
            PairResult {
                pair: "XBTUSD".to_string(),
                wsname: "XBT/USD".to_string(),
                score: 0.1,
                is_solana: false,
                outcomes: vec![outcome("4h", false, &CandleSeries::empty())],
                frames: [("4h".to_string(), CandleSeries::empty())].into(),
            },
        ]
    }

    #[test]
    fn test_format_summary() {
        let summary = format_summary(&results(), 1);
        let lines: Vec<&str> = summary.lines().collect();

        assert_eq!(lines[0], "Top pairs:");
        assert_eq!(lines[1], "Pair          Score   M   D  4h");
        assert_eq!(lines[2], "BONK/USD      0.875   Y   N   N");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_export_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results").join("analysis.json");

        export_json(&results(), &path).unwrap();

        let parsed: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let records = parsed.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["pair"], "BONKUSD");
        assert_eq!(records[0]["is_solana"], true);

        let monthly = &records[0]["timeframes"]["monthly"];
        assert_eq!(monthly["passed"], true);
        assert_eq!(monthly["slope"], -2.5);
        assert_eq!(monthly["reason"], serde_json::Value::Null);
        assert_eq!(monthly["candles"], 1);
        assert!(monthly["poc"].is_number());
        assert_eq!(records[0]["timeframes"]["daily"]["reason"], "weak descent");

        // Undefined profile serializes as null
        let h4 = &records[1]["timeframes"]["4h"];
        assert!(h4["poc"].is_null() && h4["vah"].is_null() && h4["val"].is_null());
    }

    #[test]
    fn test_export_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("analysis.csv");

        export_csv(&results(), &path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), 4 + 3 * 5);
        assert_eq!(&headers[4], "monthly_passed");
        assert_eq!(&headers[18], "4h_poc_score");

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][4], "true");
        assert_eq!(&rows[0][9], "false");
        // BONKUSD never scanned 4h
        assert_eq!(&rows[0][14], "false");
        assert_eq!(&rows[0][15], "0");
    }
}
