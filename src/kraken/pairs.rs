//! USD spot pair discovery and selection

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use super::AssetPairInfo;
use crate::config::ScanConfig;
use crate::types::PairMeta;

fn is_usd_spot_pair(info: &AssetPairInfo) -> bool {
    let wsname = info.wsname.as_deref().unwrap_or("");

    // Dark pool books
    if info.altname.ends_with(".d") {
        return false;
    }

    let usd_quoted = info.quote == "ZUSD"
        || info.quote == "USD"
        || info.altname.ends_with("USD")
        || wsname.contains("/USD");
    if !usd_quoted {
        return false;
    }

    match info.aclass_base.as_deref() {
        None | Some("") | Some("currency") => true,
        Some(_) => false,
    }
}

/// Base symbol: altname without its `USD` suffix, else Kraken's base code
/// with the legacy X/Z prefixes stripped
pub fn normalize_base(altname: &str, base: &str) -> String {
    let symbol = if let Some(stripped) = altname.strip_suffix("USD") {
        stripped
    } else if !base.is_empty() {
        base.trim_start_matches('X').trim_start_matches('Z')
    } else {
        altname
    };
    symbol.to_uppercase()
}

fn is_solana_base(base: &str, meme_bases: &BTreeSet<String>) -> bool {
    base == "SOL" || meme_bases.contains(base)
}

/// Filter an AssetPairs listing down to USD spot pairs, then append any
/// whitelisted altnames the listing did not include
pub fn discover_usd_pairs(listing: &BTreeMap<String, AssetPairInfo>, config: &ScanConfig) -> Vec<PairMeta> {
    let mut metas: Vec<PairMeta> = listing
        .values()
        .filter(|info| is_usd_spot_pair(info))
        .map(|info| {
            let base = normalize_base(&info.altname, &info.base);
            PairMeta {
                altname: info.altname.clone(),
                wsname: info
                    .wsname
                    .clone()
                    .filter(|ws| !ws.is_empty())
                    .unwrap_or_else(|| info.altname.clone()),
                is_solana: is_solana_base(&base, &config.sol_meme_bases),
                base,
                quote: if info.quote.is_empty() {
                    "USD".to_string()
                } else {
                    info.quote.clone()
                },
            }
        })
        .collect();

    let known: BTreeSet<String> = metas.iter().map(|m| m.altname.clone()).collect();
    for altname in config.pair_whitelist.difference(&known) {
        let base = normalize_base(altname, "");
        log::info!("➕ Adding whitelisted pair {} missing from listing", altname);
        metas.push(PairMeta {
            altname: altname.clone(),
            wsname: format!("{}/USD", base),
            is_solana: is_solana_base(&base, &config.sol_meme_bases),
            base,
            quote: "USD".to_string(),
        });
    }

    metas
}

/// Restrict to requested pairs (altname or wsname without the slash,
/// case-insensitive), then skip `start` and keep at most `limit`
pub fn select_pairs(
    pairs: Vec<PairMeta>,
    only: Option<&[String]>,
    start: Option<usize>,
    limit: Option<usize>,
) -> Vec<PairMeta> {
    let wanted: Option<BTreeSet<String>> =
        only.map(|names| names.iter().map(|n| n.trim().to_uppercase()).collect());

    pairs
        .into_iter()
        .filter(|p| match &wanted {
            Some(set) => set.contains(&p.altname.to_uppercase()) || set.contains(&p.wsname.replace('/', "").to_uppercase()),
            None => true,
        })
        .skip(start.unwrap_or(0))
        .take(limit.unwrap_or(usize::MAX))
        .collect()
}

/// Write `altname, wsname, base, quote, is_solana` rows
pub fn export_pairs_csv(pairs: &[PairMeta], path: &Path) -> Result<(), csv::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    for pair in pairs {
        writer.serialize(pair)?;
    }
    writer.flush()?;

    log::info!("💾 Exported {} USD pairs to {}", pairs.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(altname: &str, wsname: Option<&str>, base: &str, quote: &str, aclass: Option<&str>) -> AssetPairInfo {
        AssetPairInfo {
            altname: altname.to_string(),
            wsname: wsname.map(str::to_string),
            base: base.to_string(),
            quote: quote.to_string(),
            aclass_base: aclass.map(str::to_string),
        }
    }

    fn listing() -> BTreeMap<String, AssetPairInfo> {
        [
            ("BONKUSD", info("BONKUSD", Some("BONK/USD"), "BONK", "ZUSD", Some("currency"))),
            ("SOLUSD", info("SOLUSD", Some("SOL/USD"), "SOL", "ZUSD", None)),
            ("XXBTZUSD.d", info("XBTUSD.d", None, "XXBT", "ZUSD", None)),
            ("XETHXXBT", info("ETHXBT", Some("ETH/XBT"), "XETH", "XXBT", None)),
            ("AAPLxUSD", info("AAPLxUSD", Some("AAPLx/USD"), "AAPLx", "ZUSD", Some("tokenized_asset"))),
            ("XXBTZUSD", info("XBTUSD", Some("XBT/USD"), "XXBT", "ZUSD", None)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }

    #[test]
    fn test_normalize_base() {
        assert_eq!(normalize_base("BONKUSD", "BONK"), "BONK");
        assert_eq!(normalize_base("ETHEUR", "XETH"), "ETH");
        assert_eq!(normalize_base("weird", ""), "WEIRD");
    }

    #[test]
    fn test_discover_usd_pairs() {
        let config = ScanConfig::from_lookup(|_| None).unwrap();
        let pairs = discover_usd_pairs(&listing(), &config);
        let names: Vec<&str> = pairs.iter().map(|p| p.altname.as_str()).collect();

        assert_eq!(names, vec!["BONKUSD", "SOLUSD", "XBTUSD", "JTOUSD"]);

        let bonk = &pairs[0];
        assert!(bonk.is_solana);
        assert_eq!(bonk.quote, "ZUSD");

        let xbt = &pairs[2];
        assert_eq!(xbt.base, "XBT");
        assert!(!xbt.is_solana);

        let jto = &pairs[3];
        assert_eq!(jto.wsname, "JTO/USD");
        assert!(jto.is_solana);
    }

    #[test]
    fn test_select_pairs() {
        let config = ScanConfig::from_lookup(|_| None).unwrap();
        let pairs = discover_usd_pairs(&listing(), &config);

        let only = vec!["bonkusd".to_string(), "XBT/USD".replace('/', "")];
        let picked = select_pairs(pairs.clone(), Some(&only), None, None);
        assert_eq!(picked.len(), 2);

        let window = select_pairs(pairs, None, Some(1), Some(2));
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].altname, "SOLUSD");
    }

    #[test]
    fn test_export_pairs_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pairs_usd.csv");
        let config = ScanConfig::from_lookup(|_| None).unwrap();

        export_pairs_csv(&discover_usd_pairs(&listing(), &config), &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some("altname,wsname,base,quote,is_solana"));
        assert_eq!(lines.next(), Some("BONKUSD,BONK/USD,BONK,ZUSD,true"));
    }
}
