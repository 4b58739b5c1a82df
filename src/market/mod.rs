//! Market-wide aggregation
//!
//! Collapses the per-ticker feature table into one row per date and flags
//! market-wide anomaly days with a rolling percentile threshold on
//! |market_ret| plus a breadth floor.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{Thresholds, Windows};
use crate::data::rolling::lagged_quantile;
use crate::features::FeatureRow;

/// Cross-ticker aggregate for one trading day
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDayRow {
    pub date: NaiveDate,
    /// Mean of `ret` across tickers with data that day
    pub market_ret: f64,
    /// Fraction of tickers with a positive `ret`
    pub breadth: f64,
    pub market_anomaly_flag: bool,
}

/// Aggregate features into the daily market table, sorted by date.
///
/// The rolling threshold is the configured percentile of |market_ret| over
/// the prior w_return days; during warm-up it is undefined and the breadth
/// floor alone can still flag a day.
pub fn compute_market_table(
    features: &[FeatureRow],
    windows: &Windows,
    thresholds: &Thresholds,
) -> Vec<MarketDayRow> {
    let mut by_date: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for row in features {
        if let Some(ret) = row.ret {
            by_date.entry(row.date).or_default().push(ret);
        }
    }

    let mut out: Vec<MarketDayRow> = by_date
        .into_iter()
        .map(|(date, rets)| {
            let n = rets.len() as f64;
            let market_ret = rets.iter().sum::<f64>() / n;
            let breadth = rets.iter().filter(|r| **r > 0.0).count() as f64 / n;
            MarketDayRow {
                date,
                market_ret,
                breadth,
                market_anomaly_flag: false,
            }
        })
        .collect();

    let abs_ret: Vec<Option<f64>> = out.iter().map(|r| Some(r.market_ret.abs())).collect();
    let roll_thr = lagged_quantile(&abs_ret, windows.w_return, thresholds.market_ret_pct);

    for (row, thr) in out.iter_mut().zip(roll_thr) {
        let exceeds = match thr {
            Some(t) => row.market_ret.abs() > t,
            None => false,
        };
        row.market_anomaly_flag = exceeds || row.breadth < thresholds.market_breadth;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(ticker: &str, day: u32, ret: Option<f64>) -> FeatureRow {
        FeatureRow {
            date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + chrono::Days::new(day as u64),
            ticker: ticker.to_string(),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.0,
            adj_close: 100.0,
            volume: 1000.0,
            ret,
            ret_z: None,
            ret_mu: None,
            ret_sd: None,
            log_volume: None,
            volz: None,
            range: None,
            range_pct: None,
            has_history: false,
        }
    }

    #[test]
    fn test_aggregates_mean_and_breadth() {
        let features = vec![
            feature("A", 0, Some(0.02)),
            feature("B", 0, Some(-0.01)),
            feature("C", 0, Some(0.05)),
            feature("D", 0, None),
        ];

        let windows = Windows::default();
        let table = compute_market_table(&features, &windows, &Thresholds::default());

        assert_eq!(table.len(), 1);
        assert!((table[0].market_ret - 0.02).abs() < 1e-10);
        assert!((table[0].breadth - 2.0 / 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_low_breadth_flags_during_warmup() {
        // 5 of 6 tickers negative: breadth ~ 0.1667 < 0.30 floor, and the
        // rolling threshold has no history yet
        let tickers = ["A", "B", "C", "D", "E", "F"];
        let features: Vec<FeatureRow> = tickers
            .iter()
            .enumerate()
            .map(|(i, t)| feature(t, 0, Some(if i == 0 { 0.01 } else { -0.01 })))
            .collect();

        let table = compute_market_table(&features, &Windows::default(), &Thresholds::default());
        assert!((table[0].breadth - 1.0 / 6.0).abs() < 1e-10);
        assert!(table[0].market_anomaly_flag);
    }

    #[test]
    fn test_rolling_threshold_flags_large_move() {
        let windows = Windows {
            w_return: 5,
            w_volume: 5,
            w_range: 5,
        };

        // calm days, then one big one
        let mut features = Vec::new();
        for day in 0..8 {
            let ret = if day == 7 { 0.10 } else { 0.005 };
            features.push(feature("A", day, Some(ret)));
            features.push(feature("B", day, Some(ret)));
        }

        let table = compute_market_table(&features, &windows, &Thresholds::default());
        assert!(!table[6].market_anomaly_flag);
        assert!(table[7].market_anomaly_flag);
    }

    #[test]
    fn test_threshold_is_lagged() {
        let windows = Windows {
            w_return: 3,
            w_volume: 3,
            w_range: 3,
        };

        let mut features: Vec<FeatureRow> =
            (0..6).map(|d| feature("A", d, Some(0.01))).collect();
        let baseline = compute_market_table(&features, &windows, &Thresholds::default());

        // perturbing the last day must not change any earlier flag
        features[5].ret = Some(5.0);
        let perturbed = compute_market_table(&features, &windows, &Thresholds::default());

        for (b, p) in baseline.iter().zip(&perturbed).take(5) {
            assert_eq!(b.market_anomaly_flag, p.market_anomaly_flag);
        }
    }
}
