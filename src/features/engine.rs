//! Feature engine
//!
//! Turns validated price rows into one feature row per (ticker, date).
//! All rolling statistics are computed per ticker with one-step-lagged
//! windows, so a row never contributes to its own normalization.

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::Windows;
use crate::data::rolling::{lagged_percent_rank, lagged_zscore};
use crate::data::{partition_by_ticker, sort_and_validate, PriceRow};

/// Price row plus derived, leakage-safe statistics
///
/// Every derived field is `Option<f64>`: `None` means "cannot be evaluated
/// yet" (warm-up, missing input, degenerate statistic) and is distinct from
/// any numeric value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub ticker: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: f64,
    /// Simple return of adj_close vs the prior day, same ticker
    pub ret: Option<f64>,
    /// Rolling z-score of `ret` over the prior w_return days
    pub ret_z: Option<f64>,
    pub ret_mu: Option<f64>,
    pub ret_sd: Option<f64>,
    /// Natural log of volume; undefined at zero volume
    pub log_volume: Option<f64>,
    /// Rolling z-score of `log_volume` over the prior w_volume days
    pub volz: Option<f64>,
    /// (high - low) / close; undefined at zero close
    pub range: Option<f64>,
    /// Percentile rank of `range` against the prior w_range days, 0-100
    pub range_pct: Option<f64>,
    /// True once the ticker has at least max(windows) prior rows
    pub has_history: bool,
}

/// Compute the full feature table.
///
/// Input rows are sorted by (ticker, date); duplicate (ticker, date) pairs
/// are a precondition violation and fail the whole computation.
pub fn compute_features(rows: Vec<PriceRow>, windows: &Windows) -> Result<Vec<FeatureRow>> {
    let rows = sort_and_validate(rows)?;
    let min_obs = windows.max_window();

    let mut out = Vec::with_capacity(rows.len());
    for slice in partition_by_ticker(&rows) {
        compute_ticker_features(slice, windows, min_obs, &mut out);
    }

    log::debug!(
        "computed features for {} rows, {} with full history",
        out.len(),
        out.iter().filter(|r| r.has_history).count()
    );

    Ok(out)
}

fn compute_ticker_features(
    slice: &[PriceRow],
    windows: &Windows,
    min_obs: usize,
    out: &mut Vec<FeatureRow>,
) {
    let ret: Vec<Option<f64>> = slice
        .iter()
        .enumerate()
        .map(|(i, row)| {
            if i == 0 {
                None
            } else {
                let prev = slice[i - 1].adj_close;
                if prev != 0.0 {
                    Some(row.adj_close / prev - 1.0)
                } else {
                    None
                }
            }
        })
        .collect();

    let (ret_z, ret_mu, ret_sd) = lagged_zscore(&ret, windows.w_return);

    let log_volume: Vec<Option<f64>> = slice
        .iter()
        .map(|row| {
            if row.volume > 0.0 {
                Some(row.volume.ln())
            } else {
                None
            }
        })
        .collect();
    let (volz, _, _) = lagged_zscore(&log_volume, windows.w_volume);

    let range: Vec<Option<f64>> = slice.iter().map(PriceRow::range).collect();
    let range_pct = lagged_percent_rank(&range, windows.w_range);

    for (i, row) in slice.iter().enumerate() {
        out.push(FeatureRow {
            date: row.date,
            ticker: row.ticker.clone(),
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            adj_close: row.adj_close,
            volume: row.volume,
            ret: ret[i],
            ret_z: ret_z[i],
            ret_mu: ret_mu[i],
            ret_sd: ret_sd[i],
            log_volume: log_volume[i],
            volz: volz[i],
            range: range[i],
            range_pct: range_pct[i],
            has_history: i >= min_obs,
        });
    }
}
