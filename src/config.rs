//! Run configuration
//!
//! Window sizes, detection thresholds, the calendar split for the
//! clustering protocol, and per-method hyperparameters. Everything here is
//! built once at startup and passed by reference into the pipeline stages.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Default ticker universe
pub const DEFAULT_UNIVERSE: [&str; 6] = ["QQQ", "AAPL", "MSFT", "NVDA", "AMZN", "META"];

/// Rolling window sizes, in trading days
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Windows {
    /// Window for return z-scores
    pub w_return: usize,
    /// Window for log-volume z-scores
    pub w_volume: usize,
    /// Window for intraday-range percentile ranks
    pub w_range: usize,
}

impl Default for Windows {
    fn default() -> Self {
        Self {
            w_return: 63,
            w_volume: 21,
            w_range: 63,
        }
    }
}

impl Windows {
    /// Largest configured window; a ticker needs this many prior rows
    /// before its rows are scoreable.
    pub fn max_window(&self) -> usize {
        self.w_return.max(self.w_volume).max(self.w_range)
    }
}

/// Detection thresholds
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Thresholds {
    /// Absolute return z-score cutoff
    pub ret_z: f64,
    /// Log-volume z-score cutoff
    pub volz: f64,
    /// Intraday-range percentile cutoff (0-100)
    pub range_pct: f64,
    /// Market breadth floor (fraction of tickers with positive return)
    pub market_breadth: f64,
    /// Percentile of |market_ret| over rolling history (0-100)
    pub market_ret_pct: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            ret_z: 2.5,
            volz: 2.5,
            range_pct: 95.0,
            market_breadth: 0.30,
            market_ret_pct: 95.0,
        }
    }
}

/// Calendar split for calibrating and scoring the clustering detectors.
///
/// Training rows fit the scaler, the k-means model and its per-cluster
/// thresholds; validation + test rows are the walk-forward scoring range.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SplitConfig {
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub val_start: NaiveDate,
    pub val_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
}

impl Default for SplitConfig {
    fn default() -> Self {
        // Train = 2018, Val = 2019, Test = 2020 Q1
        Self {
            train_start: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
            train_end: NaiveDate::from_ymd_opt(2018, 12, 31).unwrap(),
            val_start: NaiveDate::from_ymd_opt(2019, 1, 1).unwrap(),
            val_end: NaiveDate::from_ymd_opt(2019, 12, 31).unwrap(),
            test_start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            test_end: NaiveDate::from_ymd_opt(2020, 3, 31).unwrap(),
        }
    }
}

impl SplitConfig {
    /// True if the date falls in the training period.
    pub fn in_train(&self, date: NaiveDate) -> bool {
        date >= self.train_start && date <= self.train_end
    }

    /// True if the date falls in the validation period.
    pub fn in_val(&self, date: NaiveDate) -> bool {
        date >= self.val_start && date <= self.val_end
    }

    /// True if the date falls in the test period.
    pub fn in_test(&self, date: NaiveDate) -> bool {
        date >= self.test_start && date <= self.test_end
    }

    /// True if the date is in the walk-forward scoring range (val + test).
    pub fn in_score_range(&self, date: NaiveDate) -> bool {
        self.in_val(date) || self.in_test(date)
    }
}

/// K-means centroid-distance detector hyperparameters
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct KmeansParams {
    /// Number of clusters
    pub k: usize,
    /// Per-cluster distance percentile for the flag threshold (0-100)
    pub q: f64,
    /// RNG seed for centroid initialization
    pub seed: u64,
}

impl Default for KmeansParams {
    fn default() -> Self {
        Self {
            k: 8,
            q: 97.5,
            seed: 42,
        }
    }
}

/// DBSCAN walk-forward detector hyperparameters
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct DbscanParams {
    /// Neighborhood radius in standardized feature space
    pub eps: f64,
    /// Minimum neighborhood size for a core point
    pub min_samples: usize,
    /// Minimum history rows required before a month is scored
    pub min_history: usize,
}

impl Default for DbscanParams {
    fn default() -> Self {
        Self {
            eps: 0.9,
            min_samples: 15,
            min_history: 200,
        }
    }
}

/// Detection method selector
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Rule,
    Kmeans,
    Dbscan,
}

impl FromStr for Method {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "rule" => Ok(Method::Rule),
            "kmeans" => Ok(Method::Kmeans),
            "dbscan" => Ok(Method::Dbscan),
            other => bail!("unknown method '{other}' (expected rule, kmeans or dbscan)"),
        }
    }
}

/// Parse a comma-separated method list, e.g. "rule,kmeans".
pub fn parse_methods(s: &str) -> Result<Vec<Method>> {
    s.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(str::parse)
        .collect()
}
