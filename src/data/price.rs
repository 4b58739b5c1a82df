//! Daily price bar records
//!
//! One validated row per (ticker, date), sorted ascending by date within
//! each ticker.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Single daily OHLCV bar for one ticker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRow {
    pub date: NaiveDate,
    pub ticker: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: f64,
}

impl PriceRow {
    /// Intraday range normalized by close: (high - low) / close.
    ///
    /// None when close is zero; the statistic cannot be evaluated.
    pub fn range(&self) -> Option<f64> {
        if self.close != 0.0 {
            Some((self.high - self.low) / self.close)
        } else {
            None
        }
    }
}

/// Sort rows by (ticker, date) and reject duplicate (ticker, date) pairs.
///
/// Duplicates are a precondition violation owed to the Loader; nothing is
/// de-duplicated silently.
pub fn sort_and_validate(mut rows: Vec<PriceRow>) -> Result<Vec<PriceRow>> {
    rows.sort_by(|a, b| (a.ticker.as_str(), a.date).cmp(&(b.ticker.as_str(), b.date)));

    for pair in rows.windows(2) {
        if pair[0].ticker == pair[1].ticker && pair[0].date == pair[1].date {
            bail!(
                "duplicate row for ticker {} on {}",
                pair[0].ticker,
                pair[0].date
            );
        }
    }

    Ok(rows)
}

/// Split sorted rows into contiguous per-ticker slices.
///
/// Rolling windows must never span a ticker boundary; each slice is an
/// independent ordered series.
pub fn partition_by_ticker(rows: &[PriceRow]) -> Vec<&[PriceRow]> {
    let mut slices = Vec::new();
    let mut start = 0;

    for i in 1..=rows.len() {
        if i == rows.len() || rows[i].ticker != rows[start].ticker {
            slices.push(&rows[start..i]);
            start = i;
        }
    }

    slices
}
