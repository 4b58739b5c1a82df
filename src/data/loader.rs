//! CSV universe loader
//!
//! Reads one CSV per ticker from a Kaggle-style layout
//! (`data_dir/stocks/T.csv`, `data_dir/etfs/T.csv`, or flat `data_dir/T.csv`)
//! and returns validated, sorted price rows.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

use super::price::{sort_and_validate, PriceRow};

/// Column headers every input file must carry
pub const REQUIRED_COLS: [&str; 7] = ["Date", "Open", "High", "Low", "Close", "Adj Close", "Volume"];

/// Load and validate the full universe.
///
/// A missing file, a missing required column, an unparseable value, or a
/// ticker with zero rows is fatal; the pipeline never partially computes.
pub fn load_universe(data_dir: &Path, tickers: &[String]) -> Result<Vec<PriceRow>> {
    let mut rows = Vec::new();

    for ticker in tickers {
        let path = locate_csv(data_dir, ticker)?;
        let ticker_rows = read_one_csv(&path, ticker)
            .with_context(|| format!("failed to load {} from {}", ticker, path.display()))?;

        log::info!("loaded {} rows for {}", ticker_rows.len(), ticker);
        rows.extend(ticker_rows);
    }

    sort_and_validate(rows)
}

fn locate_csv(data_dir: &Path, ticker: &str) -> Result<PathBuf> {
    let candidates = [
        data_dir.join("stocks").join(format!("{ticker}.csv")),
        data_dir.join("etfs").join(format!("{ticker}.csv")),
        data_dir.join(format!("{ticker}.csv")),
    ];

    match candidates.iter().find(|p| p.exists()) {
        Some(path) => Ok(path.clone()),
        None => bail!(
            "no CSV found for {}; looked in: {}",
            ticker,
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn read_one_csv(path: &Path, ticker: &str) -> Result<Vec<PriceRow>> {
    let mut reader = csv::Reader::from_path(path)?;

    let headers = reader.headers()?.clone();

    let mut col_idx = [0usize; 7];
    let mut missing = Vec::new();
    for (slot, name) in col_idx.iter_mut().zip(REQUIRED_COLS) {
        match headers.iter().position(|h| h == name) {
            Some(idx) => *slot = idx,
            None => missing.push(name),
        }
    }
    if !missing.is_empty() {
        bail!("{}: missing columns {:?}", ticker, missing);
    }
    let [date_i, open_i, high_i, low_i, close_i, adj_i, vol_i] = col_idx;

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;

        let field = |i: usize| record.get(i).unwrap_or("");
        let date = NaiveDate::parse_from_str(field(date_i), "%Y-%m-%d")
            .with_context(|| format!("{}: bad date '{}' at record {}", ticker, field(date_i), line + 1))?;
        let number = |i: usize, name: &str| -> Result<f64> {
            field(i)
                .parse()
                .with_context(|| format!("{}: bad {} '{}' on {}", ticker, name, field(i), date))
        };

        rows.push(PriceRow {
            date,
            ticker: ticker.to_string(),
            open: number(open_i, "Open")?,
            high: number(high_i, "High")?,
            low: number(low_i, "Low")?,
            close: number(close_i, "Close")?,
            adj_close: number(adj_i, "Adj Close")?,
            volume: number(vol_i, "Volume")?,
        });
    }

    if rows.is_empty() {
        bail!("{}: file has zero data rows", ticker);
    }

    rows.sort_by_key(|r| r.date);
    Ok(rows)
}
