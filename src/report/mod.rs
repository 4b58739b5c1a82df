//! Output tables
//!
//! Builds the daily anomaly card and the monthly mini-report, and handles
//! the CSV round trip for the tables the query/report tools consume.

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;
use std::path::Path;

use crate::detect::DetectionRow;
use crate::market::MarketDayRow;

/// One row of the daily anomaly card (rule-based method)
#[derive(Debug, Clone)]
pub struct DailyCardRow {
    pub date: NaiveDate,
    pub ticker: String,
    pub anomaly_flag: bool,
    pub ret: Option<f64>,
    pub ret_z: Option<f64>,
    pub volz: Option<f64>,
    pub range_pct: Option<f64>,
    pub type_label: String,
    pub why: String,
}

/// One row of the monthly mini-report: flagged card rows joined with the
/// market table for the same date
#[derive(Debug, Clone)]
pub struct MonthlyReportRow {
    pub date: NaiveDate,
    pub ticker: String,
    pub type_label: String,
    pub ret_z: Option<f64>,
    pub volz: Option<f64>,
    pub mkt_flag: Option<bool>,
    pub why: String,
    pub market_ret: Option<f64>,
    pub breadth: Option<f64>,
}

/// Build the daily anomaly card from the rule columns, sorted by
/// (date, ticker).
pub fn build_daily_card(rows: &[DetectionRow]) -> Vec<DailyCardRow> {
    let mut card: Vec<DailyCardRow> = rows
        .iter()
        .map(|row| DailyCardRow {
            date: row.feature.date,
            ticker: row.feature.ticker.clone(),
            anomaly_flag: row.rule_flag,
            ret: row.feature.ret,
            ret_z: row.feature.ret_z,
            volz: row.feature.volz,
            range_pct: row.feature.range_pct,
            type_label: row.rule_type.clone(),
            why: row.rule_why.clone(),
        })
        .collect();

    card.sort_by(|a, b| (a.date, a.ticker.as_str()).cmp(&(b.date, b.ticker.as_str())));
    card
}

/// Monthly mini-report for "YYYY-MM": the month's flagged tickers with the
/// market-day context left-joined on.
pub fn monthly_mini_report(
    card: &[DailyCardRow],
    market: &[MarketDayRow],
    month: &str,
) -> Result<Vec<MonthlyReportRow>> {
    let (year, month_num) = parse_month(month)?;

    let by_date: HashMap<NaiveDate, &MarketDayRow> =
        market.iter().map(|row| (row.date, row)).collect();

    let mut out: Vec<MonthlyReportRow> = card
        .iter()
        .filter(|row| {
            row.anomaly_flag && row.date.year() == year && row.date.month() == month_num
        })
        .map(|row| {
            let market_row = by_date.get(&row.date);
            MonthlyReportRow {
                date: row.date,
                ticker: row.ticker.clone(),
                type_label: row.type_label.clone(),
                ret_z: row.ret_z,
                volz: row.volz,
                mkt_flag: market_row.map(|m| m.market_anomaly_flag),
                why: row.why.clone(),
                market_ret: market_row.map(|m| m.market_ret),
                breadth: market_row.map(|m| m.breadth),
            }
        })
        .collect();

    out.sort_by(|a, b| (a.date, a.ticker.as_str()).cmp(&(b.date, b.ticker.as_str())));
    Ok(out)
}

fn parse_month(month: &str) -> Result<(i32, u32)> {
    let parts: Vec<&str> = month.split('-').collect();
    if parts.len() != 2 {
        bail!("month must be YYYY-MM, got '{month}'");
    }
    let year: i32 = parts[0].parse().with_context(|| format!("bad year in '{month}'"))?;
    let month_num: u32 = parts[1].parse().with_context(|| format!("bad month in '{month}'"))?;
    if !(1..=12).contains(&month_num) {
        bail!("month must be 1-12, got {month_num}");
    }
    Ok((year, month_num))
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn fmt_flag(flag: bool) -> String {
    if flag { "1" } else { "0" }.to_string()
}

/// Write the market day table.
pub fn write_market_csv(path: &Path, rows: &[MarketDayRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["date", "market_ret", "breadth", "market_anomaly_flag"])?;

    for row in rows {
        writer.write_record([
            row.date.to_string(),
            row.market_ret.to_string(),
            row.breadth.to_string(),
            fmt_flag(row.market_anomaly_flag),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Read the market day table back.
pub fn read_market_csv(path: &Path) -> Result<Vec<MarketDayRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record?;
        rows.push(MarketDayRow {
            date: parse_date(record.get(0).unwrap_or(""))?,
            market_ret: parse_f64(record.get(1).unwrap_or(""), "market_ret")?,
            breadth: parse_f64(record.get(2).unwrap_or(""), "breadth")?,
            market_anomaly_flag: record.get(3) == Some("1"),
        });
    }

    Ok(rows)
}

/// Write the daily anomaly card.
pub fn write_daily_card_csv(path: &Path, rows: &[DailyCardRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "date",
        "ticker",
        "anomaly_flag",
        "ret",
        "ret_z",
        "volz",
        "range_pct",
        "type",
        "why",
    ])?;

    for row in rows {
        writer.write_record([
            row.date.to_string(),
            row.ticker.clone(),
            fmt_flag(row.anomaly_flag),
            fmt_opt(row.ret),
            fmt_opt(row.ret_z),
            fmt_opt(row.volz),
            fmt_opt(row.range_pct),
            row.type_label.clone(),
            row.why.clone(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Read the daily anomaly card back.
pub fn read_daily_card_csv(path: &Path) -> Result<Vec<DailyCardRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or("");

        rows.push(DailyCardRow {
            date: parse_date(field(0))?,
            ticker: field(1).to_string(),
            anomaly_flag: field(2) == "1",
            ret: parse_opt_f64(field(3))?,
            ret_z: parse_opt_f64(field(4))?,
            volz: parse_opt_f64(field(5))?,
            range_pct: parse_opt_f64(field(6))?,
            type_label: field(7).to_string(),
            why: field(8).to_string(),
        });
    }

    Ok(rows)
}

/// Write the full features-and-flags table: every feature column plus each
/// method's flag/type/why and auxiliary columns. Undefined cells are
/// written empty, never zero.
pub fn write_features_csv(path: &Path, rows: &[DetectionRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "date",
        "ticker",
        "open",
        "high",
        "low",
        "close",
        "adj_close",
        "volume",
        "ret",
        "ret_z",
        "ret_mu",
        "ret_sd",
        "log_volume",
        "volz",
        "range",
        "range_pct",
        "has_history",
        "anomaly_flag_rule",
        "type_rule",
        "why_rule",
        "kmeans_cluster",
        "kmeans_dist",
        "anomaly_flag_kmeans",
        "type_kmeans",
        "why_kmeans",
        "dbscan_label",
        "anomaly_flag_dbscan",
        "type_dbscan",
        "why_dbscan",
    ])?;

    for row in rows {
        let f = &row.feature;
        let km = row.kmeans.as_ref();
        let db = row.dbscan.as_ref();

        writer.write_record([
            f.date.to_string(),
            f.ticker.clone(),
            f.open.to_string(),
            f.high.to_string(),
            f.low.to_string(),
            f.close.to_string(),
            f.adj_close.to_string(),
            f.volume.to_string(),
            fmt_opt(f.ret),
            fmt_opt(f.ret_z),
            fmt_opt(f.ret_mu),
            fmt_opt(f.ret_sd),
            fmt_opt(f.log_volume),
            fmt_opt(f.volz),
            fmt_opt(f.range),
            fmt_opt(f.range_pct),
            f.has_history.to_string(),
            fmt_flag(row.rule_flag),
            row.rule_type.clone(),
            row.rule_why.clone(),
            km.map(|s| s.cluster.to_string()).unwrap_or_default(),
            km.map(|s| s.dist.to_string()).unwrap_or_default(),
            km.map(|s| fmt_flag(s.flag)).unwrap_or_default(),
            km.map(|s| s.type_label.clone()).unwrap_or_default(),
            km.map(|s| s.why.clone()).unwrap_or_default(),
            db.map(|s| s.label.to_string()).unwrap_or_default(),
            db.map(|s| fmt_flag(s.flag)).unwrap_or_default(),
            db.map(|s| s.type_label.clone()).unwrap_or_default(),
            db.map(|s| s.why.clone()).unwrap_or_default(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

/// Write the monthly mini-report.
pub fn write_monthly_report_csv(path: &Path, rows: &[MonthlyReportRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "date",
        "ticker",
        "type",
        "ret_z",
        "volz",
        "mkt_flag",
        "why",
        "market_ret",
        "breadth",
    ])?;

    for row in rows {
        writer.write_record([
            row.date.to_string(),
            row.ticker.clone(),
            row.type_label.clone(),
            fmt_opt(row.ret_z),
            fmt_opt(row.volz),
            row.mkt_flag.map(fmt_flag).unwrap_or_default(),
            row.why.clone(),
            fmt_opt(row.market_ret),
            fmt_opt(row.breadth),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("bad date '{s}'"))
}

fn parse_f64(s: &str, name: &str) -> Result<f64> {
    s.parse().with_context(|| format!("bad {name} '{s}'"))
}

fn parse_opt_f64(s: &str) -> Result<Option<f64>> {
    if s.is_empty() {
        Ok(None)
    } else {
        Ok(Some(s.parse().with_context(|| format!("bad number '{s}'"))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::test_fixtures::detection_row;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, m, d).unwrap()
    }

    fn sample_card() -> Vec<DailyCardRow> {
        let mut a = detection_row("MSFT", date(2, 27), -6.0, 1.0, 50.0);
        a.rule_flag = true;
        a.rule_type = "crash".to_string();
        a.rule_why = "|ret_z| > 2.5".to_string();
        let b = detection_row("AAPL", date(2, 27), 0.5, 0.5, 50.0);
        let c = detection_row("AAPL", date(1, 15), 0.5, 0.5, 50.0);

        build_daily_card(&[a, b, c])
    }

    #[test]
    fn test_daily_card_sorted_by_date_then_ticker() {
        let card = sample_card();

        assert_eq!(card[0].date, date(1, 15));
        assert_eq!(card[1].ticker, "AAPL");
        assert_eq!(card[2].ticker, "MSFT");
        assert!(card[2].anomaly_flag);
        assert_eq!(card[2].type_label, "crash");
    }

    #[test]
    fn test_monthly_report_joins_market_context() {
        let card = sample_card();
        let market = vec![MarketDayRow {
            date: date(2, 27),
            market_ret: -0.044,
            breadth: 0.1,
            market_anomaly_flag: true,
        }];

        let report = monthly_mini_report(&card, &market, "2020-02").unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].ticker, "MSFT");
        assert_eq!(report[0].mkt_flag, Some(true));
        assert!((report[0].market_ret.unwrap() + 0.044).abs() < 1e-10);

        // a month with no flags produces an empty report
        let empty = monthly_mini_report(&card, &market, "2020-01").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_monthly_report_without_market_row() {
        let card = sample_card();
        let report = monthly_mini_report(&card, &[], "2020-02").unwrap();

        assert_eq!(report[0].mkt_flag, None);
        assert_eq!(report[0].market_ret, None);
    }

    #[test]
    fn test_bad_month_string_rejected() {
        assert!(parse_month("2020-13").is_err());
        assert!(parse_month("202002").is_err());
        assert!(parse_month("2020-xx").is_err());
    }

    #[test]
    fn test_market_csv_round_trip() {
        let dir = std::env::temp_dir().join("stock_anomaly_report_market");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("market_day_table.csv");

        let rows = vec![
            MarketDayRow {
                date: date(2, 26),
                market_ret: 0.001,
                breadth: 0.6,
                market_anomaly_flag: false,
            },
            MarketDayRow {
                date: date(2, 27),
                market_ret: -0.044,
                breadth: 0.1,
                market_anomaly_flag: true,
            },
        ];

        write_market_csv(&path, &rows).unwrap();
        let back = read_market_csv(&path).unwrap();

        assert_eq!(back.len(), 2);
        assert_eq!(back[1].date, date(2, 27));
        assert!(back[1].market_anomaly_flag);
        assert!(!back[0].market_anomaly_flag);
        assert!((back[1].breadth - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_daily_card_csv_keeps_undefined_cells_empty() {
        let dir = std::env::temp_dir().join("stock_anomaly_report_card");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("daily_anomaly_card.csv");

        let mut card = sample_card();
        card[0].volz = None;

        write_daily_card_csv(&path, &card).unwrap();
        let back = read_daily_card_csv(&path).unwrap();

        assert_eq!(back.len(), card.len());
        assert!(back[0].volz.is_none());
        assert_eq!(back[2].type_label, "crash");

        let raw = std::fs::read_to_string(&path).unwrap();
        let first_data_line = raw.lines().nth(1).unwrap();
        // undefined volz must be an empty cell, not a zero
        assert!(first_data_line.contains(",,"));
    }

    #[test]
    fn test_features_csv_distinguishes_unscored_rows() {
        let dir = std::env::temp_dir().join("stock_anomaly_report_features");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("features_and_flags.csv");

        let mut scored = detection_row("AAPL", date(2, 27), 1.0, 1.0, 50.0);
        scored.kmeans = Some(crate::detect::KmeansScore {
            cluster: 2,
            dist: 0.4,
            flag: false,
            type_label: String::new(),
            why: String::new(),
        });
        let unscored = detection_row("AAPL", date(2, 28), 1.0, 1.0, 50.0);

        write_features_csv(&path, &[scored, unscored]).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();

        // scored row carries the cluster id and a 0 flag; unscored row's
        // kmeans cells are all empty
        assert!(lines[1].contains(",2,0.4,0,"));
        assert!(lines[2].ends_with(",,,,,,,,"));
    }
}
