//! Date query: market status plus anomalous tickers for one day
//!
//! Usage: cargo run --bin query -- --out-dir outputs --date 2020-02-27

use anyhow::Result;
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

use stock_anomaly::report::{read_daily_card_csv, read_market_csv};

#[derive(Parser, Debug)]
#[command(author, version, about = "Show market status and anomalous tickers for a date")]
struct Args {
    /// Folder containing market_day_table.csv and daily_anomaly_card.csv
    #[arg(long, default_value = "outputs")]
    out_dir: PathBuf,

    /// Date to query (YYYY-MM-DD)
    #[arg(long)]
    date: NaiveDate,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let market = read_market_csv(&args.out_dir.join("market_day_table.csv"))?;
    let card = read_daily_card_csv(&args.out_dir.join("daily_anomaly_card.csv"))?;

    let market_row = match market.iter().find(|row| row.date == args.date) {
        Some(row) => row,
        None => {
            println!(
                "No market row found for date={}. Did you run detect_anomalies?",
                args.date
            );
            return Ok(());
        }
    };

    println!("=== Market Status ===");
    println!("date: {}", market_row.date);
    println!("market_ret: {:.6}", market_row.market_ret);
    println!("breadth: {:.3}", market_row.breadth);
    println!(
        "market_anomaly_flag: {}",
        if market_row.market_anomaly_flag { 1 } else { 0 }
    );

    println!();
    println!("=== Anomalous Tickers (rule-based) ===");
    let mut flagged: Vec<_> = card
        .iter()
        .filter(|row| row.date == args.date && row.anomaly_flag)
        .collect();
    flagged.sort_by(|a, b| a.ticker.cmp(&b.ticker));

    if flagged.is_empty() {
        println!("None");
        return Ok(());
    }

    println!(
        "{:>6} {:>24} {:>10} {:>8} {:>8} {:>10}  {}",
        "Ticker", "Type", "Return%", "ret_z", "volz", "range_pct", "Why"
    );
    for row in flagged {
        let opt = |v: Option<f64>| v.map(|x| format!("{x:.2}")).unwrap_or_default();
        println!(
            "{:>6} {:>24} {:>10} {:>8} {:>8} {:>10}  {}",
            row.ticker,
            row.type_label,
            row.ret.map(|r| format!("{:+.2}", r * 100.0)).unwrap_or_default(),
            opt(row.ret_z),
            opt(row.volz),
            opt(row.range_pct),
            row.why
        );
    }

    Ok(())
}
