//! Monthly mini-report: flagged tickers of one month with market context
//!
//! Usage: cargo run --bin monthly_report -- --out-dir outputs --month 2020-02

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use stock_anomaly::report::{
    monthly_mini_report, read_daily_card_csv, read_market_csv, write_monthly_report_csv,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Write the monthly mini-report for YYYY-MM")]
struct Args {
    /// Folder containing market_day_table.csv and daily_anomaly_card.csv
    #[arg(long, default_value = "outputs")]
    out_dir: PathBuf,

    /// Month to report (YYYY-MM)
    #[arg(long)]
    month: String,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let market = read_market_csv(&args.out_dir.join("market_day_table.csv"))?;
    let card = read_daily_card_csv(&args.out_dir.join("daily_anomaly_card.csv"))?;

    let report = monthly_mini_report(&card, &market, &args.month)?;
    println!("{} flagged rows in {}", report.len(), args.month);

    let out_path = args
        .out_dir
        .join(format!("monthly_report_{}.csv", args.month));
    write_monthly_report_csv(&out_path, &report)?;
    println!("Wrote: {}", out_path.display());

    Ok(())
}
