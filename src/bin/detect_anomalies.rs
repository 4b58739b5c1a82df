//! Run the full anomaly pipeline and write the output tables
//!
//! Usage: cargo run --bin detect_anomalies -- --data-dir data/raw --methods rule,kmeans

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use stock_anomaly::config::{
    parse_methods, DbscanParams, KmeansParams, Method, SplitConfig, Thresholds, Windows,
    DEFAULT_UNIVERSE,
};
use stock_anomaly::data::load_universe;
use stock_anomaly::detect::{
    build_design_matrix, calibrate_kmeans, detect_rule, merge_detections, score_kmeans,
    score_walk_forward,
};
use stock_anomaly::features::compute_features;
use stock_anomaly::market::compute_market_table;
use stock_anomaly::report::{
    build_daily_card, write_daily_card_csv, write_features_csv, write_market_csv,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Compute features, detect anomalies and write the output CSVs")]
struct Args {
    /// Folder containing stocks/ and etfs/ subfolders (or flat ticker CSVs)
    #[arg(long, default_value = "data/raw")]
    data_dir: PathBuf,

    /// Output folder for CSVs
    #[arg(long, default_value = "outputs")]
    out_dir: PathBuf,

    /// Comma-separated tickers
    #[arg(long, default_value_t = DEFAULT_UNIVERSE.join(","))]
    universe: String,

    /// Comma-separated methods: rule, kmeans, dbscan
    #[arg(long, default_value = "rule")]
    methods: String,

    /// Number of k-means clusters
    #[arg(long, default_value_t = 8)]
    k: usize,

    /// K-means cluster distance percentile threshold
    #[arg(long, default_value_t = 97.5)]
    q: f64,

    /// DBSCAN neighborhood radius
    #[arg(long, default_value_t = 0.9)]
    eps: f64,

    /// DBSCAN minimum neighborhood size
    #[arg(long, default_value_t = 15)]
    min_samples: usize,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    let universe: Vec<String> = args
        .universe
        .split(',')
        .filter(|t| !t.trim().is_empty())
        .map(|t| t.trim().to_uppercase())
        .collect();
    let methods = parse_methods(&args.methods)?;

    let windows = Windows::default();
    let thresholds = Thresholds::default();
    let split = SplitConfig::default();

    println!("Anomaly Detection Pipeline");
    println!("==========================");
    println!("Universe: {}", universe.join(", "));
    println!("Methods: {}", args.methods);
    println!();

    std::fs::create_dir_all(&args.out_dir)?;

    // Load and validate the universe, then derive features
    let prices = load_universe(&args.data_dir, &universe)?;
    println!("Loaded {} price rows", prices.len());

    let features = compute_features(prices, &windows)?;
    println!("Computed {} feature rows", features.len());

    // Market table comes straight from the features
    let market_table = compute_market_table(&features, &windows, &thresholds);
    let market_path = args.out_dir.join("market_day_table.csv");
    write_market_csv(&market_path, &market_table)?;

    // Rule-based detector is the mandatory baseline
    let detections = detect_rule(&features, &thresholds);
    println!(
        "Rule detector: {} of {} rows flagged",
        detections.iter().filter(|r| r.rule_flag).count(),
        detections.len()
    );

    // Optional clustering detectors share one standardized design matrix.
    // A failure here kills that method only; the rule path stays intact.
    let want_kmeans = methods.contains(&Method::Kmeans);
    let want_dbscan = methods.contains(&Method::Dbscan);

    let mut kmeans_scores = None;
    let mut dbscan_scores = None;

    if want_kmeans || want_dbscan {
        match build_design_matrix(&detections, &split) {
            Ok(design) => {
                if want_kmeans {
                    let params = KmeansParams {
                        k: args.k,
                        q: args.q,
                        ..KmeansParams::default()
                    };
                    match calibrate_kmeans(&design, &params) {
                        Ok(calibration) => {
                            let scores = score_kmeans(&calibration, &design);
                            println!(
                                "K-means: {} of {} rows flagged",
                                scores.values().filter(|s| s.flag).count(),
                                scores.len()
                            );
                            kmeans_scores = Some(scores);
                        }
                        Err(err) => log::error!("k-means calibration failed: {err:#}"),
                    }
                }

                if want_dbscan {
                    let params = DbscanParams {
                        eps: args.eps,
                        min_samples: args.min_samples,
                        ..DbscanParams::default()
                    };
                    let scores = score_walk_forward(&design, &split, &params);
                    println!(
                        "DBSCAN: {} of {} scored rows flagged",
                        scores.values().filter(|s| s.flag).count(),
                        scores.len()
                    );
                    dbscan_scores = Some(scores);
                }
            }
            Err(err) => log::error!("clustering design matrix failed: {err:#}"),
        }
    }

    let merged = merge_detections(detections, kmeans_scores, dbscan_scores);

    // Daily anomaly card (rule method) and the full audit table
    let card = build_daily_card(&merged);
    let card_path = args.out_dir.join("daily_anomaly_card.csv");
    write_daily_card_csv(&card_path, &card)?;

    let features_path = args.out_dir.join("features_and_flags.csv");
    write_features_csv(&features_path, &merged)?;

    println!();
    println!("Wrote: {}", card_path.display());
    println!("Wrote: {}", market_path.display());
    println!("Wrote: {}", features_path.display());

    Ok(())
}
