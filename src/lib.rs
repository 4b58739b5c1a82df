//! Anomaly Detection for Daily Stock Data
//!
//! This library turns daily OHLCV series for a fixed ticker universe into a
//! day-by-day anomaly signal. A deterministic rule-based detector is the
//! baseline; k-means centroid-distance and DBSCAN walk-forward detectors
//! can be layered on top. Every rolling statistic is leakage-safe: a row is
//! only ever scored against strictly earlier data.
//!
//! # Modules
//!
//! - `config`: windows, thresholds, calendar split and method hyperparameters
//! - `data`: price rows, CSV universe loader, rolling statistics, standardizer
//! - `features`: leakage-safe per-ticker feature engineering
//! - `market`: market-wide aggregation and the market anomaly flag
//! - `detect`: rule, k-means and DBSCAN detectors plus the merge step
//! - `report`: daily anomaly card, monthly mini-report, CSV tables
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use stock_anomaly::config::{Thresholds, Windows};
//! use stock_anomaly::data::load_universe;
//! use stock_anomaly::detect::detect_rule;
//! use stock_anomaly::features::compute_features;
//!
//! let windows = Windows::default();
//! let thresholds = Thresholds::default();
//!
//! let tickers = vec!["AAPL".to_string(), "MSFT".to_string()];
//! let prices = load_universe(Path::new("data/raw"), &tickers).unwrap();
//! let features = compute_features(prices, &windows).unwrap();
//! let detections = detect_rule(&features, &thresholds);
//! ```

pub mod config;
pub mod data;
pub mod detect;
pub mod features;
pub mod market;
pub mod report;
