//! Leakage-safe feature engineering
//!
//! Derives per-ticker return, volume and intraday-range statistics whose
//! rolling windows use strictly prior observations only.

mod engine;

pub use engine::{compute_features, FeatureRow};
