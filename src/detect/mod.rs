//! Anomaly detectors
//!
//! The rule-based detector is the mandatory baseline; the k-means
//! centroid-distance and DBSCAN walk-forward detectors are optional and
//! merge their scores onto it by (date, ticker).

mod dbscan;
mod kmeans;
mod merge;
mod rule;

pub use dbscan::{score_walk_forward, Dbscan, DbscanScore};
pub use kmeans::{calibrate_kmeans, score_kmeans, CentroidCalibration, KMeans, KmeansScore};
pub use merge::merge_detections;
pub use rule::detect_rule;

use anyhow::{bail, Result};
use chrono::NaiveDate;
use ndarray::Array2;

use crate::config::SplitConfig;
use crate::data::Standardizer;
use crate::features::FeatureRow;

/// Feature row plus per-method flags and labels
///
/// `kmeans`/`dbscan` are `None` wherever that method did not score the row;
/// "not scored" is distinct from "scored, not anomalous".
#[derive(Debug, Clone)]
pub struct DetectionRow {
    pub feature: FeatureRow,
    pub rule_flag: bool,
    pub rule_type: String,
    pub rule_why: String,
    pub kmeans: Option<KmeansScore>,
    pub dbscan: Option<DbscanScore>,
}

/// Standardized {ret_z, volz, range_pct} matrix for the clustering methods
///
/// Standardization statistics come from the training split only; validation
/// and test rows are transformed with the same parameters.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    /// (date, ticker) key per matrix row
    pub keys: Vec<(NaiveDate, String)>,
    /// Rule-detector type label per row (empty when the rule did not flag)
    pub rule_types: Vec<String>,
    /// True for rows inside the training split
    pub train_mask: Vec<bool>,
    /// Standardized features, one row per key
    pub x: Array2<f64>,
}

impl DesignMatrix {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Build the standardized design matrix from rows where all three inputs
/// are defined.
///
/// An empty training split is fatal for the clustering methods (there is
/// nothing to calibrate on); the rule-based path is unaffected.
pub fn build_design_matrix(rows: &[DetectionRow], split: &SplitConfig) -> Result<DesignMatrix> {
    let mut keys = Vec::new();
    let mut rule_types = Vec::new();
    let mut train_mask = Vec::new();
    let mut raw = Vec::new();

    for row in rows {
        let (ret_z, volz, range_pct) = match (
            row.feature.ret_z,
            row.feature.volz,
            row.feature.range_pct,
        ) {
            (Some(r), Some(v), Some(p)) => (r, v, p),
            _ => continue,
        };

        keys.push((row.feature.date, row.feature.ticker.clone()));
        rule_types.push(row.rule_type.clone());
        train_mask.push(split.in_train(row.feature.date));
        raw.extend_from_slice(&[ret_z, volz, range_pct]);
    }

    if keys.is_empty() {
        bail!("no rows with defined ret_z, volz and range_pct");
    }

    let raw = Array2::from_shape_vec((keys.len(), 3), raw).expect("row-major design matrix");

    let train_indices: Vec<usize> = train_mask
        .iter()
        .enumerate()
        .filter_map(|(i, &t)| t.then_some(i))
        .collect();
    if train_indices.is_empty() {
        bail!("no design-matrix rows in the training split; cannot calibrate");
    }

    let train = raw.select(ndarray::Axis(0), &train_indices);
    let scaler = Standardizer::fit(&train.view())?;
    let x = scaler.transform(&raw.view());

    Ok(DesignMatrix {
        keys,
        rule_types,
        train_mask,
        x,
    })
}
