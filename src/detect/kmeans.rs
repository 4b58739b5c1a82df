//! K-means centroid-distance detector
//!
//! Fits k clusters on the training split of the standardized design matrix,
//! derives a per-cluster distance threshold from the training rows, then
//! scores every row by its distance to the nearest fitted centroid.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;

use crate::config::KmeansParams;
use crate::data::rolling::percentile;

use super::DesignMatrix;

const MAX_ITER: usize = 100;
const TOL: f64 = 1e-9;

/// Per-row output of the centroid-distance method
#[derive(Debug, Clone)]
pub struct KmeansScore {
    pub cluster: usize,
    pub dist: f64,
    pub flag: bool,
    pub type_label: String,
    pub why: String,
}

/// Fitted k-means model
#[derive(Debug, Clone)]
pub struct KMeans {
    pub k: usize,
    pub centroids: Array2<f64>,
}

impl KMeans {
    /// Fit with Lloyd's algorithm from a seeded random initialization.
    pub fn fit(x: &ArrayView2<f64>, k: usize, seed: u64) -> Result<Self> {
        let n = x.nrows();
        if k == 0 {
            bail!("k must be positive");
        }
        if n < k {
            bail!("cannot fit k-means: {} rows for k={}", n, k);
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);
        let mut centroids = x.select(Axis(0), &indices[..k]);

        let mut assignments = vec![0usize; n];
        for _ in 0..MAX_ITER {
            for (i, row) in x.rows().into_iter().enumerate() {
                assignments[i] = nearest_centroid(&row, &centroids.view()).0;
            }

            let mut shift: f64 = 0.0;
            for c in 0..k {
                let members: Vec<usize> = assignments
                    .iter()
                    .enumerate()
                    .filter_map(|(i, &a)| (a == c).then_some(i))
                    .collect();
                // an emptied cluster keeps its previous centroid
                if members.is_empty() {
                    continue;
                }

                let updated = x
                    .select(Axis(0), &members)
                    .mean_axis(Axis(0))
                    .expect("non-empty cluster");
                shift = shift.max(squared_distance(&centroids.row(c), &updated.view()));
                centroids.row_mut(c).assign(&updated);
            }

            if shift < TOL {
                break;
            }
        }

        Ok(Self { k, centroids })
    }

    /// Nearest-centroid assignment and Euclidean distance per row.
    pub fn assign(&self, x: &ArrayView2<f64>) -> (Vec<usize>, Vec<f64>) {
        let mut labels = Vec::with_capacity(x.nrows());
        let mut dists = Vec::with_capacity(x.nrows());

        for row in x.rows() {
            let (label, dist_sq) = nearest_centroid(&row, &self.centroids.view());
            labels.push(label);
            dists.push(dist_sq.sqrt());
        }

        (labels, dists)
    }
}

fn nearest_centroid(row: &ArrayView1<f64>, centroids: &ArrayView2<f64>) -> (usize, f64) {
    let mut best = (0usize, f64::INFINITY);
    for (c, centroid) in centroids.rows().into_iter().enumerate() {
        let d = squared_distance(&centroid, row);
        if d < best.1 {
            best = (c, d);
        }
    }
    best
}

fn squared_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Fitted model plus per-cluster distance thresholds from the training rows
#[derive(Debug, Clone)]
pub struct CentroidCalibration {
    pub model: KMeans,
    /// q-th percentile of training distances per cluster id; clusters with
    /// no training members are absent and never flag
    pub thresholds: HashMap<usize, f64>,
    pub q: f64,
}

/// Fit the model and its per-cluster thresholds on training rows only.
pub fn calibrate_kmeans(
    design: &DesignMatrix,
    params: &KmeansParams,
) -> Result<CentroidCalibration> {
    let train_indices: Vec<usize> = design
        .train_mask
        .iter()
        .enumerate()
        .filter_map(|(i, &t)| t.then_some(i))
        .collect();
    if train_indices.is_empty() {
        bail!("k-means calibration requires a non-empty training split");
    }

    let train = design.x.select(Axis(0), &train_indices);
    let model = KMeans::fit(&train.view(), params.k, params.seed)?;
    let (labels, dists) = model.assign(&train.view());

    let mut thresholds = HashMap::new();
    for c in 0..model.k {
        let cluster_dists: Vec<f64> = labels
            .iter()
            .zip(dists.iter())
            .filter_map(|(&l, &d)| (l == c).then_some(d))
            .collect();
        if !cluster_dists.is_empty() {
            thresholds.insert(c, percentile(&cluster_dists, params.q));
        }
    }

    log::info!(
        "k-means calibrated on {} training rows, {} clusters with thresholds",
        train_indices.len(),
        thresholds.len()
    );

    Ok(CentroidCalibration {
        model,
        thresholds,
        q: params.q,
    })
}

/// Score every design-matrix row against the calibrated model.
///
/// Scoring reads the calibration and never alters it; flagged rows take the
/// rule detector's type label when the rule also flagged them.
pub fn score_kmeans(
    calibration: &CentroidCalibration,
    design: &DesignMatrix,
) -> HashMap<(NaiveDate, String), KmeansScore> {
    let (labels, dists) = calibration.model.assign(&design.x.view());

    let mut scores = HashMap::with_capacity(design.len());
    for (i, key) in design.keys.iter().enumerate() {
        let threshold = calibration
            .thresholds
            .get(&labels[i])
            .copied()
            .unwrap_or(f64::INFINITY);
        let flag = dists[i] > threshold;

        scores.insert(
            key.clone(),
            KmeansScore {
                cluster: labels[i],
                dist: dists[i],
                flag,
                type_label: if flag {
                    design.rule_types[i].clone()
                } else {
                    String::new()
                },
                why: if flag {
                    format!("dist > cluster_p{}", calibration.q)
                } else {
                    String::new()
                },
            },
        );
    }

    scores
}
