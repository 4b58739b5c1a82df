//! DBSCAN walk-forward detector
//!
//! Re-fits a density clustering on an expanding history every calendar
//! month in the scoring range and labels the month's rows from the joint
//! fit; points outside every dense cluster carry the noise label and are
//! flagged as anomalies.

use chrono::{Datelike, NaiveDate};
use ndarray::{Array2, ArrayView2, Axis};
use std::collections::{BTreeSet, HashMap};

use crate::config::{DbscanParams, SplitConfig};

use super::DesignMatrix;

/// Noise label: the point belongs to no dense cluster
pub const NOISE: i32 = -1;
const UNCLASSIFIED: i32 = -2;

/// Per-row output of the density walk-forward method
#[derive(Debug, Clone)]
pub struct DbscanScore {
    /// Cluster id from the joint fit; -1 is noise
    pub label: i32,
    pub flag: bool,
    pub type_label: String,
    pub why: String,
}

/// Density-based clustering with Euclidean neighborhoods
#[derive(Clone, Copy, Debug)]
pub struct Dbscan {
    /// Neighborhood radius
    pub eps: f64,
    /// Minimum neighborhood size (the point itself included) for a core point
    pub min_samples: usize,
}

impl Dbscan {
    pub fn new(eps: f64, min_samples: usize) -> Self {
        Self { eps, min_samples }
    }

    /// Cluster all rows; returns one label per row, -1 for noise.
    pub fn fit(&self, x: &ArrayView2<f64>) -> Vec<i32> {
        let n = x.nrows();
        let mut labels = vec![UNCLASSIFIED; n];
        let mut cluster = 0;

        for i in 0..n {
            if labels[i] != UNCLASSIFIED {
                continue;
            }

            let neighbors = self.region_query(x, i);
            if neighbors.len() < self.min_samples {
                labels[i] = NOISE;
                continue;
            }

            labels[i] = cluster;
            let mut queue: Vec<usize> = neighbors;
            while let Some(j) = queue.pop() {
                if labels[j] == NOISE {
                    // border point reachable from a core point
                    labels[j] = cluster;
                }
                if labels[j] != UNCLASSIFIED {
                    continue;
                }

                labels[j] = cluster;
                let j_neighbors = self.region_query(x, j);
                if j_neighbors.len() >= self.min_samples {
                    queue.extend(j_neighbors);
                }
            }

            cluster += 1;
        }

        labels
    }

    fn region_query(&self, x: &ArrayView2<f64>, i: usize) -> Vec<usize> {
        let eps_sq = self.eps * self.eps;
        let row = x.row(i);

        (0..x.nrows())
            .filter(|&j| {
                let d: f64 = row
                    .iter()
                    .zip(x.row(j).iter())
                    .map(|(a, b)| (a - b).powi(2))
                    .sum();
                d <= eps_sq
            })
            .collect()
    }
}

/// Label a new block against its history with one fresh joint fit.
///
/// Density clustering has no out-of-sample assignment, so the model is fit
/// on [history; block] and the block's labels are read off the tail; nothing
/// is cached between calls.
pub fn joint_score(model: &Dbscan, history: &ArrayView2<f64>, block: &ArrayView2<f64>) -> Vec<i32> {
    let mut joint = Array2::zeros((history.nrows() + block.nrows(), history.ncols()));
    joint
        .slice_mut(ndarray::s![..history.nrows(), ..])
        .assign(history);
    joint
        .slice_mut(ndarray::s![history.nrows().., ..])
        .assign(block);

    let labels = model.fit(&joint.view());
    labels[history.nrows()..].to_vec()
}

/// Score validation + test rows month by month on an expanding history.
///
/// A month whose history holds fewer than `min_history` rows is skipped
/// entirely; its rows stay un-scored rather than un-anomalous.
pub fn score_walk_forward(
    design: &DesignMatrix,
    split: &SplitConfig,
    params: &DbscanParams,
) -> HashMap<(NaiveDate, String), DbscanScore> {
    let model = Dbscan::new(params.eps, params.min_samples);

    let months: BTreeSet<(i32, u32)> = design
        .keys
        .iter()
        .filter(|(date, _)| split.in_score_range(*date))
        .map(|(date, _)| (date.year(), date.month()))
        .collect();

    let mut scores = HashMap::new();
    for (year, month) in months {
        let block: Vec<usize> = (0..design.len())
            .filter(|&i| {
                let date = design.keys[i].0;
                split.in_score_range(date) && date.year() == year && date.month() == month
            })
            .collect();

        let first_day = block
            .iter()
            .map(|&i| design.keys[i].0)
            .min()
            .expect("non-empty month block");
        let history: Vec<usize> = (0..design.len())
            .filter(|&i| design.keys[i].0 < first_day)
            .collect();

        if history.len() < params.min_history {
            log::warn!(
                "skipping month {year}-{month:02}: only {} history rows (need {})",
                history.len(),
                params.min_history
            );
            continue;
        }

        let x_hist = design.x.select(Axis(0), &history);
        let x_block = design.x.select(Axis(0), &block);
        let labels = joint_score(&model, &x_hist.view(), &x_block.view());

        for (&i, &label) in block.iter().zip(labels.iter()) {
            let flag = label == NOISE;
            scores.insert(
                design.keys[i].clone(),
                DbscanScore {
                    label,
                    flag,
                    type_label: if flag {
                        design.rule_types[i].clone()
                    } else {
                        String::new()
                    },
                    why: if flag {
                        "dbscan label = -1 (noise)".to_string()
                    } else {
                        String::new()
                    },
                },
            );
        }

        log::debug!(
            "scored {}-{:02}: {} rows against {} history rows",
            year,
            month,
            block.len(),
            history.len()
        );
    }

    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::build_design_matrix;
    use crate::detect::test_fixtures::detection_row;
    use crate::detect::DetectionRow;

    #[test]
    fn test_dense_cluster_vs_noise() {
        // 30 points around the origin, one far away
        let mut data = Vec::new();
        for i in 0..30 {
            let jitter = (i % 6) as f64 * 0.05;
            data.extend_from_slice(&[jitter, -jitter]);
        }
        data.extend_from_slice(&[50.0, 50.0]);
        let x = Array2::from_shape_vec((31, 2), data).unwrap();

        let labels = Dbscan::new(0.9, 5).fit(&x.view());
        assert!(labels[..30].iter().all(|&l| l == 0));
        assert_eq!(labels[30], NOISE);
    }

    #[test]
    fn test_two_separated_clusters() {
        let mut data = Vec::new();
        for i in 0..10 {
            data.extend_from_slice(&[(i % 3) as f64 * 0.1, 0.0]);
        }
        for i in 0..10 {
            data.extend_from_slice(&[20.0 + (i % 3) as f64 * 0.1, 0.0]);
        }
        let x = Array2::from_shape_vec((20, 2), data).unwrap();

        let labels = Dbscan::new(0.5, 4).fit(&x.view());
        assert!(labels[..10].iter().all(|&l| l == labels[0]));
        assert!(labels[10..].iter().all(|&l| l == labels[10]));
        assert_ne!(labels[0], labels[10]);
        assert!(labels.iter().all(|&l| l != NOISE));
    }

    #[test]
    fn test_joint_score_labels_the_tail_only() {
        let mut data = Vec::new();
        for i in 0..20 {
            data.extend_from_slice(&[(i % 4) as f64 * 0.1, 0.0]);
        }
        let history = Array2::from_shape_vec((20, 2), data).unwrap();
        let block =
            Array2::from_shape_vec((2, 2), vec![0.15, 0.0, 40.0, 40.0]).unwrap();

        let labels = joint_score(&Dbscan::new(0.5, 4), &history.view(), &block.view());
        assert_eq!(labels.len(), 2);
        assert_ne!(labels[0], NOISE);
        assert_eq!(labels[1], NOISE);
    }

    fn walk_forward_rows(history_len: usize) -> Vec<DetectionRow> {
        let start = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
        let mut rows = Vec::new();
        for i in 0..history_len {
            let jitter = (i % 7) as f64 * 0.01;
            rows.push(detection_row(
                "A",
                start + chrono::Days::new(i as u64),
                jitter,
                -jitter,
                50.0,
            ));
        }
        // January 2019: two ordinary rows and one far outlier
        let jan = |d: u32| NaiveDate::from_ymd_opt(2019, 1, d).unwrap();
        rows.push(detection_row("A", jan(2), 0.02, -0.02, 50.0));
        rows.push(detection_row("A", jan(3), 0.03, -0.03, 50.0));
        let mut outlier = detection_row("A", jan(6), 30.0, 30.0, 99.0);
        outlier.rule_flag = true;
        outlier.rule_type = "spike + volume_shock".to_string();
        rows.push(outlier);
        rows
    }

    #[test]
    fn test_walk_forward_flags_noise_and_mirrors_rule_type() {
        let rows = walk_forward_rows(210);
        let split = SplitConfig::default();
        let design = build_design_matrix(&rows, &split).unwrap();

        let params = DbscanParams {
            eps: 0.9,
            min_samples: 10,
            min_history: 200,
        };
        let scores = score_walk_forward(&design, &split, &params);

        let jan = |d: u32| NaiveDate::from_ymd_opt(2019, 1, d).unwrap();
        let ordinary = &scores[&(jan(2), "A".to_string())];
        assert!(!ordinary.flag);
        assert_ne!(ordinary.label, NOISE);
        assert!(ordinary.why.is_empty());

        let outlier = &scores[&(jan(6), "A".to_string())];
        assert!(outlier.flag);
        assert_eq!(outlier.label, NOISE);
        assert_eq!(outlier.type_label, "spike + volume_shock");
        assert_eq!(outlier.why, "dbscan label = -1 (noise)");
    }

    #[test]
    fn test_short_history_month_is_skipped() {
        // 199 history rows: one short of the floor, so January stays
        // un-scored rather than un-anomalous
        let rows = walk_forward_rows(199);
        let split = SplitConfig::default();
        let design = build_design_matrix(&rows, &split).unwrap();

        let params = DbscanParams {
            eps: 0.9,
            min_samples: 10,
            min_history: 200,
        };
        let scores = score_walk_forward(&design, &split, &params);
        assert!(scores.is_empty());
    }

    #[test]
    fn test_history_grows_month_over_month() {
        let mut rows = walk_forward_rows(210);
        // add a February row; its history must include all of January
        rows.push(detection_row(
            "A",
            NaiveDate::from_ymd_opt(2019, 2, 4).unwrap(),
            0.01,
            -0.01,
            50.0,
        ));

        let split = SplitConfig::default();
        let design = build_design_matrix(&rows, &split).unwrap();

        // histories are strictly before each month's first day, so the
        // February history is the January history plus January's rows
        let jan_first = NaiveDate::from_ymd_opt(2019, 1, 2).unwrap();
        let feb_first = NaiveDate::from_ymd_opt(2019, 2, 4).unwrap();
        let jan_hist: Vec<_> = design.keys.iter().filter(|(d, _)| *d < jan_first).collect();
        let feb_hist: Vec<_> = design.keys.iter().filter(|(d, _)| *d < feb_first).collect();

        assert!(feb_hist.len() > jan_hist.len());
        assert!(jan_hist.iter().all(|k| feb_hist.contains(k)));

        let scores = score_walk_forward(&design, &split, &DbscanParams::default());
        assert!(scores.contains_key(&(feb_first, "A".to_string())));
    }
}
