//! Merging optional detector outputs onto the rule baseline
//!
//! Left-merge by (date, ticker): every rule row survives; optional method
//! columns stay `None` wherever that method produced no score.

use chrono::NaiveDate;
use std::collections::HashMap;

use super::{DbscanScore, DetectionRow, KmeansScore};

/// Attach optional method scores to the rule-detector rows.
pub fn merge_detections(
    mut rows: Vec<DetectionRow>,
    kmeans: Option<HashMap<(NaiveDate, String), KmeansScore>>,
    dbscan: Option<HashMap<(NaiveDate, String), DbscanScore>>,
) -> Vec<DetectionRow> {
    for row in &mut rows {
        let key = (row.feature.date, row.feature.ticker.clone());

        if let Some(scores) = &kmeans {
            row.kmeans = scores.get(&key).cloned();
        }
        if let Some(scores) = &dbscan {
            row.dbscan = scores.get(&key).cloned();
        }
    }

    rows
}
