//! Rule-based anomaly detector
//!
//! Fixed-threshold triggers on the three rolling statistics, with a
//! deterministic type label and a human-readable reason per flagged row.

use crate::config::Thresholds;
use crate::features::FeatureRow;

use super::DetectionRow;

/// Score every row with full history against the configured thresholds.
///
/// An undefined statistic never triggers. The why string lists the fired
/// clauses in fixed {ret, vol, range} order using the configured values.
pub fn detect_rule(features: &[FeatureRow], thresholds: &Thresholds) -> Vec<DetectionRow> {
    features
        .iter()
        .filter(|row| row.has_history)
        .map(|row| score_row(row, thresholds))
        .collect()
}

fn score_row(row: &FeatureRow, thresholds: &Thresholds) -> DetectionRow {
    let trig_ret = row.ret_z.map_or(false, |z| z.abs() > thresholds.ret_z);
    let trig_vol = row.volz.map_or(false, |v| v > thresholds.volz);
    let trig_rng = row
        .range_pct
        .map_or(false, |p| p > thresholds.range_pct);

    let flagged = trig_ret || trig_vol || trig_rng;

    let (rule_type, rule_why) = if flagged {
        (
            type_label(row, trig_ret, trig_vol, trig_rng),
            why_string(thresholds, trig_ret, trig_vol, trig_rng),
        )
    } else {
        (String::new(), String::new())
    };

    DetectionRow {
        feature: row.clone(),
        rule_flag: flagged,
        rule_type,
        rule_why,
        kmeans: None,
        dbscan: None,
    }
}

fn type_label(row: &FeatureRow, trig_ret: bool, trig_vol: bool, trig_rng: bool) -> String {
    let mut parts = Vec::new();

    if trig_ret {
        let crash = row.ret.map_or(false, |r| r < 0.0);
        parts.push(if crash { "crash" } else { "spike" });
    }
    if trig_vol {
        parts.push("volume_shock");
    }
    if trig_rng {
        parts.push("range_spike");
    }

    if parts.is_empty() {
        // flagged with no parts is only reachable through floating-point
        // boundary cases; the historical label for that state is kept
        "range_spike".to_string()
    } else {
        parts.join(" + ")
    }
}

fn why_string(thresholds: &Thresholds, trig_ret: bool, trig_vol: bool, trig_rng: bool) -> String {
    let mut reasons = Vec::new();

    if trig_ret {
        reasons.push(format!("|ret_z| > {}", thresholds.ret_z));
    }
    if trig_vol {
        reasons.push(format!("volz > {}", thresholds.volz));
    }
    if trig_rng {
        reasons.push(format!("range_pct > {}", thresholds.range_pct));
    }

    reasons.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn feature(ret: Option<f64>, ret_z: Option<f64>, volz: Option<f64>, range_pct: Option<f64>) -> FeatureRow {
        FeatureRow {
            date: NaiveDate::from_ymd_opt(2020, 2, 27).unwrap(),
            ticker: "AAPL".to_string(),
            open: 100.0,
            high: 101.0,
            low: 99.0,
            close: 100.0,
            adj_close: 100.0,
            volume: 1000.0,
            ret,
            ret_z,
            ret_mu: Some(0.0),
            ret_sd: Some(0.01),
            log_volume: Some(6.9),
            volz,
            range: Some(0.02),
            range_pct,
            has_history: true,
        }
    }

    #[test]
    fn test_rows_without_history_are_dropped() {
        let mut row = feature(Some(0.1), Some(5.0), None, None);
        row.has_history = false;

        let detections = detect_rule(&[row], &Thresholds::default());
        assert!(detections.is_empty());
    }

    #[test]
    fn test_no_trigger_no_flag() {
        let row = feature(Some(0.001), Some(0.5), Some(0.5), Some(50.0));
        let detections = detect_rule(&[row], &Thresholds::default());

        assert!(!detections[0].rule_flag);
        assert_eq!(detections[0].rule_type, "");
        assert_eq!(detections[0].rule_why, "");
    }

    #[test]
    fn test_positive_jump_is_spike() {
        let row = feature(Some(0.30), Some(8.0), Some(0.0), Some(10.0));
        let detections = detect_rule(&[row], &Thresholds::default());

        assert!(detections[0].rule_flag);
        assert_eq!(detections[0].rule_type, "spike");
        assert_eq!(detections[0].rule_why, "|ret_z| > 2.5");
    }

    #[test]
    fn test_negative_jump_is_crash() {
        let row = feature(Some(-0.20), Some(-6.0), None, None);
        let detections = detect_rule(&[row], &Thresholds::default());

        assert_eq!(detections[0].rule_type, "crash");
    }

    #[test]
    fn test_combined_triggers_join_types_and_reasons() {
        let row = feature(Some(-0.20), Some(-6.0), Some(4.0), Some(99.0));
        let detections = detect_rule(&[row], &Thresholds::default());

        assert_eq!(
            detections[0].rule_type,
            "crash + volume_shock + range_spike"
        );
        assert_eq!(
            detections[0].rule_why,
            "|ret_z| > 2.5; volz > 2.5; range_pct > 95"
        );
    }

    #[test]
    fn test_range_only_trigger() {
        let row = feature(Some(0.001), Some(0.1), Some(0.1), Some(99.0));
        let detections = detect_rule(&[row], &Thresholds::default());

        assert!(detections[0].rule_flag);
        assert_eq!(detections[0].rule_type, "range_spike");
        assert_eq!(detections[0].rule_why, "range_pct > 95");
    }

    #[test]
    fn test_undefined_statistics_never_trigger() {
        // zero volume upstream: volz undefined, so no volume_shock
        let row = feature(Some(0.001), Some(0.1), None, Some(10.0));
        let detections = detect_rule(&[row], &Thresholds::default());

        assert!(!detections[0].rule_flag);
    }

    #[test]
    fn test_configured_thresholds_appear_in_why() {
        let thresholds = Thresholds {
            ret_z: 3.0,
            volz: 2.0,
            range_pct: 90.0,
            ..Thresholds::default()
        };
        let row = feature(Some(0.1), Some(3.5), Some(2.5), Some(95.0));
        let detections = detect_rule(&[row], &thresholds);

        assert_eq!(
            detections[0].rule_why,
            "|ret_z| > 3; volz > 2; range_pct > 90"
        );
    }
}
