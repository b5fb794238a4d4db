//! Report types for evaluation results.
//!
//! A run produces one [`RunReport`] carrying the authoritative
//! cumulative-matrix mean IoU, the averaged per-sample scores, and one
//! [`SampleResult`] row per evaluated sample. Reports serialize to JSON
//! and summarize to CSV.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metrics::{ConfusionMatrix, IouReport};
use crate::stats::{Summary, mean};

/// Scores recorded for a single evaluated sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleResult {
    /// Zero-based position of the sample in the dataset pass.
    pub index: usize,

    /// Mean IoU of this sample alone, from its own confusion matrix.
    pub mean_iou: Option<f64>,

    /// Mean IoU of the cumulative matrix after this sample.
    pub running_mean_iou: Option<f64>,

    /// Running average of the per-sample mean IoU scores so far.
    ///
    /// This is a different quantity from `running_mean_iou`: it
    /// averages already-derived per-sample scores instead of deriving
    /// from pooled pixel counts, and the two diverge whenever sample
    /// difficulty varies. The cumulative-matrix value is authoritative.
    pub running_sample_mean_iou: Option<f64>,
}

/// Final report for one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Number of classes evaluated.
    pub n_class: usize,

    /// Number of samples processed. Zero means the dataset was empty
    /// and every aggregate below is undefined.
    pub samples: usize,

    /// Mean IoU derived from the fully accumulated confusion matrix.
    /// The authoritative run-level score. `None` when undefined.
    pub mean_iou: Option<f64>,

    /// Average of the per-sample mean IoU scores. Reported alongside
    /// the authoritative score because consumers of the original
    /// harness expect both; see [`SampleResult::running_sample_mean_iou`].
    pub sample_mean_iou: Option<f64>,

    /// Per-class IoU from the cumulative matrix; `None` entries are
    /// classes absent from both ground truth and prediction.
    pub per_class_iou: Vec<Option<f64>>,

    /// Distribution of the per-sample mean IoU scores.
    pub sample_iou_summary: Option<Summary>,

    /// Per-sample score rows in dataset order.
    pub samples_detail: Vec<SampleResult>,

    /// When this report was generated.
    #[serde(with = "chrono_serde")]
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl RunReport {
    /// Assemble a report from an accumulated matrix and per-sample rows.
    ///
    /// The authoritative aggregates derive from `matrix`; the averaged
    /// per-sample score and its distribution summary derive from the
    /// `mean_iou` entries of `samples_detail`.
    #[must_use]
    pub fn from_accumulation(matrix: &ConfusionMatrix, samples_detail: Vec<SampleResult>) -> Self {
        let final_iou = IouReport::from_matrix(matrix);
        let scores: Vec<f64> = samples_detail.iter().filter_map(|s| s.mean_iou).collect();
        let sample_mean_iou = if scores.is_empty() {
            None
        } else {
            Some(mean(&scores))
        };

        Self {
            n_class: matrix.n_class(),
            samples: samples_detail.len(),
            mean_iou: final_iou.mean_iou,
            sample_mean_iou,
            per_class_iou: final_iou.per_class,
            sample_iou_summary: Summary::compute(&scores),
            samples_detail,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Write the full report as pretty-printed JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Write a CSV summary with one row per sample.
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)?;

        wtr.write_record(["sample", "miou", "running_miou", "running_sample_miou"])?;
        for row in &self.samples_detail {
            wtr.write_record([
                row.index.to_string(),
                format_opt(row.mean_iou),
                format_opt(row.running_mean_iou),
                format_opt(row.running_sample_mean_iou),
            ])?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn format_opt(value: Option<f64>) -> String {
    value.map_or(String::new(), |v| format!("{v:.6}"))
}

// Timestamps serialize as RFC 3339 strings.
mod chrono_serde {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        dt.to_rfc3339().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> RunReport {
        RunReport {
            n_class: 3,
            samples: 2,
            mean_iou: Some(0.75),
            sample_mean_iou: Some(0.7),
            per_class_iou: vec![Some(1.0), Some(0.5), None],
            sample_iou_summary: Summary::compute(&[0.6, 0.8]),
            samples_detail: vec![
                SampleResult {
                    index: 0,
                    mean_iou: Some(0.6),
                    running_mean_iou: Some(0.6),
                    running_sample_mean_iou: Some(0.6),
                },
                SampleResult {
                    index: 1,
                    mean_iou: Some(0.8),
                    running_mean_iou: Some(0.75),
                    running_sample_mean_iou: Some(0.7),
                },
            ],
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_json_round_trip() {
        let report = sample_report();
        let json = serde_json::to_string(&report).unwrap();
        let parsed: RunReport = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.n_class, report.n_class);
        assert_eq!(parsed.mean_iou, report.mean_iou);
        assert_eq!(parsed.per_class_iou, report.per_class_iou);
        assert_eq!(parsed.samples_detail, report.samples_detail);
    }

    #[test]
    fn test_undefined_scores_survive_serde() {
        let mut report = sample_report();
        report.mean_iou = None;
        report.sample_mean_iou = None;

        let json = serde_json::to_string(&report).unwrap();
        let parsed: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.mean_iou, None);
    }

    #[test]
    fn test_write_json_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample_report();

        let json_path = dir.path().join("run.json");
        report.write_json(&json_path).unwrap();
        let loaded: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(loaded.samples, 2);

        let csv_path = dir.path().join("run.csv");
        report.write_csv(&csv_path).unwrap();
        let csv = std::fs::read_to_string(&csv_path).unwrap();
        // Header plus one row per sample.
        assert_eq!(csv.lines().count(), 3);
        assert!(csv.lines().next().unwrap().starts_with("sample,"));
    }
}
