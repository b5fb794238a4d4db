//! Intersection-over-union derivation.

use serde::{Deserialize, Serialize};

use crate::metrics::ConfusionMatrix;

/// Per-class and mean IoU derived from a confusion matrix.
///
/// Derivation is a full recomputation from the matrix; with tens of
/// classes it is cheap next to the per-pixel matrix update, so no
/// incremental bookkeeping is kept.
///
/// A class whose denominator is zero never appeared as ground truth or
/// prediction; its entry is `None` and it is excluded from the mean
/// rather than counted as zero. If every class is absent, `mean_iou`
/// itself is `None`: an undefined score, distinct from a legitimate 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IouReport {
    /// IoU per class; `None` for classes absent from both truth and
    /// prediction.
    pub per_class: Vec<Option<f64>>,
    /// Mean over the classes with a defined IoU, or `None` if there
    /// are no such classes.
    pub mean_iou: Option<f64>,
}

impl IouReport {
    /// Derive IoU scores from an accumulated matrix.
    ///
    /// For class `c` with matrix `m`:
    /// `IoU_c = m[c][c] / (row_sum_c + col_sum_c - m[c][c])`.
    #[must_use]
    pub fn from_matrix(matrix: &ConfusionMatrix) -> Self {
        let per_class: Vec<Option<f64>> = (0..matrix.n_class())
            .map(|c| {
                let intersection = matrix.count(c, c);
                let union = matrix.row_sum(c) + matrix.col_sum(c) - intersection;
                if union == 0 {
                    None
                } else {
                    Some(intersection as f64 / union as f64)
                }
            })
            .collect();

        let present: Vec<f64> = per_class.iter().filter_map(|iou| *iou).collect();
        let mean_iou = if present.is_empty() {
            None
        } else {
            Some(present.iter().sum::<f64>() / present.len() as f64)
        };

        Self {
            per_class,
            mean_iou,
        }
    }

    /// Number of classes with a defined IoU.
    #[must_use]
    pub fn present_classes(&self) -> usize {
        self.per_class.iter().filter(|iou| iou.is_some()).count()
    }
}
