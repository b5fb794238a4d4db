//! Accuracy metrics for segmentation evaluation.
//!
//! The metric engine is a per-class confusion matrix accumulated over
//! every evaluated pixel, from which intersection-over-union scores are
//! derived:
//!
//! - [`ConfusionMatrix`]: pixel-count accumulator indexed by
//!   `[ground_truth][prediction]`.
//! - [`IouReport`]: per-class and mean IoU derived from a matrix.
//!
//! Matrix merging is element-wise addition, which is commutative and
//! associative: samples may be accumulated in any order, or in parallel
//! with per-worker matrices merged at the end, without changing the
//! aggregate. [`ConfusionMatrix::par_merged`] implements that
//! reduce-after-parallel-map variant.

pub mod confusion;
pub mod iou;

pub use confusion::{ClassPolicy, ConfusionMatrix};
pub use iou::IouReport;
