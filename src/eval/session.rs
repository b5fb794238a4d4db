//! Evaluation session with a callback-based predictor interface.
//!
//! This module provides [`EvalSession`], the main entry point for
//! segmentation evaluation. The caller supplies the predictor as a
//! callback, and the session handles the paired transforms, prediction
//! reconstruction, confusion-matrix accumulation, and report
//! generation.
//!
//! A session runs samples strictly in sequence: the predictor usually
//! monopolizes a shared accelerator, and per-sample bookkeeping is
//! cheap next to prediction. The confusion matrix itself merges
//! commutatively, so callers who control predictor reentrancy can
//! accumulate per-worker matrices with
//! [`ConfusionMatrix::par_merged`](crate::metrics::ConfusionMatrix::par_merged)
//! instead.

use imgref::{ImgRef, ImgVec};
use rgb::RGB8;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::eval::report::{RunReport, SampleResult};
use crate::metrics::{ClassPolicy, ConfusionMatrix, IouReport};
use crate::reconstruct::Reconstructor;
use crate::stats::mean;
use crate::transform::{
    ImageTensor, Normalization, PairCrop, PairNormalize, PairResize, SamplePair, SizeSpec,
};

/// Per-class score planes produced by the predictor.
///
/// Plane-major layout: `data[class * height * width + y * width + x]`
/// is the score for `class` at pixel (x, y). Scores are arbitrary
/// reals; only their ordering per pixel matters.
#[derive(Debug, Clone)]
pub struct ScoreMap {
    data: Vec<f32>,
    classes: usize,
    height: usize,
    width: usize,
}

impl ScoreMap {
    /// Wrap raw score planes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadScoreMap`] if `data` does not hold exactly
    /// `classes * height * width` values or `classes` is zero.
    pub fn new(data: Vec<f32>, classes: usize, height: usize, width: usize) -> Result<Self> {
        if classes == 0 {
            return Err(Error::BadScoreMap {
                reason: "zero class planes".to_string(),
            });
        }
        if data.len() != classes * height * width {
            return Err(Error::BadScoreMap {
                reason: format!(
                    "expected {} values for {classes}x{height}x{width}, got {}",
                    classes * height * width,
                    data.len()
                ),
            });
        }
        Ok(Self {
            data,
            classes,
            height,
            width,
        })
    }

    /// Number of class planes.
    #[must_use]
    pub fn classes(&self) -> usize {
        self.classes
    }

    /// Plane height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Plane width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Score for `class` at (y, x).
    #[must_use]
    pub fn at(&self, class: usize, y: usize, x: usize) -> f32 {
        self.data[class * self.height * self.width + y * self.width + x]
    }
}

/// Reduce score planes to a class-index map by per-pixel arg-max.
///
/// Ties resolve to the lowest class index, so the reduction is
/// deterministic. Softmax before the arg-max would not change the
/// winner and is deliberately skipped.
#[must_use]
pub fn argmax_classes(scores: &ScoreMap) -> ImgVec<u8> {
    let mut out = Vec::with_capacity(scores.width * scores.height);
    for y in 0..scores.height {
        for x in 0..scores.width {
            let mut best = 0usize;
            let mut best_score = scores.at(0, y, x);
            for c in 1..scores.classes {
                let score = scores.at(c, y, x);
                if score > best_score {
                    best = c;
                    best_score = score;
                }
            }
            out.push(best as u8);
        }
    }
    ImgVec::new(out, scores.width, scores.height)
}

/// Predictor callback type.
///
/// Takes a normalized channels-first image tensor, returns per-class
/// score planes at the same spatial size. The session never needs more
/// than this one operation, so the predictor stays an opaque function.
/// A returned error is fatal for the run; there is no retry, since the
/// session cannot assume the predictor is stateless.
pub type PredictFn = Box<dyn Fn(&ImageTensor) -> Result<ScoreMap> + Send + Sync>;

/// Progress callback type, invoked after each sample.
pub type ProgressFn = Box<dyn Fn(&SampleProgress) + Send + Sync>;

/// Comparison-image callback type, invoked after each sample with the
/// original image, its label, and the reconstructed prediction. The
/// consumer decides rendering and persistence; the session ignores
/// everything but its error.
pub type CompareFn = Box<dyn Fn(&CompareFrame<'_>) -> Result<()> + Send + Sync>;

/// Running scores reported after each sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleProgress {
    /// Zero-based sample index.
    pub index: usize,
    /// This sample's own mean IoU.
    pub sample_iou: Option<f64>,
    /// Cumulative-matrix mean IoU so far (authoritative).
    pub running_mean_iou: Option<f64>,
    /// Running average of per-sample mean IoU so far.
    pub running_sample_mean_iou: Option<f64>,
}

/// One sample's worth of data for the visualization consumer.
#[derive(Debug, Clone, Copy)]
pub struct CompareFrame<'a> {
    /// Original, untransformed image.
    pub image: ImgRef<'a, RGB8>,
    /// Original label mask.
    pub label: ImgRef<'a, u8>,
    /// Prediction reconstructed to the label's resolution.
    pub prediction: ImgRef<'a, u8>,
    /// This sample's mean IoU.
    pub mean_iou: Option<f64>,
}

/// Configuration for an evaluation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Rows cropped from the top of every sample before resizing.
    pub crop_offset: usize,

    /// Optional bottom crop bound (first excluded row).
    pub crop_bottom: Option<usize>,

    /// Working resolution for the model input.
    pub target_size: SizeSpec,

    /// Number of classes in the label space.
    pub n_class: usize,

    /// Per-channel normalization constants for the image tensor.
    pub normalization: Normalization,

    /// Class filled into rows the crop removed. Defaults to 0, which
    /// conflates "never predicted" with the background class; callers
    /// with a dedicated ignore class should set it here.
    pub background_class: u8,

    /// How out-of-range class values are treated.
    pub class_policy: ClassPolicy,
}

impl EvalConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> EvalConfigBuilder {
        EvalConfigBuilder::default()
    }
}

/// Builder for [`EvalConfig`].
#[derive(Debug, Default)]
pub struct EvalConfigBuilder {
    crop_offset: Option<usize>,
    crop_bottom: Option<usize>,
    target_size: Option<SizeSpec>,
    n_class: Option<usize>,
    normalization: Option<Normalization>,
    background_class: Option<u8>,
    class_policy: Option<ClassPolicy>,
}

impl EvalConfigBuilder {
    /// Set the top crop offset in rows.
    #[must_use]
    pub fn crop_offset(mut self, rows: usize) -> Self {
        self.crop_offset = Some(rows);
        self
    }

    /// Set the bottom crop bound (first excluded row).
    #[must_use]
    pub fn crop_bottom(mut self, row: usize) -> Self {
        self.crop_bottom = Some(row);
        self
    }

    /// Set the working resolution.
    #[must_use]
    pub fn target_size(mut self, size: SizeSpec) -> Self {
        self.target_size = Some(size);
        self
    }

    /// Set the number of classes.
    #[must_use]
    pub fn n_class(mut self, n: usize) -> Self {
        self.n_class = Some(n);
        self
    }

    /// Set the normalization constants.
    #[must_use]
    pub fn normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = Some(normalization);
        self
    }

    /// Set the background fill class for reconstruction.
    #[must_use]
    pub fn background_class(mut self, class: u8) -> Self {
        self.background_class = Some(class);
        self
    }

    /// Set the out-of-range class policy.
    #[must_use]
    pub fn class_policy(mut self, policy: ClassPolicy) -> Self {
        self.class_policy = Some(policy);
        self
    }

    /// Build the configuration.
    ///
    /// # Panics
    ///
    /// Panics if `n_class` is not set.
    #[must_use]
    pub fn build(self) -> EvalConfig {
        EvalConfig {
            crop_offset: self.crop_offset.unwrap_or(0),
            crop_bottom: self.crop_bottom,
            target_size: self.target_size.unwrap_or(SizeSpec::Shorter(256)),
            n_class: self.n_class.expect("n_class is required"),
            normalization: self.normalization.unwrap_or_default(),
            background_class: self.background_class.unwrap_or(0),
            class_policy: self.class_policy.unwrap_or_default(),
        }
    }
}

/// State held while a run is in flight: the cumulative matrix and the
/// per-sample score trail.
struct RunningState {
    matrix: ConfusionMatrix,
    sample_scores: Vec<f64>,
    details: Vec<SampleResult>,
}

impl RunningState {
    fn new(n_class: usize) -> Self {
        Self {
            matrix: ConfusionMatrix::new(n_class),
            sample_scores: Vec::new(),
            details: Vec::new(),
        }
    }

    /// Fold one sample's matrix in and record both running aggregates.
    fn observe(&mut self, index: usize, sample_matrix: &ConfusionMatrix) -> SampleProgress {
        let sample_iou = IouReport::from_matrix(sample_matrix).mean_iou;
        self.matrix.merge(sample_matrix);

        if let Some(score) = sample_iou {
            self.sample_scores.push(score);
        }
        let running_mean_iou = IouReport::from_matrix(&self.matrix).mean_iou;
        let running_sample_mean_iou = if self.sample_scores.is_empty() {
            None
        } else {
            Some(mean(&self.sample_scores))
        };

        self.details.push(SampleResult {
            index,
            mean_iou: sample_iou,
            running_mean_iou,
            running_sample_mean_iou,
        });

        SampleProgress {
            index,
            sample_iou,
            running_mean_iou,
            running_sample_mean_iou,
        }
    }

    fn into_report(self) -> RunReport {
        RunReport::from_accumulation(&self.matrix, self.details)
    }
}

/// Evaluation session for a segmentation predictor.
///
/// # Example
///
/// ```rust,ignore
/// use seg_eval::{EvalConfig, EvalSession, ScoreMap, SizeSpec};
///
/// let config = EvalConfig::builder()
///     .n_class(8)
///     .crop_offset(690)
///     .target_size(SizeSpec::Shorter(256))
///     .build();
///
/// let session = EvalSession::new(config, Box::new(|tensor| {
///     // Run the model on the normalized tensor.
///     ScoreMap::new(scores, 8, tensor.height, tensor.width)
/// }));
///
/// let report = session.evaluate(dataset)?;
/// println!("mIoU {:?}", report.mean_iou);
/// ```
pub struct EvalSession {
    config: EvalConfig,
    predict: PredictFn,
    progress: Option<ProgressFn>,
    compare: Option<CompareFn>,
}

impl EvalSession {
    /// Create a session from a configuration and a predictor callback.
    #[must_use]
    pub fn new(config: EvalConfig, predict: PredictFn) -> Self {
        Self {
            config,
            predict,
            progress: None,
            compare: None,
        }
    }

    /// Attach a per-sample progress callback.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Attach a per-sample comparison-image callback.
    #[must_use]
    pub fn with_compare(mut self, compare: CompareFn) -> Self {
        self.compare = Some(compare);
        self
    }

    /// The session configuration.
    #[must_use]
    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Run one full pass over the dataset and produce the final report.
    ///
    /// Each `(image, label)` pair is transformed, predicted, and scored
    /// before the next is pulled; the dataset is consumed exactly once.
    /// An empty dataset completes immediately with a report whose
    /// aggregates are all `None`, never a fabricated zero score.
    ///
    /// # Errors
    ///
    /// Any shape violation, out-of-range class under the strict policy,
    /// or predictor failure aborts the run. Aggregates accumulated
    /// before the failing sample are discarded with it.
    pub fn evaluate<I>(&self, dataset: I) -> Result<RunReport>
    where
        I: IntoIterator<Item = (ImgVec<RGB8>, ImgVec<u8>)>,
    {
        let crop = PairCrop {
            top: self.config.crop_offset,
            bottom: self.config.crop_bottom,
        };
        let resize = PairResize {
            size: self.config.target_size,
        };
        let normalize = PairNormalize {
            normalization: self.config.normalization,
        };
        let reconstructor = Reconstructor {
            crop_offset: self.config.crop_offset,
            background_class: self.config.background_class,
        };

        let mut state = RunningState::new(self.config.n_class);

        for (index, (image, label)) in dataset.into_iter().enumerate() {
            let original_width = label.width();
            let original_height = label.height();
            let pair = SamplePair::new(image, label)?;

            // Paired transforms: crop, resize, normalize.
            let cropped = crop.apply(&pair)?;
            let resized = resize.apply(&cropped)?;
            let tensors = normalize.apply(&resized);

            // Predict and reduce to a class map.
            let scores = (self.predict)(&tensors.tensor)?;
            self.check_scores(&scores, &tensors.tensor)?;
            let raw = argmax_classes(&scores);

            // Back to the original coordinate frame, then score.
            let reconstructed =
                reconstructor.reconstruct(raw.as_ref(), original_width, original_height)?;
            let sample_matrix = ConfusionMatrix::from_masks(
                pair.label.as_ref(),
                reconstructed.as_ref(),
                self.config.n_class,
                self.config.class_policy,
            )?;

            let progress = state.observe(index, &sample_matrix);
            if let Some(callback) = &self.progress {
                callback(&progress);
            }
            if let Some(callback) = &self.compare {
                callback(&CompareFrame {
                    image: pair.image.as_ref(),
                    label: pair.label.as_ref(),
                    prediction: reconstructed.as_ref(),
                    mean_iou: progress.sample_iou,
                })?;
            }
        }

        Ok(state.into_report())
    }

    /// Reject score maps inconsistent with the run configuration.
    fn check_scores(&self, scores: &ScoreMap, tensor: &ImageTensor) -> Result<()> {
        if scores.classes() != self.config.n_class {
            return Err(Error::BadScoreMap {
                reason: format!(
                    "predictor returned {} class planes, run has {}",
                    scores.classes(),
                    self.config.n_class
                ),
            });
        }
        if scores.width() != tensor.width || scores.height() != tensor.height {
            return Err(Error::ShapeMismatch {
                expected: (tensor.width, tensor.height),
                actual: (scores.width(), scores.height()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    fn flat_image(width: usize, height: usize) -> ImgVec<RGB8> {
        ImgVec::new(
            vec![
                RGB8 {
                    r: 120,
                    g: 120,
                    b: 120,
                };
                width * height
            ],
            width,
            height,
        )
    }

    fn uniform_label(width: usize, height: usize, class: u8) -> ImgVec<u8> {
        ImgVec::new(vec![class; width * height], width, height)
    }

    /// Predictor that always scores `class` highest everywhere.
    fn constant_predictor(n_class: usize, class: usize) -> PredictFn {
        Box::new(move |tensor| {
            let plane = tensor.height * tensor.width;
            let mut data = vec![0.0f32; n_class * plane];
            for v in &mut data[class * plane..(class + 1) * plane] {
                *v = 1.0;
            }
            ScoreMap::new(data, n_class, tensor.height, tensor.width)
        })
    }

    fn base_config(n_class: usize) -> EvalConfig {
        EvalConfig::builder()
            .n_class(n_class)
            .target_size(SizeSpec::Exact {
                width: 8,
                height: 8,
            })
            .build()
    }

    #[test]
    fn test_config_builder_defaults() {
        let config = EvalConfig::builder().n_class(8).build();
        assert_eq!(config.crop_offset, 0);
        assert_eq!(config.target_size, SizeSpec::Shorter(256));
        assert_eq!(config.background_class, 0);
        assert_eq!(config.class_policy, ClassPolicy::Strict);
    }

    #[test]
    #[should_panic(expected = "n_class is required")]
    fn test_config_builder_requires_n_class() {
        let _ = EvalConfig::builder().crop_offset(10).build();
    }

    #[test]
    fn test_argmax_picks_highest_plane() {
        // 2 classes on a 1x2 grid: pixel 0 favors class 1, pixel 1 ties.
        let scores = ScoreMap::new(vec![0.1, 0.5, 0.9, 0.5], 2, 1, 2).unwrap();
        let map = argmax_classes(&scores);
        assert_eq!(map.buf()[0], 1);
        // Tie resolves to the lowest class index.
        assert_eq!(map.buf()[1], 0);
    }

    #[test]
    fn test_score_map_rejects_bad_len() {
        assert!(matches!(
            ScoreMap::new(vec![0.0; 5], 2, 2, 2),
            Err(Error::BadScoreMap { .. })
        ));
    }

    #[test]
    fn test_perfect_predictor_scores_one() {
        let session = EvalSession::new(base_config(3), constant_predictor(3, 2));
        let dataset = vec![
            (flat_image(16, 16), uniform_label(16, 16, 2)),
            (flat_image(16, 16), uniform_label(16, 16, 2)),
        ];

        let report = session.evaluate(dataset).unwrap();
        assert_eq!(report.samples, 2);
        assert_eq!(report.mean_iou, Some(1.0));
        assert_eq!(report.sample_mean_iou, Some(1.0));
        assert_eq!(report.per_class_iou[2], Some(1.0));
        // Classes 0 and 1 never appear: excluded, not zeroed.
        assert_eq!(report.per_class_iou[0], None);
    }

    #[test]
    fn test_wrong_predictor_scores_zero() {
        let session = EvalSession::new(base_config(3), constant_predictor(3, 1));
        let dataset = vec![(flat_image(16, 16), uniform_label(16, 16, 2))];

        let report = session.evaluate(dataset).unwrap();
        // Truth is all class 2, prediction all class 1: both classes
        // have non-zero denominators and zero intersection.
        assert_eq!(report.mean_iou, Some(0.0));
    }

    #[test]
    fn test_empty_dataset_undefined_metrics() {
        let session = EvalSession::new(base_config(3), constant_predictor(3, 0));
        let report = session.evaluate(Vec::new()).unwrap();

        assert_eq!(report.samples, 0);
        assert_eq!(report.mean_iou, None);
        assert_eq!(report.sample_mean_iou, None);
        assert!(report.sample_iou_summary.is_none());
    }

    #[test]
    fn test_cropped_region_scored_as_background() {
        let config = EvalConfig::builder()
            .n_class(2)
            .crop_offset(8)
            .target_size(SizeSpec::Exact {
                width: 8,
                height: 8,
            })
            .build();
        let session = EvalSession::new(config, constant_predictor(2, 1));

        // Top half background (matches the fill), bottom half class 1
        // (matches the predictor).
        let mut label = uniform_label(16, 16, 1);
        for v in &mut label.buf_mut()[..16 * 8] {
            *v = 0;
        }
        let report = session.evaluate(vec![(flat_image(16, 16), label)]).unwrap();
        assert_eq!(report.mean_iou, Some(1.0));
    }

    #[test]
    fn test_predictor_error_aborts_run() {
        let session = EvalSession::new(
            base_config(2),
            Box::new(|_| Err(Error::predictor("device lost"))),
        );
        let result = session.evaluate(vec![(flat_image(8, 8), uniform_label(8, 8, 0))]);
        assert!(matches!(result, Err(Error::Predictor { .. })));
    }

    #[test]
    fn test_mismatched_pair_rejected() {
        let session = EvalSession::new(base_config(2), constant_predictor(2, 0));
        let result = session.evaluate(vec![(flat_image(8, 8), uniform_label(8, 4, 0))]);
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }

    #[test]
    fn test_wrong_plane_count_rejected() {
        let session = EvalSession::new(base_config(3), constant_predictor(4, 0));
        let result = session.evaluate(vec![(flat_image(8, 8), uniform_label(8, 8, 0))]);
        assert!(matches!(result, Err(Error::BadScoreMap { .. })));
    }

    #[test]
    fn test_progress_reports_both_aggregates() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let session = EvalSession::new(base_config(2), constant_predictor(2, 1))
            .with_progress(Box::new(move |p| sink.lock().unwrap().push(*p)));

        // First sample all correct, second all wrong: the cumulative
        // and averaged running scores must diverge by sample two.
        let dataset = vec![
            (flat_image(8, 8), uniform_label(8, 8, 1)),
            (flat_image(8, 8), uniform_label(8, 8, 0)),
        ];
        session.evaluate(dataset).unwrap();

        let progress = seen.lock().unwrap();
        assert_eq!(progress.len(), 2);
        assert_eq!(progress[0].sample_iou, Some(1.0));
        assert_eq!(progress[1].sample_iou, Some(0.0));
        assert_eq!(progress[1].running_sample_mean_iou, Some(0.5));
        // Pooled counts: class 1 has intersection 64, union 128; class
        // 0 has intersection 0. Mean = (0.5 + 0.0) / 2.
        assert_eq!(progress[1].running_mean_iou, Some(0.25));
    }

    #[test]
    fn test_compare_callback_sees_original_shapes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let config = EvalConfig::builder()
            .n_class(2)
            .crop_offset(4)
            .target_size(SizeSpec::Exact {
                width: 8,
                height: 8,
            })
            .build();
        let session = EvalSession::new(config, constant_predictor(2, 1)).with_compare(Box::new(
            move |frame| {
                counter.fetch_add(1, Ordering::SeqCst);
                assert_eq!(frame.image.width(), frame.prediction.width());
                assert_eq!(frame.image.height(), frame.prediction.height());
                Ok(())
            },
        ));

        session
            .evaluate(vec![(flat_image(12, 12), uniform_label(12, 12, 1))])
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
