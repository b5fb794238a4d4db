//! # seg-eval
//!
//! Semantic segmentation evaluation library.
//!
//! This library provides an **API-first design** where an external
//! crate provides the predictor callback, and this library handles the
//! paired image/label transforms, prediction reconstruction,
//! confusion-matrix accumulation, and mean-IoU report generation.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use seg_eval::{EvalConfig, EvalSession, ScoreMap, SizeSpec};
//!
//! let config = EvalConfig::builder()
//!     .n_class(8)
//!     .crop_offset(690)
//!     .target_size(SizeSpec::Shorter(256))
//!     .build();
//!
//! let session = EvalSession::new(config, Box::new(|tensor| {
//!     // Your model inference here
//!     ScoreMap::new(scores, 8, tensor.height, tensor.width)
//! }));
//!
//! let report = session.evaluate(dataset)?;
//! println!("mean IoU: {:?}", report.mean_iou);
//! ```
//!
//! ## Modules
//!
//! - [`error`]: Error types for the library
//! - [`transform`]: Paired crop/resize/normalize pipeline
//! - [`reconstruct`]: Mapping predictions back to label resolution
//! - [`metrics`]: Confusion matrix and IoU derivation
//! - [`eval`]: Evaluation session and report generation
//! - [`render`]: Class-palette decoding and prediction overlays
//! - [`stats`]: Descriptive statistics for per-sample scores

pub mod error;
pub mod eval;
pub mod metrics;
pub mod reconstruct;
pub mod render;
pub mod stats;
pub mod transform;

// Re-export commonly used types
pub use error::{Error, Result};
pub use eval::{
    report::{RunReport, SampleResult},
    session::{
        CompareFrame, EvalConfig, EvalSession, PredictFn, SampleProgress, ScoreMap,
        argmax_classes,
    },
};
pub use metrics::{ClassPolicy, ConfusionMatrix, IouReport};
pub use reconstruct::Reconstructor;
pub use render::ClassPalette;
pub use stats::Summary;
pub use transform::{
    ImageTensor, Normalization, PairCrop, PairNormalize, PairResize, SamplePair, SizeSpec,
    TensorPair,
};
