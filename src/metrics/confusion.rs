//! Confusion-matrix accumulation.

use imgref::ImgRef;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Policy for class values outside `[0, n_class)`.
///
/// Silent clipping masks model and data bugs, so [`ClassPolicy::Strict`]
/// is the default; clipping must be opted into explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClassPolicy {
    /// Reject out-of-range values with [`Error::ClassRange`].
    #[default]
    Strict,
    /// Clamp out-of-range values to `n_class - 1`.
    Clip,
}

/// An `n_class` × `n_class` pixel-count accumulator.
///
/// `count(t, p)` is the number of pixels whose ground-truth class is
/// `t` and predicted class is `p`. Counts are non-negative and only
/// ever grow; a run resets by constructing a fresh matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    n_class: usize,
    /// Row-major counts, `counts[truth * n_class + pred]`.
    counts: Vec<u64>,
}

impl ConfusionMatrix {
    /// Empty matrix for `n_class` classes.
    #[must_use]
    pub fn new(n_class: usize) -> Self {
        Self {
            n_class,
            counts: vec![0; n_class * n_class],
        }
    }

    /// Build the per-sample matrix for one (truth, prediction) pair.
    ///
    /// Both grids must share the same shape. The caller keeps the
    /// returned matrix separate from the running total until it has
    /// derived any per-sample scores, then folds it in with
    /// [`merge`](Self::merge).
    ///
    /// # Errors
    ///
    /// [`Error::ShapeMismatch`] if the grids differ in size;
    /// [`Error::ClassRange`] for out-of-range values under
    /// [`ClassPolicy::Strict`].
    pub fn from_masks(
        truth: ImgRef<'_, u8>,
        prediction: ImgRef<'_, u8>,
        n_class: usize,
        policy: ClassPolicy,
    ) -> Result<Self> {
        if truth.width() != prediction.width() || truth.height() != prediction.height() {
            return Err(Error::ShapeMismatch {
                expected: (truth.width(), truth.height()),
                actual: (prediction.width(), prediction.height()),
            });
        }

        let mut matrix = Self::new(n_class);
        let t_stride = truth.stride();
        let p_stride = prediction.stride();
        let t_buf = truth.buf();
        let p_buf = prediction.buf();

        for y in 0..truth.height() {
            for x in 0..truth.width() {
                let t = resolve_class(t_buf[y * t_stride + x], n_class, policy)?;
                let p = resolve_class(p_buf[y * p_stride + x], n_class, policy)?;
                matrix.counts[t * n_class + p] += 1;
            }
        }
        Ok(matrix)
    }

    /// Accumulate (truth, prediction) pairs in parallel.
    ///
    /// Each worker builds a local matrix; locals are merged by
    /// element-wise addition, so the result is identical to sequential
    /// accumulation in any order.
    pub fn par_merged(
        samples: &[(ImgRef<'_, u8>, ImgRef<'_, u8>)],
        n_class: usize,
        policy: ClassPolicy,
    ) -> Result<Self> {
        samples
            .par_iter()
            .map(|(truth, prediction)| Self::from_masks(*truth, *prediction, n_class, policy))
            .try_reduce(
                || Self::new(n_class),
                |mut acc, local| {
                    acc.merge(&local);
                    Ok(acc)
                },
            )
    }

    /// Fold another matrix into this one (element-wise addition).
    ///
    /// # Panics
    ///
    /// Panics if the matrices were built for different class counts.
    pub fn merge(&mut self, other: &Self) {
        assert_eq!(self.n_class, other.n_class, "class count mismatch");
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
    }

    /// Number of classes this matrix was built for.
    #[must_use]
    pub fn n_class(&self) -> usize {
        self.n_class
    }

    /// Pixels with ground truth `truth` predicted as `prediction`.
    #[must_use]
    pub fn count(&self, truth: usize, prediction: usize) -> u64 {
        self.counts[truth * self.n_class + prediction]
    }

    /// Total ground-truth pixels of class `c`.
    #[must_use]
    pub fn row_sum(&self, c: usize) -> u64 {
        self.counts[c * self.n_class..(c + 1) * self.n_class]
            .iter()
            .sum()
    }

    /// Total predicted pixels of class `c`.
    #[must_use]
    pub fn col_sum(&self, c: usize) -> u64 {
        (0..self.n_class).map(|t| self.count(t, c)).sum()
    }

    /// Total accumulated pixels.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// True if no pixels have been accumulated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }
}

fn resolve_class(value: u8, n_class: usize, policy: ClassPolicy) -> Result<usize> {
    let class = value as usize;
    if class < n_class {
        return Ok(class);
    }
    match policy {
        ClassPolicy::Strict => Err(Error::ClassRange {
            class: u32::from(value),
            n_class,
        }),
        ClassPolicy::Clip => Ok(n_class - 1),
    }
}
