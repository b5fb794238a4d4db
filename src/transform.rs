//! Paired geometric transforms for (image, label) samples.
//!
//! Segmentation evaluation feeds a model a cropped, resized, normalized
//! image while scoring happens against the original label. Every
//! geometric operation must therefore be applied to the image and its
//! label mask identically, or pixel correspondence is lost and every
//! downstream count is wrong. This module provides that paired
//! pipeline:
//!
//! 1. [`PairCrop`]: remove a fixed band of rows from both grids.
//! 2. [`PairResize`]: rescale both grids to a target size. The image is
//!    resampled bilinearly; the label uses nearest-neighbor, because
//!    smooth interpolation of class indices would synthesize classes
//!    that never existed.
//! 3. [`PairNormalize`]: convert the image to a channels-first
//!    normalized f32 tensor; the label stays an integer grid.
//!
//! All operators are pure functions of their input pair and their fixed
//! configuration. Each returns a new pair and re-establishes the shape
//! invariant, so a corrupted pair can never propagate silently.

use imgref::{ImgRef, ImgVec};
use rgb::RGB8;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An (image, label) pair with identical spatial dimensions.
///
/// The constructor enforces the co-transform invariant; transform
/// operators preserve it. The label is a grid of integer class indices
/// covering the same pixels as the image.
#[derive(Debug, Clone)]
pub struct SamplePair {
    /// RGB pixel grid.
    pub image: ImgVec<RGB8>,
    /// Class-index grid, same width and height as `image`.
    pub label: ImgVec<u8>,
}

impl SamplePair {
    /// Pair an image with its label mask.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the two grids differ in
    /// width or height.
    pub fn new(image: ImgVec<RGB8>, label: ImgVec<u8>) -> Result<Self> {
        if image.width() != label.width() || image.height() != label.height() {
            return Err(Error::ShapeMismatch {
                expected: (image.width(), image.height()),
                actual: (label.width(), label.height()),
            });
        }
        Ok(Self { image, label })
    }

    /// Width shared by image and label.
    #[must_use]
    pub fn width(&self) -> usize {
        self.image.width()
    }

    /// Height shared by image and label.
    #[must_use]
    pub fn height(&self) -> usize {
        self.image.height()
    }
}

/// Target size for [`PairResize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeSpec {
    /// Scale so the shorter edge matches this length, preserving the
    /// aspect ratio.
    Shorter(u32),
    /// Scale to exactly this width and height.
    Exact {
        /// Target width in pixels.
        width: u32,
        /// Target height in pixels.
        height: u32,
    },
}

impl SizeSpec {
    /// Resolve the target (width, height) for a source of the given size.
    #[must_use]
    pub fn resolve(&self, width: usize, height: usize) -> (usize, usize) {
        match *self {
            Self::Shorter(edge) => {
                let edge = edge.max(1) as usize;
                if width <= height {
                    let h = (height * edge + width / 2) / width.max(1);
                    (edge, h.max(1))
                } else {
                    let w = (width * edge + height / 2) / height.max(1);
                    (w.max(1), edge)
                }
            }
            Self::Exact { width: w, height: h } => (w.max(1) as usize, h.max(1) as usize),
        }
    }
}

/// Per-channel normalization constants for [`PairNormalize`].
///
/// Values are applied as `(v / 255 - mean) / std` per channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    /// Per-channel mean, RGB order.
    pub mean: [f32; 3],
    /// Per-channel scale, RGB order.
    pub std: [f32; 3],
}

impl Default for Normalization {
    /// ImageNet statistics, the constants the evaluated models were
    /// trained with.
    fn default() -> Self {
        Self {
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

impl Normalization {
    /// Identity normalization: scale to `[0, 1]` without centering.
    #[must_use]
    pub fn none() -> Self {
        Self {
            mean: [0.0; 3],
            std: [1.0; 3],
        }
    }
}

/// A normalized image tensor in channels-first (CHW) layout.
#[derive(Debug, Clone)]
pub struct ImageTensor {
    /// Plane-major data: `data[c * height * width + y * width + x]`.
    pub data: Vec<f32>,
    /// Number of channels (3 for RGB input).
    pub channels: usize,
    /// Tensor height in pixels.
    pub height: usize,
    /// Tensor width in pixels.
    pub width: usize,
}

impl ImageTensor {
    /// Value at (channel, y, x).
    #[must_use]
    pub fn at(&self, channel: usize, y: usize, x: usize) -> f32 {
        self.data[channel * self.height * self.width + y * self.width + x]
    }
}

/// Result of [`PairNormalize`]: model input plus the co-transformed label.
#[derive(Debug, Clone)]
pub struct TensorPair {
    /// Normalized channels-first image tensor.
    pub tensor: ImageTensor,
    /// Class-index grid, same spatial size as `tensor`.
    pub label: ImgVec<u8>,
}

/// Removes a fixed band of rows from image and label identically.
///
/// The band is not data-dependent: it cuts a region known to be
/// uninformative for the whole dataset (sky and car hood in road
/// scenes). `top` rows are removed from the top; when `bottom` is set,
/// rows from that coordinate down are removed as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairCrop {
    /// Rows removed from the top.
    pub top: usize,
    /// First row (in source coordinates) excluded at the bottom, if any.
    pub bottom: Option<usize>,
}

impl PairCrop {
    /// Crop only from the top.
    #[must_use]
    pub fn top(top: usize) -> Self {
        Self { top, bottom: None }
    }

    /// Apply the crop to both members of the pair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CropOutOfBounds`] if no rows would remain.
    pub fn apply(&self, pair: &SamplePair) -> Result<SamplePair> {
        let height = pair.height();
        let end = self.bottom.unwrap_or(height).min(height);
        if self.top >= end {
            return Err(Error::CropOutOfBounds {
                offset: self.top,
                height,
            });
        }

        let image = crop_rows(pair.image.as_ref(), self.top, end);
        let label = crop_rows(pair.label.as_ref(), self.top, end);
        SamplePair::new(image, label)
    }
}

/// Rescales image and label to a target size.
///
/// The image is resampled bilinearly. The label must keep exact integer
/// class values, so it is resampled nearest-neighbor; this asymmetry is
/// mandatory, not an optimization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairResize {
    /// Target size specification.
    pub size: SizeSpec,
}

impl PairResize {
    /// Resize with a shorter-edge target.
    #[must_use]
    pub fn shorter(edge: u32) -> Self {
        Self {
            size: SizeSpec::Shorter(edge),
        }
    }

    /// Apply the resize to both members of the pair.
    pub fn apply(&self, pair: &SamplePair) -> Result<SamplePair> {
        let (width, height) = self.size.resolve(pair.width(), pair.height());
        let image = resize_bilinear(pair.image.as_ref(), width, height);
        let label = resize_nearest(pair.label.as_ref(), width, height);
        SamplePair::new(image, label)
    }
}

/// Converts the image to a normalized channels-first tensor.
///
/// No resampling and no shape change; the label passes through as the
/// integer grid it already is.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PairNormalize {
    /// Per-channel normalization constants.
    pub normalization: Normalization,
}

impl PairNormalize {
    /// Apply normalization, producing the model-ready tensor pair.
    #[must_use]
    pub fn apply(&self, pair: &SamplePair) -> TensorPair {
        let width = pair.width();
        let height = pair.height();
        let plane = width * height;
        let mut data = vec![0.0f32; 3 * plane];

        let stride = pair.image.stride();
        let buf = pair.image.buf();
        for y in 0..height {
            for x in 0..width {
                let px = buf[y * stride + x];
                let rgb = [px.r, px.g, px.b];
                for (c, &v) in rgb.iter().enumerate() {
                    let normalized = (f32::from(v) / 255.0 - self.normalization.mean[c])
                        / self.normalization.std[c];
                    data[c * plane + y * width + x] = normalized;
                }
            }
        }

        TensorPair {
            tensor: ImageTensor {
                data,
                channels: 3,
                height,
                width,
            },
            label: pair.label.clone(),
        }
    }
}

/// Copy rows `[top, end)` of a grid into a new owned grid.
fn crop_rows<T: Copy>(src: ImgRef<'_, T>, top: usize, end: usize) -> ImgVec<T> {
    let width = src.width();
    let stride = src.stride();
    let buf = src.buf();
    let mut out = Vec::with_capacity(width * (end - top));
    for y in top..end {
        out.extend_from_slice(&buf[y * stride..y * stride + width]);
    }
    ImgVec::new(out, width, end - top)
}

/// Bilinear resampling for RGB pixel grids.
///
/// Samples at pixel centers (half-pixel alignment), clamped at the
/// borders. Suitable only for continuous-valued grids; never use this
/// on class-index masks.
#[must_use]
pub fn resize_bilinear(src: ImgRef<'_, RGB8>, dst_width: usize, dst_height: usize) -> ImgVec<RGB8> {
    let src_width = src.width();
    let src_height = src.height();
    let stride = src.stride();
    let buf = src.buf();

    if src_width == dst_width && src_height == dst_height {
        return crop_rows(src, 0, src_height);
    }

    let scale_x = src_width as f32 / dst_width as f32;
    let scale_y = src_height as f32 / dst_height as f32;

    let mut out = Vec::with_capacity(dst_width * dst_height);
    for dy in 0..dst_height {
        let sy = ((dy as f32 + 0.5) * scale_y - 0.5).max(0.0);
        let y0 = (sy as usize).min(src_height - 1);
        let y1 = (y0 + 1).min(src_height - 1);
        let fy = sy - y0 as f32;

        for dx in 0..dst_width {
            let sx = ((dx as f32 + 0.5) * scale_x - 0.5).max(0.0);
            let x0 = (sx as usize).min(src_width - 1);
            let x1 = (x0 + 1).min(src_width - 1);
            let fx = sx - x0 as f32;

            let p00 = buf[y0 * stride + x0];
            let p01 = buf[y0 * stride + x1];
            let p10 = buf[y1 * stride + x0];
            let p11 = buf[y1 * stride + x1];

            let lerp = |a: u8, b: u8, c: u8, d: u8| -> u8 {
                let top = f32::from(a) * (1.0 - fx) + f32::from(b) * fx;
                let bottom = f32::from(c) * (1.0 - fx) + f32::from(d) * fx;
                (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8
            };

            out.push(RGB8 {
                r: lerp(p00.r, p01.r, p10.r, p11.r),
                g: lerp(p00.g, p01.g, p10.g, p11.g),
                b: lerp(p00.b, p01.b, p10.b, p11.b),
            });
        }
    }
    ImgVec::new(out, dst_width, dst_height)
}

/// Nearest-neighbor resampling for class-index grids.
///
/// Copies the nearest source value instead of interpolating, so every
/// output value is a class index that exists in the source.
#[must_use]
pub fn resize_nearest(src: ImgRef<'_, u8>, dst_width: usize, dst_height: usize) -> ImgVec<u8> {
    let src_width = src.width();
    let src_height = src.height();
    let stride = src.stride();
    let buf = src.buf();

    if src_width == dst_width && src_height == dst_height {
        return crop_rows(src, 0, src_height);
    }

    let scale_x = src_width as f32 / dst_width as f32;
    let scale_y = src_height as f32 / dst_height as f32;

    let mut out = Vec::with_capacity(dst_width * dst_height);
    for dy in 0..dst_height {
        let sy = ((dy as f32 * scale_y) as usize).min(src_height - 1);
        for dx in 0..dst_width {
            let sx = ((dx as f32 * scale_x) as usize).min(src_width - 1);
            out.push(buf[sy * stride + sx]);
        }
    }
    ImgVec::new(out, dst_width, dst_height)
}
