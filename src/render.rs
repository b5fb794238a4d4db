//! Visualization products for reconstructed predictions.
//!
//! The evaluation core does not render or persist anything itself; a
//! comparison-image consumer receives the reconstructed prediction and
//! decides what to do with it. This module supplies the two pure
//! products such a consumer usually wants: a class-colored RGB decode
//! of a mask, and the prediction alpha-composited over the input image.

use imgref::{ImgRef, ImgVec};
use rgb::{RGB8, RGBA8};

use crate::error::{Error, Result};

/// Maps class indices to display colors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassPalette {
    colors: Vec<RGB8>,
}

impl ClassPalette {
    /// Palette from an explicit color list, one entry per class.
    #[must_use]
    pub fn new(colors: Vec<RGB8>) -> Self {
        Self { colors }
    }

    /// Default 8-class palette for road-scene lane masks: black
    /// background, saturated hues for the lane classes.
    #[must_use]
    pub fn lane_default() -> Self {
        Self::new(vec![
            RGB8 { r: 0, g: 0, b: 0 },
            RGB8 { r: 220, g: 20, b: 60 },
            RGB8 { r: 119, g: 11, b: 32 },
            RGB8 { r: 0, g: 0, b: 142 },
            RGB8 { r: 0, g: 60, b: 100 },
            RGB8 { r: 153, g: 153, b: 153 },
            RGB8 { r: 250, g: 170, b: 30 },
            RGB8 { r: 220, g: 220, b: 0 },
        ])
    }

    /// Color for a class index. Indices beyond the palette map to the
    /// last color so a bad mask still renders.
    #[must_use]
    pub fn color(&self, class: u8) -> RGB8 {
        let idx = (class as usize).min(self.colors.len().saturating_sub(1));
        self.colors.get(idx).copied().unwrap_or(RGB8 {
            r: 0,
            g: 0,
            b: 0,
        })
    }

    /// Number of classes the palette covers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// True if the palette has no colors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}

/// Decode a class-index mask to an RGB image using a palette.
#[must_use]
pub fn decode_classes(mask: ImgRef<'_, u8>, palette: &ClassPalette) -> ImgVec<RGB8> {
    let stride = mask.stride();
    let buf = mask.buf();
    let mut out = Vec::with_capacity(mask.width() * mask.height());
    for y in 0..mask.height() {
        for x in 0..mask.width() {
            out.push(palette.color(buf[y * stride + x]));
        }
    }
    ImgVec::new(out, mask.width(), mask.height())
}

/// Alpha-composite a prediction over the input image.
///
/// Non-background pixels (class != 0) are blended at `alpha` opacity in
/// their palette color; background pixels leave the image untouched.
/// This is the "prediction over input" comparison panel.
///
/// # Errors
///
/// Returns [`Error::ShapeMismatch`] if image and mask differ in size.
pub fn overlay(
    image: ImgRef<'_, RGB8>,
    mask: ImgRef<'_, u8>,
    palette: &ClassPalette,
    alpha: f32,
) -> Result<ImgVec<RGBA8>> {
    if image.width() != mask.width() || image.height() != mask.height() {
        return Err(Error::ShapeMismatch {
            expected: (image.width(), image.height()),
            actual: (mask.width(), mask.height()),
        });
    }

    let alpha = alpha.clamp(0.0, 1.0);
    let i_stride = image.stride();
    let m_stride = mask.stride();
    let i_buf = image.buf();
    let m_buf = mask.buf();

    let blend = |under: u8, over: u8| -> u8 {
        (f32::from(under) * (1.0 - alpha) + f32::from(over) * alpha).round() as u8
    };

    let mut out = Vec::with_capacity(image.width() * image.height());
    for y in 0..image.height() {
        for x in 0..image.width() {
            let px = i_buf[y * i_stride + x];
            let class = m_buf[y * m_stride + x];
            let blended = if class == 0 {
                RGBA8 {
                    r: px.r,
                    g: px.g,
                    b: px.b,
                    a: 255,
                }
            } else {
                let c = palette.color(class);
                RGBA8 {
                    r: blend(px.r, c.r),
                    g: blend(px.g, c.g),
                    b: blend(px.b, c.b),
                    a: 255,
                }
            };
            out.push(blended);
        }
    }
    Ok(ImgVec::new(out, image.width(), image.height()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_uses_palette_colors() {
        let mask = ImgVec::new(vec![0u8, 1, 1, 0], 2, 2);
        let palette = ClassPalette::lane_default();
        let rgb = decode_classes(mask.as_ref(), &palette);

        assert_eq!(rgb.buf()[0], palette.color(0));
        assert_eq!(rgb.buf()[1], palette.color(1));
    }

    #[test]
    fn test_decode_clamps_unknown_classes() {
        let mask = ImgVec::new(vec![200u8], 1, 1);
        let palette = ClassPalette::lane_default();
        let rgb = decode_classes(mask.as_ref(), &palette);
        assert_eq!(rgb.buf()[0], palette.color(7));
    }

    #[test]
    fn test_overlay_leaves_background_alone() {
        let image = ImgVec::new(vec![RGB8 { r: 10, g: 20, b: 30 }; 4], 2, 2);
        let mask = ImgVec::new(vec![0u8, 1, 0, 0], 2, 2);
        let out = overlay(
            image.as_ref(),
            mask.as_ref(),
            &ClassPalette::lane_default(),
            1.0,
        )
        .unwrap();

        assert_eq!(out.buf()[0].r, 10);
        assert_eq!(out.buf()[0].g, 20);
        // Full opacity: lane pixel takes the palette color exactly.
        let lane = ClassPalette::lane_default().color(1);
        assert_eq!(out.buf()[1].r, lane.r);
    }

    #[test]
    fn test_overlay_shape_mismatch() {
        let image = ImgVec::new(vec![RGB8 { r: 0, g: 0, b: 0 }; 4], 2, 2);
        let mask = ImgVec::new(vec![0u8; 2], 2, 1);
        let result = overlay(
            image.as_ref(),
            mask.as_ref(),
            &ClassPalette::lane_default(),
            0.5,
        );
        assert!(matches!(result, Err(Error::ShapeMismatch { .. })));
    }
}
