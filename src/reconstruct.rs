//! Reconstruction of model output back to label resolution.
//!
//! The predictor sees a cropped, resized view of the scene, so its
//! class map lives at the working resolution and in the cropped
//! coordinate frame. Scoring happens against the untouched label, which
//! means the prediction must be mapped back: resampled to the original
//! width and the surviving height, then padded at the top with a fixed
//! background class where the crop removed rows.
//!
//! Resampling is strictly nearest-neighbor. The values are class
//! indices; smooth interpolation would produce fractional classes.

use imgref::{ImgRef, ImgVec};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transform::resize_nearest;

/// Maps a raw prediction back to the original label's coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconstructor {
    /// Rows that were removed from the top of the original frame.
    pub crop_offset: usize,
    /// Class used to fill the re-inserted rows. The cropped region was
    /// never predicted, so "unknown" and this class are conflated;
    /// class 0 (background) by convention.
    pub background_class: u8,
}

impl Reconstructor {
    /// Reconstructor for an uncropped pipeline.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            crop_offset: 0,
            background_class: 0,
        }
    }

    /// Map a working-resolution class map to `original_width` ×
    /// `original_height`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CropOutOfBounds`] if `crop_offset` consumes the
    /// entire original height.
    pub fn reconstruct(
        &self,
        prediction: ImgRef<'_, u8>,
        original_width: usize,
        original_height: usize,
    ) -> Result<ImgVec<u8>> {
        if self.crop_offset >= original_height {
            return Err(Error::CropOutOfBounds {
                offset: self.crop_offset,
                height: original_height,
            });
        }

        let kept_height = original_height - self.crop_offset;
        let resized = resize_nearest(prediction, original_width, kept_height);

        if self.crop_offset == 0 {
            return Ok(resized);
        }

        let mut out = Vec::with_capacity(original_width * original_height);
        out.resize(original_width * self.crop_offset, self.background_class);
        out.extend_from_slice(resized.buf());
        Ok(ImgVec::new(out, original_width, original_height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_matches_original() {
        let pred = ImgVec::new(vec![1u8; 10 * 6], 10, 6);
        let rec = Reconstructor {
            crop_offset: 5,
            background_class: 0,
        };
        let out = rec.reconstruct(pred.as_ref(), 20, 17).unwrap();
        assert_eq!(out.width(), 20);
        assert_eq!(out.height(), 17);
    }

    #[test]
    fn test_padded_region_is_background() {
        let pred = ImgVec::new(vec![3u8; 4 * 4], 4, 4);
        let rec = Reconstructor {
            crop_offset: 2,
            background_class: 7,
        };
        let out = rec.reconstruct(pred.as_ref(), 4, 6).unwrap();

        // First crop_offset rows are background fill, the rest carry
        // the (uniform) prediction.
        assert!(out.buf()[..4 * 2].iter().all(|&v| v == 7));
        assert!(out.buf()[4 * 2..].iter().all(|&v| v == 3));
    }

    #[test]
    fn test_zero_offset_is_resample_only() {
        let pred = ImgVec::new(vec![2u8; 3 * 3], 3, 3);
        let out = Reconstructor::identity()
            .reconstruct(pred.as_ref(), 9, 9)
            .unwrap();
        assert_eq!(out.width(), 9);
        assert_eq!(out.height(), 9);
        assert!(out.buf().iter().all(|&v| v == 2));
    }

    #[test]
    fn test_offset_consuming_frame_rejected() {
        let pred = ImgVec::new(vec![0u8; 2 * 2], 2, 2);
        let rec = Reconstructor {
            crop_offset: 5,
            background_class: 0,
        };
        assert!(matches!(
            rec.reconstruct(pred.as_ref(), 2, 5),
            Err(Error::CropOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_values_stay_integral_classes() {
        // Two distinct classes; upsampling must not blend them.
        let mut data = vec![0u8; 4 * 2];
        for v in &mut data[4..] {
            *v = 5;
        }
        let pred = ImgVec::new(data, 4, 2);
        let out = Reconstructor::identity()
            .reconstruct(pred.as_ref(), 8, 8)
            .unwrap();
        assert!(out.buf().iter().all(|&v| v == 0 || v == 5));
    }
}
