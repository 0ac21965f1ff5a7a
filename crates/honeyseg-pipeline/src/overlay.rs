//! Highlight the segmented region on top of the source image.
//!
//! Positive mask pixels are painted with the highlight color and the
//! result is blended with the source:
//! `out = source * source_weight + highlighted * mask_weight`, rounded
//! and saturated to `u8`. Where the mask is zero the highlighted layer
//! equals the source, so with weights summing to 1 those pixels pass
//! through unchanged.

use image::Rgb;

use crate::types::{Dimensions, GrayImage, PipelineError, RgbImage};

/// Blend `source` with `color` wherever `mask` is nonzero.
///
/// # Errors
///
/// Returns [`PipelineError::DimensionMismatch`] if the mask and source
/// differ in size.
pub fn blend(
    source: &RgbImage,
    mask: &GrayImage,
    color: [u8; 3],
    source_weight: f32,
    mask_weight: f32,
) -> Result<RgbImage, PipelineError> {
    let expected = Dimensions::of(source);
    let actual = Dimensions::of(mask);
    if actual != expected {
        return Err(PipelineError::DimensionMismatch {
            what: "mask".to_owned(),
            expected,
            actual,
        });
    }

    Ok(RgbImage::from_fn(source.width(), source.height(), |x, y| {
        let src = source.get_pixel(x, y).0;
        let layer = if mask.get_pixel(x, y).0[0] > 0 {
            color
        } else {
            src
        };
        Rgb(std::array::from_fn(|c| {
            weighted(src[c], layer[c], source_weight, mask_weight)
        }))
    }))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn weighted(a: u8, b: u8, wa: f32, wb: f32) -> u8 {
    f32::from(a)
        .mul_add(wa, f32::from(b) * wb)
        .round()
        .clamp(0.0, 255.0) as u8
}
