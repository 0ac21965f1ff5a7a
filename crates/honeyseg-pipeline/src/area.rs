//! Real-world area of the positive region of a mask.

use crate::calibration::AreaPerPixel;
use crate::types::GrayImage;

/// Number of mask pixels with a nonzero value.
#[must_use]
pub fn count_positive(mask: &GrayImage) -> u64 {
    mask.as_raw().iter().filter(|&&v| v > 0).count() as u64
}

/// Area covered by the mask, in cm², rounded to 4 decimal places.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn estimate(mask: &GrayImage, area_per_pixel: AreaPerPixel) -> f64 {
    let area = count_positive(mask) as f64 * area_per_pixel.get();
    (area * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Luma;

    use super::*;

    fn mask_with_positives(width: u32, height: u32, positives: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            Luma([if y * width + x < positives { 255 } else { 0 }])
        })
    }

    #[test]
    fn five_hundred_pixels_at_two_hundredths() {
        let mask = mask_with_positives(40, 30, 500);
        assert_eq!(count_positive(&mask), 500);
        let area = estimate(&mask, AreaPerPixel::new(0.02).unwrap());
        assert!((area - 10.0).abs() < 1e-12, "got {area}");
    }

    #[test]
    fn empty_mask_has_zero_area() {
        let mask = GrayImage::new(10, 10);
        assert!(estimate(&mask, AreaPerPixel::new(1.0).unwrap()).abs() < f64::EPSILON);
    }

    #[test]
    fn any_nonzero_value_counts() {
        let mask = GrayImage::from_raw(4, 1, vec![0, 1, 128, 255]).unwrap();
        assert_eq!(count_positive(&mask), 3);
    }

    #[test]
    fn result_is_rounded_to_four_decimals() {
        let mask = mask_with_positives(3, 1, 3);
        let area = estimate(&mask, AreaPerPixel::new(0.123_456_7).unwrap());
        assert!((area - 0.3704).abs() < 1e-12, "got {area}");
    }
}
