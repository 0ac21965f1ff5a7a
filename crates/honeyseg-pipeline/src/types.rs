//! Shared types for the honeyseg segmentation pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference masks
/// without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can reference source
/// images and tiles without depending on `image` directly.
pub use image::RgbImage;

/// Per-pixel probability output of a segmentation model.
///
/// Single channel, same spatial size as the tile that produced it.
pub type ProbabilityMap = image::ImageBuffer<image::Luma<f32>, Vec<f32>>;

/// Pixel value written for positive mask pixels.
pub const MASK_ON: u8 = 255;

/// Pixel value written for negative mask pixels.
pub const MASK_OFF: u8 = 0;

/// A 2D point in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.hypot(dy)
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of an `image` buffer.
    #[must_use]
    pub fn of<P: image::Pixel, C: std::ops::Deref<Target = [P::Subpixel]>>(
        image: &image::ImageBuffer<P, C>,
    ) -> Self {
        Self::new(image.width(), image.height())
    }

    /// Total pixel count (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Configuration for the segmentation pipeline.
///
/// Defaults reproduce the parameters the honey model was trained with:
/// 640x640 tiles at 50% overlap, a 0.5 binarization threshold and a red
/// 60/40 overlay. Call [`validate`](Self::validate) before use; the
/// orchestrator does so before touching any image data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tile width in pixels. Must match the model's input width.
    pub tile_width: u32,

    /// Tile height in pixels. Must match the model's input height.
    pub tile_height: u32,

    /// Fraction of a tile shared with its neighbour, in `[0, 1)`.
    pub overlap: f64,

    /// Probabilities strictly above this value become positive mask pixels.
    pub threshold: f32,

    /// Weight of the source image in the overlay blend.
    pub source_weight: f32,

    /// Weight of the highlight layer in the overlay blend.
    pub mask_weight: f32,

    /// RGB color painted over positive mask pixels in the overlay.
    pub highlight: [u8; 3],
}

impl PipelineConfig {
    /// Default tile width.
    pub const DEFAULT_TILE_WIDTH: u32 = 640;
    /// Default tile height.
    pub const DEFAULT_TILE_HEIGHT: u32 = 640;
    /// Default overlap fraction.
    pub const DEFAULT_OVERLAP: f64 = 0.5;
    /// Default binarization threshold.
    pub const DEFAULT_THRESHOLD: f32 = 0.5;
    /// Default overlay weight of the source image.
    pub const DEFAULT_SOURCE_WEIGHT: f32 = 0.6;
    /// Default overlay weight of the highlight layer.
    pub const DEFAULT_MASK_WEIGHT: f32 = 0.4;
    /// Default highlight color (red).
    pub const DEFAULT_HIGHLIGHT: [u8; 3] = [255, 0, 0];

    /// Tile size as [`Dimensions`].
    #[must_use]
    pub const fn tile_dimensions(&self) -> Dimensions {
        Dimensions::new(self.tile_width, self.tile_height)
    }

    /// Check every parameter against its valid range.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] describing the first
    /// offending parameter.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "tile size must be positive, got {}",
                self.tile_dimensions()
            )));
        }
        crate::tiling::stride(self.tile_width, self.overlap)?;
        crate::tiling::stride(self.tile_height, self.overlap)?;
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        for (name, weight) in [
            ("source_weight", self.source_weight),
            ("mask_weight", self.mask_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(PipelineError::InvalidConfig(format!(
                    "{name} must be finite and non-negative, got {weight}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tile_width: Self::DEFAULT_TILE_WIDTH,
            tile_height: Self::DEFAULT_TILE_HEIGHT,
            overlap: Self::DEFAULT_OVERLAP,
            threshold: Self::DEFAULT_THRESHOLD,
            source_weight: Self::DEFAULT_SOURCE_WEIGHT,
            mask_weight: Self::DEFAULT_MASK_WEIGHT,
            highlight: Self::DEFAULT_HIGHLIGHT,
        }
    }
}

/// Failure reported by a [`TileStore`](crate::store::TileStore) backend.
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed: {source}")]
pub struct StorageError {
    /// What the store was doing, e.g. `"writing tile 3"`.
    pub operation: String,
    /// Underlying backend error.
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl StorageError {
    /// Wrap a backend error with a description of the failed operation.
    pub fn new(
        operation: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self {
            operation: operation.into(),
            source: source.into(),
        }
    }
}

/// Failure reported by a [`SegmentationModel`](crate::inference::SegmentationModel).
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ModelError(pub String);

/// Errors raised while establishing or using the pixel-to-area calibration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CalibrationError {
    /// The reference line has no length in source pixels.
    #[error("reference line has zero length")]
    ZeroLengthReference,

    /// The real-world length of the reference is not a positive number.
    #[error("reference length must be a positive number of centimetres, got {0}")]
    InvalidRealLength(f64),

    /// An area-per-pixel constant is zero, negative or not finite.
    #[error("area per pixel must be positive and finite, got {0}")]
    InvalidAreaPerPixel(f64),

    /// The display surface has a zero dimension.
    #[error("display size must be positive, got {0}")]
    InvalidDisplay(Dimensions),

    /// Area was requested before a calibration was set.
    #[error("no calibration has been set for this image")]
    NotCalibrated,
}

/// Errors that can occur during pipeline processing.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// Scratch storage could not be written, read or removed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The segmentation model failed on one tile.
    #[error("inference failed on tile {index}: {source}")]
    Inference {
        /// Sequential index of the failed tile.
        index: usize,
        /// Error reported by the model.
        #[source]
        source: ModelError,
    },

    /// The number of tile masks does not match the tile grid.
    #[error("tile grid has {expected} tiles but {actual} masks were supplied")]
    Alignment {
        /// Tile count of the grid.
        expected: usize,
        /// Number of masks received.
        actual: usize,
    },

    /// An image does not have the size the stage requires.
    #[error("{what} is {actual}, expected {expected}")]
    DimensionMismatch {
        /// Which image was checked.
        what: String,
        /// Required size.
        expected: Dimensions,
        /// Size received.
        actual: Dimensions,
    },

    /// Calibration is missing or invalid.
    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    /// Processing was requested before an image was loaded.
    #[error("no source image has been loaded")]
    NoSourceImage,

    /// The run was cancelled between tiles.
    #[error("processing was cancelled")]
    Cancelled,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn point_distance() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn dimensions_display_and_count() {
        let d = Dimensions::new(1280, 960);
        assert_eq!(d.to_string(), "1280x960");
        assert_eq!(d.pixel_count(), 1_228_800);
    }

    #[test]
    fn dimensions_of_image() {
        let img = GrayImage::new(7, 3);
        assert_eq!(Dimensions::of(&img), Dimensions::new(7, 3));
    }

    #[test]
    fn pipeline_config_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.tile_dimensions(), Dimensions::new(640, 640));
        assert!((config.overlap - 0.5).abs() < f64::EPSILON);
        assert!((config.threshold - 0.5).abs() < f32::EPSILON);
        assert!((config.source_weight - 0.6).abs() < f32::EPSILON);
        assert!((config.mask_weight - 0.4).abs() < f32::EPSILON);
        assert_eq!(config.highlight, [255, 0, 0]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_tile() {
        let config = PipelineConfig {
            tile_width: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_rejects_overlap_of_one() {
        let config = PipelineConfig {
            overlap: 1.0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_rejects_negative_weight() {
        let config = PipelineConfig {
            mask_weight: -0.1,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn validate_rejects_threshold_out_of_range() {
        let config = PipelineConfig {
            threshold: 1.5,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn pipeline_config_serde_round_trip() {
        let config = PipelineConfig {
            tile_width: 256,
            tile_height: 128,
            overlap: 0.25,
            highlight: [0, 255, 0],
            ..PipelineConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn pipeline_config_partial_json_uses_defaults() {
        let config: PipelineConfig = serde_json::from_str(r#"{"tile_width": 320}"#).unwrap();
        assert_eq!(config.tile_width, 320);
        assert_eq!(config.tile_height, PipelineConfig::DEFAULT_TILE_HEIGHT);
    }

    #[test]
    fn inference_error_names_tile() {
        let err = PipelineError::Inference {
            index: 4,
            source: ModelError("boom".to_owned()),
        };
        assert_eq!(err.to_string(), "inference failed on tile 4: boom");
    }

    #[test]
    fn storage_error_display() {
        let err = StorageError::new("writing tile 2", "disk full");
        assert_eq!(err.to_string(), "writing tile 2 failed: disk full");
    }
}
