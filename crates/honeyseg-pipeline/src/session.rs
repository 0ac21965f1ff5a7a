//! Interactive session state: one loaded image and its calibration.
//!
//! Loading a new image discards the previous calibration, since the
//! area-per-pixel constant only holds for the image it was measured on.
//! [`Session::process`] refuses to run until both are present.

use crate::calibration::{AreaPerPixel, ReferenceLine, ReferenceLineTracker};
use crate::diagnostics::Clock;
use crate::inference::SegmentationModel;
use crate::pipeline::{PipelineFailure, SegmentationOutcome, SegmentationPipeline};
use crate::store::TileStore;
use crate::types::{CalibrationError, Dimensions, PipelineError, RgbImage};

/// The loaded image and its calibration.
#[derive(Debug, Clone, Default)]
pub struct Session {
    source: Option<RgbImage>,
    area_per_pixel: Option<AreaPerPixel>,
}

impl Session {
    /// An empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the source image and clear the calibration.
    pub fn load_image(&mut self, image: RgbImage) {
        log::debug!("loaded {} image", Dimensions::of(&image));
        self.source = Some(image);
        self.area_per_pixel = None;
    }

    /// The loaded image, if any.
    #[must_use]
    pub const fn source(&self) -> Option<&RgbImage> {
        self.source.as_ref()
    }

    /// Source image dimensions, if an image is loaded.
    #[must_use]
    pub fn source_dimensions(&self) -> Option<Dimensions> {
        self.source.as_ref().map(Dimensions::of)
    }

    /// Start tracking a reference line drawn on a `display` sized preview.
    ///
    /// Returns `None` when no image is loaded.
    #[must_use]
    pub fn reference_tracker(&self, display: Dimensions) -> Option<ReferenceLineTracker> {
        self.source_dimensions()
            .map(|source| ReferenceLineTracker::new(display, source))
    }

    /// Calibrate from a reference line of known length.
    ///
    /// # Errors
    ///
    /// Returns the [`CalibrationError`] from [`ReferenceLine::calibrate`];
    /// the previous calibration is kept in that case.
    pub fn calibrate(
        &mut self,
        line: &ReferenceLine,
        real_length_cm: f64,
    ) -> Result<AreaPerPixel, CalibrationError> {
        let area_per_pixel = line.calibrate(real_length_cm)?;
        log::info!("calibrated at {:.6} cm² per pixel", area_per_pixel.get());
        self.area_per_pixel = Some(area_per_pixel);
        Ok(area_per_pixel)
    }

    /// Set a calibration constant measured elsewhere.
    pub const fn set_area_per_pixel(&mut self, area_per_pixel: AreaPerPixel) {
        self.area_per_pixel = Some(area_per_pixel);
    }

    /// The current calibration, if any.
    #[must_use]
    pub const fn area_per_pixel(&self) -> Option<AreaPerPixel> {
        self.area_per_pixel
    }

    /// Whether [`process`](Self::process) has what it needs.
    #[must_use]
    pub const fn can_process(&self) -> bool {
        self.source.is_some() && self.area_per_pixel.is_some()
    }

    /// Run `pipeline` over the loaded image with the current calibration.
    ///
    /// # Errors
    ///
    /// Fails at [`Stage::Idle`](crate::Stage::Idle) with
    /// [`PipelineError::NoSourceImage`] or
    /// [`CalibrationError::NotCalibrated`] before any work starts, and
    /// otherwise with whatever the pipeline reports.
    pub fn process<M, S, C>(
        &self,
        pipeline: SegmentationPipeline<'_>,
        model: &mut M,
        store: &mut S,
        clock: &C,
    ) -> Result<SegmentationOutcome, PipelineFailure>
    where
        M: SegmentationModel + ?Sized,
        S: TileStore + ?Sized,
        C: Clock,
    {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| PipelineFailure::before_start(PipelineError::NoSourceImage))?;
        let area_per_pixel = self
            .area_per_pixel
            .ok_or_else(|| PipelineFailure::before_start(CalibrationError::NotCalibrated))?;
        pipeline.run(source, area_per_pixel, model, store, clock)
    }
}
