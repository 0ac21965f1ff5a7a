//! honeyseg-pipeline: Tile-based honey segmentation (sans-IO).
//!
//! Finds honey in a photograph of a frame and converts it to an area in
//! cm² through:
//! tile planning -> splitting -> per-tile inference -> mask merging ->
//! overlay rendering -> area estimation.
//!
//! This crate has **no filesystem or model-runtime dependencies**. Tiles
//! and masks pass through a [`TileStore`] and the classifier sits behind
//! [`SegmentationModel`]; the on-disk scratch layout, image loading and
//! the ONNX backend live in `honeyseg-io`.

pub mod area;
pub mod calibration;
pub mod diagnostics;
pub mod inference;
pub mod merge;
pub mod overlay;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod tiler;
pub mod tiling;
pub mod types;

pub use calibration::{
    AreaPerPixel, PointerEvent, ReferenceLine, ReferenceLineTracker, compute_area_per_pixel,
    draw_reference_line, to_source_coordinates,
};
pub use diagnostics::{Clock, PipelineDiagnostics, StdClock};
pub use inference::{CancelFlag, SegmentationModel};
pub use pipeline::{PipelineFailure, Progress, SegmentationOutcome, SegmentationPipeline, Stage};
pub use session::Session;
pub use store::{MemoryTileStore, TileStore};
pub use tiling::{TileGrid, TileRect, compute_offsets};
pub use types::{
    CalibrationError, Dimensions, GrayImage, ModelError, PipelineConfig, PipelineError, Point,
    ProbabilityMap, RgbImage, StorageError,
};

/// `done / total` as a fraction, `1.0` when there is nothing to do.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn fraction(done: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        done as f64 / total as f64
    }
}
