//! Per-tile inference: run the segmentation model over every tile and
//! binarize its output.
//!
//! The model is a black box behind [`SegmentationModel`]. Tiles are
//! processed one at a time in grid order and any model failure aborts the
//! whole run; there is no partial-result mode.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::store::TileStore;
use crate::tiling::TileGrid;
use crate::types::{
    Dimensions, GrayImage, MASK_OFF, MASK_ON, ModelError, PipelineError, ProbabilityMap, RgbImage,
};

/// A pre-trained per-pixel classifier.
///
/// `predict` receives one RGB tile and returns a single-channel
/// probability map of the same width and height.
pub trait SegmentationModel {
    /// Classify every pixel of `tile`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the backend fails.
    fn predict(&mut self, tile: &RgbImage) -> Result<ProbabilityMap, ModelError>;
}

impl<F> SegmentationModel for F
where
    F: FnMut(&RgbImage) -> Result<ProbabilityMap, ModelError>,
{
    fn predict(&mut self, tile: &RgbImage) -> Result<ProbabilityMap, ModelError> {
        self(tile)
    }
}

/// Shared flag for cooperative cancellation between tiles.
///
/// Clones share the same flag, so one clone can be handed to another
/// thread (a signal handler, a UI) and set while the pipeline runs.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Threshold a probability map into a 0/255 mask.
///
/// Values strictly greater than `threshold` become [`MASK_ON`].
#[must_use = "returns the binary mask"]
pub fn binarize(probabilities: &ProbabilityMap, threshold: f32) -> GrayImage {
    GrayImage::from_fn(probabilities.width(), probabilities.height(), |x, y| {
        if probabilities.get_pixel(x, y).0[0] > threshold {
            image::Luma([MASK_ON])
        } else {
            image::Luma([MASK_OFF])
        }
    })
}

/// Predict and binarize a single tile.
///
/// # Errors
///
/// Returns [`PipelineError::Inference`] tagged with `index` if the model
/// fails or returns a map of the wrong size.
pub fn predict_tile<M: SegmentationModel + ?Sized>(
    model: &mut M,
    index: usize,
    tile: &RgbImage,
    threshold: f32,
) -> Result<GrayImage, PipelineError> {
    let probabilities = model
        .predict(tile)
        .map_err(|source| PipelineError::Inference { index, source })?;

    let expected = Dimensions::of(tile);
    let actual = Dimensions::of(&probabilities);
    if actual != expected {
        return Err(PipelineError::Inference {
            index,
            source: ModelError(format!(
                "model returned a {actual} probability map for a {expected} tile"
            )),
        });
    }
    Ok(binarize(&probabilities, threshold))
}

/// Predict masks for an in-memory tile sequence, preserving order.
///
/// # Errors
///
/// Returns the first [`PipelineError::Inference`] encountered.
pub fn predict_tiles<M: SegmentationModel + ?Sized>(
    model: &mut M,
    tiles: &[RgbImage],
    threshold: f32,
) -> Result<Vec<GrayImage>, PipelineError> {
    tiles
        .iter()
        .enumerate()
        .map(|(index, tile)| predict_tile(model, index, tile, threshold))
        .collect()
}

/// Run the model over every tile held in `store` and store each mask
/// under the same index.
///
/// `on_tile` receives the completed fraction after each tile. `cancel`
/// is checked before each tile. Returns how many tiles had at least one
/// positive pixel.
///
/// # Errors
///
/// Returns [`PipelineError::Cancelled`] if cancellation was requested,
/// [`PipelineError::Storage`] on store failures, and
/// [`PipelineError::Inference`] on model failures.
pub fn run_inference<M, S>(
    grid: &TileGrid,
    model: &mut M,
    store: &mut S,
    threshold: f32,
    cancel: Option<&CancelFlag>,
    on_tile: &mut dyn FnMut(f64),
) -> Result<usize, PipelineError>
where
    M: SegmentationModel + ?Sized,
    S: TileStore + ?Sized,
{
    let total = grid.len();
    let mut positive_tiles = 0;
    for rect in grid.tiles() {
        if cancel.is_some_and(CancelFlag::is_cancelled) {
            log::debug!("cancelled before tile {}", rect.index);
            return Err(PipelineError::Cancelled);
        }
        let tile = store.get_tile(rect.index)?;
        let mask = predict_tile(model, rect.index, &tile, threshold)?;
        if mask.as_raw().iter().any(|&v| v > 0) {
            positive_tiles += 1;
        }
        store.put_mask(rect.index, &mask)?;
        log::trace!("predicted tile {}/{}", rect.index + 1, total);
        on_tile(crate::fraction(rect.index + 1, total));
    }
    Ok(positive_tiles)
}
