//! Reassemble per-tile masks into one full-resolution mask.
//!
//! Overlapping tile predictions are combined with a logical OR: a source
//! pixel is positive if any tile covering it predicted it positive.
//! Nothing is averaged or overwritten, so merging identical overlaps is
//! lossless.

use crate::store::TileStore;
use crate::tiling::{TileGrid, TileRect};
use crate::types::{Dimensions, GrayImage, MASK_ON, PipelineError};

/// Accumulates tile masks into a source-sized mask.
#[derive(Debug)]
pub struct MaskAccumulator<'a> {
    grid: &'a TileGrid,
    merged: GrayImage,
}

impl<'a> MaskAccumulator<'a> {
    /// Start with an all-zero mask the size of the grid's source image.
    #[must_use]
    pub fn new(grid: &'a TileGrid) -> Self {
        let source = grid.source();
        Self {
            grid,
            merged: GrayImage::new(source.width, source.height),
        }
    }

    /// OR one tile mask into its region.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::DimensionMismatch`] if `mask` is not the
    /// grid's tile size.
    pub fn add(&mut self, rect: &TileRect, mask: &GrayImage) -> Result<(), PipelineError> {
        let expected = self.grid.tile_size();
        let actual = Dimensions::of(mask);
        if actual != expected {
            return Err(PipelineError::DimensionMismatch {
                what: format!("mask of tile {}", rect.index),
                expected,
                actual,
            });
        }
        for (x, y, px) in mask.enumerate_pixels() {
            if px.0[0] > 0 {
                self.merged.get_pixel_mut(rect.x + x, rect.y + y).0[0] = MASK_ON;
            }
        }
        Ok(())
    }

    /// The merged mask.
    #[must_use]
    pub fn finish(self) -> GrayImage {
        self.merged
    }
}

/// Merge an ordered sequence of tile masks.
///
/// `masks[i]` must be the prediction for tile `i` of `grid`.
///
/// # Errors
///
/// Returns [`PipelineError::Alignment`] if the mask count differs from
/// the grid's tile count, or [`PipelineError::DimensionMismatch`] if a
/// mask is not tile sized.
pub fn merge(grid: &TileGrid, masks: &[GrayImage]) -> Result<GrayImage, PipelineError> {
    if masks.len() != grid.len() {
        return Err(PipelineError::Alignment {
            expected: grid.len(),
            actual: masks.len(),
        });
    }
    let mut acc = MaskAccumulator::new(grid);
    for (rect, mask) in grid.tiles().iter().zip(masks) {
        acc.add(rect, mask)?;
    }
    Ok(acc.finish())
}

/// Replan the grid from its parameters and merge.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if the grid cannot be
/// planned, plus the errors of [`merge`].
pub fn merge_planned(
    source: Dimensions,
    tile: Dimensions,
    overlap: f64,
    masks: &[GrayImage],
) -> Result<GrayImage, PipelineError> {
    let grid = TileGrid::plan(source, tile, overlap)?;
    merge(&grid, masks)
}

/// Merge the masks held in `store`, reading them by tile index.
///
/// Every tile of `grid` must have a mask before merging starts; a gap is
/// the same misalignment as a short mask list passed to [`merge`].
/// `on_tile` receives the completed fraction after each tile.
///
/// # Errors
///
/// Returns [`PipelineError::Alignment`] if any tile has no stored mask,
/// [`PipelineError::Storage`] if a stored mask cannot be read, plus the
/// errors of [`MaskAccumulator::add`].
pub fn merge_from_store<S: TileStore + ?Sized>(
    grid: &TileGrid,
    store: &S,
    on_tile: &mut dyn FnMut(f64),
) -> Result<GrayImage, PipelineError> {
    let stored = grid.tiles().iter().filter(|r| store.has_mask(r.index)).count();
    if stored != grid.len() {
        return Err(PipelineError::Alignment {
            expected: grid.len(),
            actual: stored,
        });
    }
    let mut acc = MaskAccumulator::new(grid);
    for rect in grid.tiles() {
        let mask = store.get_mask(rect.index)?;
        acc.add(rect, &mask)?;
        on_tile(crate::fraction(rect.index + 1, grid.len()));
    }
    Ok(acc.finish())
}
