//! Cut a source image into the tiles of a [`TileGrid`].

use image::imageops;

use crate::store::TileStore;
use crate::tiling::{TileGrid, TileRect};
use crate::types::{Dimensions, PipelineError, RgbImage};

/// Copy the region of one tile out of the source image.
#[must_use = "returns the cropped tile"]
pub fn crop_tile(source: &RgbImage, grid: &TileGrid, rect: &TileRect) -> RgbImage {
    let size = grid.tile_size();
    imageops::crop_imm(source, rect.x, rect.y, size.width, size.height).to_image()
}

/// Split a source image into tiles, in grid order.
///
/// # Errors
///
/// Returns [`PipelineError::DimensionMismatch`] if the image is not the
/// size the grid was planned for.
pub fn split(source: &RgbImage, grid: &TileGrid) -> Result<Vec<RgbImage>, PipelineError> {
    check_source(source, grid)?;
    Ok(grid
        .tiles()
        .iter()
        .map(|rect| crop_tile(source, grid, rect))
        .collect())
}

/// Split a source image and write every tile to `store` under its index.
///
/// `on_tile` is called with the completed fraction after each tile.
///
/// # Errors
///
/// Returns [`PipelineError::DimensionMismatch`] if the image does not
/// match the grid, or [`PipelineError::Storage`] if the store rejects a
/// tile.
pub fn split_into<S: TileStore + ?Sized>(
    source: &RgbImage,
    grid: &TileGrid,
    store: &mut S,
    on_tile: &mut dyn FnMut(f64),
) -> Result<(), PipelineError> {
    check_source(source, grid)?;
    store.prepare(grid)?;
    let total = grid.len();
    for rect in grid.tiles() {
        let tile = crop_tile(source, grid, rect);
        store.put_tile(rect.index, &tile)?;
        log::trace!(
            "stored tile {} (row {}, col {}) at ({}, {})",
            rect.index,
            rect.row,
            rect.col,
            rect.x,
            rect.y
        );
        on_tile(crate::fraction(rect.index + 1, total));
    }
    Ok(())
}

fn check_source(source: &RgbImage, grid: &TileGrid) -> Result<(), PipelineError> {
    let actual = Dimensions::of(source);
    if actual == grid.source() {
        Ok(())
    } else {
        Err(PipelineError::DimensionMismatch {
            what: "source image".to_owned(),
            expected: grid.source(),
            actual,
        })
    }
}
