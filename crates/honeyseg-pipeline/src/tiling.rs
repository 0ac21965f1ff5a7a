//! Tile planning: where the fixed-size windows fall on a large image.
//!
//! A dimension of `total` pixels is covered by windows of `tile` pixels
//! that advance by `floor(tile * (1 - overlap))`. The last window is
//! clamped so it ends exactly on the image boundary, which can make the
//! final overlap larger than the nominal fraction. The OR-merge downstream
//! tolerates any amount of overlap.
//!
//! The full 2-D plan is a [`TileGrid`]: the cartesian product of the X and
//! Y offsets, ordered row-major (Y outer, X inner). Splitting and merging
//! both iterate the same `TileGrid` value, so tile `index` always refers
//! to the same source region.

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, PipelineError};

/// Distance between consecutive window starts.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `tile` is zero, `overlap`
/// is outside `[0, 1)`, or the stride rounds down to zero.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn stride(tile: u32, overlap: f64) -> Result<u32, PipelineError> {
    if tile == 0 {
        return Err(PipelineError::InvalidConfig(
            "tile size must be positive".to_owned(),
        ));
    }
    if !(0.0..1.0).contains(&overlap) {
        return Err(PipelineError::InvalidConfig(format!(
            "overlap must be within [0, 1), got {overlap}"
        )));
    }
    let stride = (f64::from(tile) * (1.0 - overlap)).floor() as u32;
    if stride == 0 {
        return Err(PipelineError::InvalidConfig(format!(
            "overlap {overlap} leaves no stride for {tile} px tiles"
        )));
    }
    Ok(stride)
}

/// Start offsets of the windows covering one image dimension.
///
/// The first offset is 0, offsets strictly increase, and the last one is
/// `total - tile`, so every window lies inside `[0, total)`.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if the parameters are
/// invalid (see [`stride`]) or if `tile > total`.
pub fn compute_offsets(total: u32, tile: u32, overlap: f64) -> Result<Vec<u32>, PipelineError> {
    let stride = stride(tile, overlap)?;
    if tile > total {
        return Err(PipelineError::InvalidConfig(format!(
            "tile size {tile} exceeds image size {total}"
        )));
    }

    let mut offsets = Vec::new();
    let mut offset = 0_u32;
    loop {
        if u64::from(offset) + u64::from(tile) >= u64::from(total) {
            offsets.push(total - tile);
            return Ok(offsets);
        }
        offsets.push(offset);
        offset += stride;
    }
}

/// One window of a [`TileGrid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRect {
    /// Sequential row-major index, the tile's identity in storage.
    pub index: usize,
    /// Row in the grid (0-based, top to bottom).
    pub row: usize,
    /// Column in the grid (0-based, left to right).
    pub col: usize,
    /// Left edge in source pixels.
    pub x: u32,
    /// Top edge in source pixels.
    pub y: u32,
}

/// The ordered set of tile windows for one source image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileGrid {
    source: Dimensions,
    tile: Dimensions,
    columns: usize,
    rows: usize,
    tiles: Vec<TileRect>,
}

impl TileGrid {
    /// Plan the grid for a source image.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if either axis cannot be
    /// planned (see [`compute_offsets`]).
    pub fn plan(source: Dimensions, tile: Dimensions, overlap: f64) -> Result<Self, PipelineError> {
        let xs = compute_offsets(source.width, tile.width, overlap)?;
        let ys = compute_offsets(source.height, tile.height, overlap)?;

        let tiles = ys
            .iter()
            .enumerate()
            .flat_map(|(row, &y)| {
                xs.iter()
                    .enumerate()
                    .map(move |(col, &x)| (row, col, x, y))
            })
            .enumerate()
            .map(|(index, (row, col, x, y))| TileRect {
                index,
                row,
                col,
                x,
                y,
            })
            .collect();

        Ok(Self {
            source,
            tile,
            columns: xs.len(),
            rows: ys.len(),
            tiles,
        })
    }

    /// Source image dimensions the grid was planned for.
    #[must_use]
    pub const fn source(&self) -> Dimensions {
        self.source
    }

    /// Size of every tile.
    #[must_use]
    pub const fn tile_size(&self) -> Dimensions {
        self.tile
    }

    /// Number of tile columns.
    #[must_use]
    pub const fn columns(&self) -> usize {
        self.columns
    }

    /// Number of tile rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Total number of tiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Returns `true` if the grid has no tiles. A planned grid never is.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// All tiles in row-major order.
    #[must_use]
    pub fn tiles(&self) -> &[TileRect] {
        &self.tiles
    }

    /// Tile at a given row and column.
    #[must_use]
    pub fn at(&self, row: usize, col: usize) -> Option<&TileRect> {
        if row >= self.rows || col >= self.columns {
            return None;
        }
        self.tiles.get(row * self.columns + col)
    }
}
