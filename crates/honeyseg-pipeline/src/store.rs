//! Storage seam for per-tile intermediates.
//!
//! The pipeline never touches the filesystem itself. Tiles and their
//! predicted masks go through a [`TileStore`], addressed by the tile's
//! sequential index in the [`TileGrid`]. `honeyseg-io` provides the
//! on-disk scratch directory; [`MemoryTileStore`] keeps everything in
//! memory for tests and callers that have the RAM to spare.

use std::collections::BTreeMap;

use crate::tiling::TileGrid;
use crate::types::{GrayImage, RgbImage, StorageError};

/// Indexed storage for tiles and tile masks during one pipeline run.
///
/// A store is single-writer: one run owns it from [`prepare`](Self::prepare)
/// until [`cleanup`](Self::cleanup). Backends shared between runs must
/// refuse a second `prepare` while the first run holds them, and a refused
/// store's `cleanup` must leave the holder's data alone.
pub trait TileStore {
    /// Make the store ready for a run over `grid`.
    ///
    /// Must be idempotent: preparing an already-prepared store is not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backing storage cannot be created.
    fn prepare(&mut self, grid: &TileGrid) -> Result<(), StorageError>;

    /// Persist the source tile with the given index.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the tile cannot be written.
    fn put_tile(&mut self, index: usize, tile: &RgbImage) -> Result<(), StorageError>;

    /// Load the source tile with the given index.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the tile is missing or unreadable.
    fn get_tile(&self, index: usize) -> Result<RgbImage, StorageError>;

    /// Persist the binary mask predicted for the given tile index.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the mask cannot be written.
    fn put_mask(&mut self, index: usize, mask: &GrayImage) -> Result<(), StorageError>;

    /// Load the binary mask predicted for the given tile index.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the mask is missing or unreadable.
    fn get_mask(&self, index: usize) -> Result<GrayImage, StorageError>;

    /// Whether a mask has been stored for the given tile index.
    fn has_mask(&self, index: usize) -> bool;

    /// Remove everything the run stored.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if removal fails.
    fn cleanup(&mut self) -> Result<(), StorageError>;
}

/// In-memory [`TileStore`].
#[derive(Debug, Default)]
pub struct MemoryTileStore {
    tiles: BTreeMap<usize, RgbImage>,
    masks: BTreeMap<usize, GrayImage>,
}

impl MemoryTileStore {
    /// Number of stored tiles.
    #[must_use]
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Number of stored masks.
    #[must_use]
    pub fn mask_count(&self) -> usize {
        self.masks.len()
    }
}

fn missing(kind: &str, index: usize) -> StorageError {
    StorageError::new(format!("reading {kind} {index}"), "not stored")
}

impl TileStore for MemoryTileStore {
    fn prepare(&mut self, _grid: &TileGrid) -> Result<(), StorageError> {
        Ok(())
    }

    fn put_tile(&mut self, index: usize, tile: &RgbImage) -> Result<(), StorageError> {
        self.tiles.insert(index, tile.clone());
        Ok(())
    }

    fn get_tile(&self, index: usize) -> Result<RgbImage, StorageError> {
        self.tiles
            .get(&index)
            .cloned()
            .ok_or_else(|| missing("tile", index))
    }

    fn put_mask(&mut self, index: usize, mask: &GrayImage) -> Result<(), StorageError> {
        self.masks.insert(index, mask.clone());
        Ok(())
    }

    fn get_mask(&self, index: usize) -> Result<GrayImage, StorageError> {
        self.masks
            .get(&index)
            .cloned()
            .ok_or_else(|| missing("mask", index))
    }

    fn has_mask(&self, index: usize) -> bool {
        self.masks.contains_key(&index)
    }

    fn cleanup(&mut self) -> Result<(), StorageError> {
        self.tiles.clear();
        self.masks.clear();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trips_by_index() {
        let mut store = MemoryTileStore::default();
        let tile = RgbImage::from_pixel(2, 2, image::Rgb([1, 2, 3]));
        let mask = GrayImage::from_pixel(2, 2, image::Luma([255]));
        store.put_tile(3, &tile).unwrap();
        store.put_mask(3, &mask).unwrap();
        assert_eq!(store.get_tile(3).unwrap(), tile);
        assert_eq!(store.get_mask(3).unwrap(), mask);
        assert!(store.has_mask(3));
        assert!(!store.has_mask(2));
    }

    #[test]
    fn missing_entries_are_errors() {
        let store = MemoryTileStore::default();
        let err = store.get_mask(7).unwrap_err();
        assert_eq!(err.to_string(), "reading mask 7 failed: not stored");
    }

    #[test]
    fn cleanup_empties_the_store() {
        let mut store = MemoryTileStore::default();
        store.put_tile(0, &RgbImage::new(1, 1)).unwrap();
        store.put_mask(0, &GrayImage::new(1, 1)).unwrap();
        store.cleanup().unwrap();
        assert_eq!(store.tile_count(), 0);
        assert_eq!(store.mask_count(), 0);
    }
}
