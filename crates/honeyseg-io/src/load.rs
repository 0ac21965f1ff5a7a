//! Source image decoding.

use std::path::{Path, PathBuf};

use honeyseg_pipeline::RgbImage;

/// Errors from loading a source image.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The file could not be opened or decoded.
    #[error("failed to load {path}: {source}")]
    Decode {
        /// File that was read.
        path: PathBuf,
        /// Underlying decoder error.
        #[source]
        source: image::ImageError,
    },

    /// The image has no pixels.
    #[error("{0} is empty")]
    Empty(PathBuf),
}

/// Load any supported raster (PNG, JPEG, BMP, WebP) as 8-bit RGB.
///
/// Alpha is dropped and grayscale is expanded, so every later stage sees
/// three channels in RGB order.
///
/// # Errors
///
/// Returns [`LoadError`] if the file cannot be decoded or has no pixels.
pub fn load_rgb(path: &Path) -> Result<RgbImage, LoadError> {
    let decoded = image::open(path).map_err(|source| LoadError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    let rgb = decoded.into_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(LoadError::Empty(path.to_path_buf()));
    }
    log::debug!(
        "loaded {} ({}x{})",
        path.display(),
        rgb.width(),
        rgb.height()
    );
    Ok(rgb)
}
