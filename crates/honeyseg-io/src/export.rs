//! Writing pipeline results.
//!
//! Two files per image, in a caller-chosen directory:
//! `<name>_honey-Mask.<ext>` and `<name>_honey-Highlighted.<ext>`.

use std::path::{Path, PathBuf};

use honeyseg_pipeline::{GrayImage, RgbImage};
use image::ImageFormat;

use crate::scratch::{ScratchError, ensure_dir};

/// Errors from exporting results.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The extension does not name a supported image format.
    #[error("unsupported export format: {0:?}")]
    UnsupportedFormat(String),

    /// The output directory could not be created.
    #[error(transparent)]
    Directory(#[from] ScratchError),

    /// An image could not be encoded.
    #[error("failed to write {path}: {source}")]
    Encode {
        /// Destination file.
        path: PathBuf,
        /// Underlying encoder error.
        #[source]
        source: image::ImageError,
    },
}

/// Where [`export_results`] put each file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    /// The binary mask.
    pub mask: PathBuf,
    /// The highlighted overlay.
    pub overlay: PathBuf,
}

impl ExportPaths {
    /// Paths for `name` in `dir` with image extension `ext`.
    #[must_use]
    pub fn new(dir: &Path, name: &str, ext: &str) -> Self {
        Self {
            mask: dir.join(format!("{name}_honey-Mask.{ext}")),
            overlay: dir.join(format!("{name}_honey-Highlighted.{ext}")),
        }
    }
}

/// Write a single RGB image, choosing the format from the extension and
/// creating the parent directory if needed.
///
/// # Errors
///
/// Returns [`ExportError`] if the extension is not a supported format,
/// the directory cannot be created, or encoding fails.
pub fn save_rgb(path: &Path, image: &RgbImage) -> Result<(), ExportError> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let format = writable_format(&ext)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    image
        .save_with_format(path, format)
        .map_err(|source| ExportError::Encode {
            path: path.to_path_buf(),
            source,
        })
}

fn writable_format(ext: &str) -> Result<ImageFormat, ExportError> {
    ImageFormat::from_extension(ext)
        .filter(ImageFormat::writing_enabled)
        .ok_or_else(|| ExportError::UnsupportedFormat(ext.to_owned()))
}

/// Write `mask` and `overlay` into `dir`, creating it if needed.
///
/// # Errors
///
/// Returns [`ExportError`] if `ext` is not a supported format, the
/// directory cannot be created, or either image fails to encode.
pub fn export_results(
    dir: &Path,
    name: &str,
    ext: &str,
    mask: &GrayImage,
    overlay: &RgbImage,
) -> Result<ExportPaths, ExportError> {
    let format = writable_format(ext)?;
    ensure_dir(dir)?;

    let paths = ExportPaths::new(dir, name, ext);
    mask.save_with_format(&paths.mask, format)
        .map_err(|source| ExportError::Encode {
            path: paths.mask.clone(),
            source,
        })?;
    overlay
        .save_with_format(&paths.overlay, format)
        .map_err(|source| ExportError::Encode {
            path: paths.overlay.clone(),
            source,
        })?;
    log::info!(
        "wrote {} and {}",
        paths.mask.display(),
        paths.overlay.display()
    );
    Ok(paths)
}
