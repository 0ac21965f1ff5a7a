//! On-disk scratch storage for tiles and tile masks.
//!
//! Layout, relative to the directory holding the source image:
//!
//! ```text
//! splittedImages/
//!   .lock
//!   grid.json
//!   <base>_splitted_00000.png
//!   <base>_splitted_00001.png
//!   ...
//!   predictions/
//!     <base>_splitted_00000.png
//!     ...
//! ```
//!
//! Indices are zero-padded to five digits so a lexical listing matches
//! row-major grid order. The pipeline itself never lists the directory:
//! tiles and masks are addressed by index and the grid is persisted in
//! `grid.json`.
//!
//! Every image in a directory shares the same `splittedImages`, so runs
//! over it are serialized with a lock file. [`TileStore::prepare`]
//! creates `.lock` exclusively and fails with
//! [`ScratchError::InUse`] when another run holds it. Only the holder
//! removes the tree in [`TileStore::cleanup`], and it drops the lock
//! last. A lock left behind by a killed process has to be deleted by
//! hand; it names the process that took it.

use std::ffi::OsStr;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use honeyseg_pipeline::{GrayImage, RgbImage, StorageError, TileGrid, TileStore};

/// Errors from the scratch directory.
#[derive(Debug, thiserror::Error)]
pub enum ScratchError {
    /// The source path has no file name to derive tile names from.
    #[error("cannot derive scratch names from {0}")]
    NoFileName(PathBuf),

    /// A directory or file operation failed.
    #[error("{path}: {source}")]
    Io {
        /// Path being operated on.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Another run holds the scratch directory.
    #[error("scratch directory {root} is in use by another run (remove {lock} if none is active)")]
    InUse {
        /// The contested scratch directory.
        root: PathBuf,
        /// Its lock file.
        lock: PathBuf,
    },

    /// A tile or mask could not be encoded or decoded.
    #[error("{path}: {source}")]
    Image {
        /// Image file.
        path: PathBuf,
        /// Underlying codec error.
        #[source]
        source: image::ImageError,
    },

    /// `grid.json` could not be written or parsed.
    #[error("{path}: {source}")]
    Grid {
        /// Grid file.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Create `path` and any missing parents. An existing directory is not
/// an error.
///
/// # Errors
///
/// Returns [`ScratchError::Io`] if the directory cannot be created, or if
/// `path` exists and is not a directory.
pub fn ensure_dir(path: &Path) -> Result<(), ScratchError> {
    fs::create_dir_all(path).map_err(|source| ScratchError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Scratch directory for one source image.
///
/// Cheap to construct; nothing touches the disk until
/// [`TileStore::prepare`], which also takes the directory's run lock.
#[derive(Debug)]
pub struct ScratchDir {
    root: PathBuf,
    base: String,
    extension: String,
    locked: bool,
}

impl ScratchDir {
    /// Name of the scratch directory next to the source image.
    pub const DIR_NAME: &'static str = "splittedImages";
    /// Name of the mask subdirectory.
    pub const PREDICTIONS_DIR: &'static str = "predictions";
    /// Name of the persisted tile grid.
    pub const GRID_FILE: &'static str = "grid.json";
    /// Name of the run lock inside the scratch directory.
    pub const LOCK_FILE: &'static str = ".lock";
    /// Default file extension for tiles and masks.
    pub const DEFAULT_EXTENSION: &'static str = "png";

    /// Scratch directory for the image at `source_path`: a
    /// `splittedImages` sibling, with tiles named after the file stem.
    ///
    /// # Errors
    ///
    /// Returns [`ScratchError::NoFileName`] if `source_path` has no file
    /// stem.
    pub fn for_source(source_path: &Path) -> Result<Self, ScratchError> {
        let base = source_path
            .file_stem()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ScratchError::NoFileName(source_path.to_path_buf()))?
            .to_string_lossy()
            .into_owned();
        let parent = source_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Ok(Self::new(parent, base))
    }

    /// Scratch directory under `parent` with tiles named after `base`.
    #[must_use]
    pub fn new(parent: &Path, base: impl Into<String>) -> Self {
        Self {
            root: parent.join(Self::DIR_NAME),
            base: base.into(),
            extension: Self::DEFAULT_EXTENSION.to_owned(),
            locked: false,
        }
    }

    /// Store tiles and masks with a different image extension.
    ///
    /// Lossy formats change the pixels the model sees, so the default is
    /// PNG.
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// The `splittedImages` directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The `predictions` directory.
    #[must_use]
    pub fn predictions_dir(&self) -> PathBuf {
        self.root.join(Self::PREDICTIONS_DIR)
    }

    fn file_name(&self, index: usize) -> String {
        format!("{}_splitted_{index:05}.{}", self.base, self.extension)
    }

    /// Path of the tile with `index`.
    #[must_use]
    pub fn tile_path(&self, index: usize) -> PathBuf {
        self.root.join(self.file_name(index))
    }

    /// Path of the mask predicted for tile `index`.
    #[must_use]
    pub fn mask_path(&self, index: usize) -> PathBuf {
        self.predictions_dir().join(self.file_name(index))
    }

    /// Path of the persisted grid.
    #[must_use]
    pub fn grid_path(&self) -> PathBuf {
        self.root.join(Self::GRID_FILE)
    }

    /// Path of the run lock.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.root.join(Self::LOCK_FILE)
    }

    /// Whether this handle holds the run lock.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    /// Read back the grid written by [`TileStore::prepare`].
    ///
    /// # Errors
    ///
    /// Returns [`ScratchError`] if the file is missing or malformed.
    pub fn load_grid(&self) -> Result<TileGrid, ScratchError> {
        let path = self.grid_path();
        let text = fs::read_to_string(&path).map_err(|source| ScratchError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ScratchError::Grid { path, source })
    }

    fn write_grid(&self, grid: &TileGrid) -> Result<(), ScratchError> {
        let path = self.grid_path();
        let json = serde_json::to_string_pretty(grid).map_err(|source| ScratchError::Grid {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, json).map_err(|source| ScratchError::Io { path, source })
    }

    fn lock(&mut self) -> Result<(), ScratchError> {
        if self.locked {
            return Ok(());
        }
        let lock = self.lock_path();
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(ScratchError::InUse {
                    root: self.root.clone(),
                    lock,
                });
            }
            Err(source) => return Err(ScratchError::Io { path: lock, source }),
        };
        self.locked = true;
        writeln!(file, "locked by process {} for {}", std::process::id(), self.base)
            .map_err(|source| ScratchError::Io { path: lock, source })?;
        log::debug!("acquired {}", self.lock_path().display());
        Ok(())
    }

    /// Remove everything but the lock, then the lock, then the directory
    /// if no other run has moved in meanwhile.
    fn remove(&mut self) -> Result<(), ScratchError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ScratchError::Io { path, source }
        };
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.locked = false;
                return Ok(());
            }
            Err(e) => return Err(io_err(&self.root)(e)),
        };
        for entry in entries {
            let path = entry.map_err(io_err(&self.root))?.path();
            if path.file_name() == Some(OsStr::new(Self::LOCK_FILE)) {
                continue;
            }
            if path.is_dir() {
                fs::remove_dir_all(&path).map_err(io_err(&path))?;
            } else {
                fs::remove_file(&path).map_err(io_err(&path))?;
            }
        }

        let lock = self.lock_path();
        match fs::remove_file(&lock) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(io_err(&lock)(e)),
            _ => self.locked = false,
        }
        log::debug!("released {}", lock.display());

        match fs::remove_dir(&self.root) {
            Err(e)
                if !matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::DirectoryNotEmpty
                ) =>
            {
                Err(io_err(&self.root)(e))
            }
            _ => Ok(()),
        }
    }
}

fn save<P>(image: &image::ImageBuffer<P, Vec<P::Subpixel>>, path: &Path) -> Result<(), ScratchError>
where
    P: image::PixelWithColorType,
    [P::Subpixel]: image::EncodableLayout,
{
    image.save(path).map_err(|source| ScratchError::Image {
        path: path.to_path_buf(),
        source,
    })
}

fn open(path: &Path) -> Result<image::DynamicImage, ScratchError> {
    image::open(path).map_err(|source| ScratchError::Image {
        path: path.to_path_buf(),
        source,
    })
}

fn storage(operation: String) -> impl FnOnce(ScratchError) -> StorageError {
    move |e| StorageError::new(operation, e)
}

impl TileStore for ScratchDir {
    fn prepare(&mut self, grid: &TileGrid) -> Result<(), StorageError> {
        let op = format!("creating scratch directory {}", self.root.display());
        ensure_dir(&self.predictions_dir()).map_err(storage(op.clone()))?;
        self.lock().map_err(storage(op.clone()))?;
        self.write_grid(grid).map_err(storage(op))?;
        log::debug!(
            "scratch directory {} ready for {} tiles",
            self.root.display(),
            grid.len()
        );
        Ok(())
    }

    fn put_tile(&mut self, index: usize, tile: &RgbImage) -> Result<(), StorageError> {
        let path = self.tile_path(index);
        log::trace!("writing {}", path.display());
        save(tile, &path).map_err(storage(format!("writing tile {index}")))
    }

    fn get_tile(&self, index: usize) -> Result<RgbImage, StorageError> {
        open(&self.tile_path(index))
            .map(image::DynamicImage::into_rgb8)
            .map_err(storage(format!("reading tile {index}")))
    }

    fn put_mask(&mut self, index: usize, mask: &GrayImage) -> Result<(), StorageError> {
        let path = self.mask_path(index);
        log::trace!("writing {}", path.display());
        save(mask, &path).map_err(storage(format!("writing mask {index}")))
    }

    fn get_mask(&self, index: usize) -> Result<GrayImage, StorageError> {
        open(&self.mask_path(index))
            .map(image::DynamicImage::into_luma8)
            .map_err(storage(format!("reading mask {index}")))
    }

    fn has_mask(&self, index: usize) -> bool {
        self.mask_path(index).is_file()
    }

    fn cleanup(&mut self) -> Result<(), StorageError> {
        if !self.locked {
            log::debug!("not holding {}, leaving it", self.root.display());
            return Ok(());
        }
        log::debug!("removing {}", self.root.display());
        let op = format!("removing {}", self.root.display());
        self.remove().map_err(storage(op))
    }
}
