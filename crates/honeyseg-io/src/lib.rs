//! honeyseg-io: filesystem and model plumbing for the honeyseg pipeline.
//!
//! - [`scratch`]: the on-disk [`TileStore`](honeyseg_pipeline::TileStore)
//!   next to the source image.
//! - [`export`]: writing the mask and highlighted overlay.
//! - [`load`]: decoding source images into RGB buffers.
//! - `onnx` (feature `onnx`): an ONNX Runtime backed
//!   [`SegmentationModel`](honeyseg_pipeline::SegmentationModel).

pub mod export;
pub mod load;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod scratch;

pub use export::{ExportError, ExportPaths, export_results, save_rgb};
pub use load::{LoadError, load_rgb};
#[cfg(feature = "onnx")]
pub use onnx::{OnnxError, OnnxModel, TensorLayout};
pub use scratch::{ScratchDir, ScratchError, ensure_dir};
