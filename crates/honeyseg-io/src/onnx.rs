//! ONNX Runtime backed segmentation model.
//!
//! The network takes one tile scaled to `[0, 1]` and returns one
//! probability per pixel. Any output shape whose element count equals
//! the tile's pixel count is accepted (`[1, H, W, 1]`, `[1, 1, H, W]`,
//! `[1, H, W]`, `[H, W]`); all of them are row-major H x W in logical
//! order.

use std::path::{Path, PathBuf};

use honeyseg_pipeline::{ModelError, ProbabilityMap, RgbImage, SegmentationModel};
use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;

/// Errors from loading or running the ONNX model.
#[derive(Debug, thiserror::Error)]
pub enum OnnxError {
    /// The model file could not be loaded.
    #[error("failed to load model {path}: {source}")]
    Load {
        /// Model file.
        path: PathBuf,
        /// Runtime error.
        #[source]
        source: ort::Error,
    },

    /// The model declares no inputs or outputs.
    #[error("model has no {0}")]
    MissingTensor(&'static str),

    /// The runtime failed while building the input or running the session.
    #[error(transparent)]
    Runtime(#[from] ort::Error),

    /// The output does not hold one value per tile pixel.
    #[error("model output has shape {shape:?}, expected {expected} values")]
    OutputShape {
        /// Shape returned by the model.
        shape: Vec<usize>,
        /// Tile pixel count.
        expected: usize,
    },
}

/// Channel order of the input tensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TensorLayout {
    /// `[1, H, W, 3]`, as exported from Keras.
    #[default]
    Nhwc,
    /// `[1, 3, H, W]`, as exported from PyTorch.
    Nchw,
}

/// A segmentation network loaded once and run per tile.
pub struct OnnxModel {
    session: Session,
    input_name: String,
    output_name: String,
    layout: TensorLayout,
}

impl OnnxModel {
    /// Load the model at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`OnnxError`] if the runtime cannot load the file or the
    /// model has no input or output.
    pub fn load(path: &Path) -> Result<Self, OnnxError> {
        let load_err = |source| OnnxError::Load {
            path: path.to_path_buf(),
            source,
        };
        let session = Session::builder()
            .map_err(load_err)?
            .commit_from_file(path)
            .map_err(load_err)?;
        let input_name = session
            .inputs
            .first()
            .ok_or(OnnxError::MissingTensor("inputs"))?
            .name
            .clone();
        let output_name = session
            .outputs
            .first()
            .ok_or(OnnxError::MissingTensor("outputs"))?
            .name
            .clone();
        log::debug!(
            "loaded {} (input {input_name:?}, output {output_name:?})",
            path.display()
        );
        Ok(Self {
            session,
            input_name,
            output_name,
            layout: TensorLayout::default(),
        })
    }

    /// Feed tiles in `layout` instead of NHWC.
    #[must_use]
    pub const fn with_layout(mut self, layout: TensorLayout) -> Self {
        self.layout = layout;
        self
    }

    fn run(&mut self, tile: &RgbImage) -> Result<ProbabilityMap, OnnxError> {
        let input = Value::from_array(to_tensor(tile, self.layout))?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => &input])?;
        let view = outputs[self.output_name.as_str()].try_extract_array::<f32>()?;

        let expected = tile.width() as usize * tile.height() as usize;
        if view.len() != expected {
            return Err(OnnxError::OutputShape {
                shape: view.shape().to_vec(),
                expected,
            });
        }
        let values: Vec<f32> = view.iter().copied().collect();
        ProbabilityMap::from_raw(tile.width(), tile.height(), values).ok_or_else(|| {
            OnnxError::OutputShape {
                shape: vec![tile.height() as usize, tile.width() as usize],
                expected,
            }
        })
    }
}

impl SegmentationModel for OnnxModel {
    fn predict(&mut self, tile: &RgbImage) -> Result<ProbabilityMap, ModelError> {
        self.run(tile).map_err(|e| ModelError(e.to_string()))
    }
}

/// Scale a tile to `[0, 1]` and lay it out as a batch of one.
#[allow(clippy::cast_possible_truncation)]
fn to_tensor(tile: &RgbImage, layout: TensorLayout) -> Array4<f32> {
    let (w, h) = (tile.width() as usize, tile.height() as usize);
    let value = |x: usize, y: usize, c: usize| {
        f32::from(tile.get_pixel(x as u32, y as u32).0[c]) / 255.0
    };
    match layout {
        TensorLayout::Nhwc => Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| value(x, y, c)),
        TensorLayout::Nchw => Array4::from_shape_fn((1, 3, h, w), |(_, c, y, x)| value(x, y, c)),
    }
}
