//! Recognition model input-shape resolution.
//!
//! Reads the spatial size a recognition model expects from its declared
//! input shape, so crops can be prepared at exactly that size.

use crate::types::{TargetSize, TargetSizeError};
use ort::session::Session;
use ort::value::ValueType;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShapeError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("model declares no input shape")]
    EmptyShape,
    #[error("input shape {0:?} has no spatial dimensions")]
    TooFewDims(Vec<Option<usize>>),
    #[error("input shape {0:?} has a dynamic spatial dimension")]
    DynamicDimension(Vec<Option<usize>>),
    #[error("first model input is not a tensor")]
    NotATensor,
    #[error(transparent)]
    InvalidTargetSize(#[from] TargetSizeError),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Declared input shape of a model's first layer. `None` marks a dynamic dimension.
///
/// Some model descriptions report the shape directly, others wrap it in a
/// one-element list; both carry the batch dimension first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclaredShape {
    Single(Vec<Option<usize>>),
    List(Vec<Vec<Option<usize>>>),
}

impl DeclaredShape {
    /// Normalize to the single-shape form.
    pub fn into_single(self) -> Option<Vec<Option<usize>>> {
        match self {
            Self::Single(dims) => Some(dims),
            Self::List(shapes) => shapes.into_iter().next(),
        }
    }
}

/// Anything that can report the input shape of a recognition model.
pub trait ModelInputShape {
    fn declared_input_shape(&self) -> Result<DeclaredShape, ShapeError>;
}

/// How the declared spatial pair maps onto width and height.
///
/// Some model runtimes declare `(W, H)` where the shape reads as `(H, W)`;
/// `Swapped` corrects for that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisOrder {
    #[default]
    AsDeclared,
    Swapped,
}

/// Resolve the spatial size a model expects.
///
/// Drops the batch dimension and reads `(H, W)` from a channels-last shape
/// `(N, H, W, C)`. A channels-first shape `(N, C, H, W)` with 1 or 3 channels
/// is recognised as well.
pub fn find_input_shape<M: ModelInputShape + ?Sized>(
    model: &M,
    order: AxisOrder,
) -> Result<TargetSize, ShapeError> {
    let dims = model.declared_input_shape()?.into_single().ok_or(ShapeError::EmptyShape)?;
    if dims.is_empty() {
        return Err(ShapeError::EmptyShape);
    }

    let spatial = spatial_dims(&dims).ok_or_else(|| ShapeError::TooFewDims(dims.clone()))?;
    let (height, width) = match spatial {
        (Some(h), Some(w)) => (h, w),
        _ => return Err(ShapeError::DynamicDimension(dims)),
    };

    let size = match order {
        AxisOrder::AsDeclared => TargetSize::new(width as u32, height as u32)?,
        AxisOrder::Swapped => TargetSize::new(height as u32, width as u32)?,
    };
    tracing::debug!(?dims, ?order, %size, "resolved model input size");
    Ok(size)
}

/// Pick `(H, W)` out of a batched shape.
fn spatial_dims(dims: &[Option<usize>]) -> Option<(Option<usize>, Option<usize>)> {
    match dims {
        [_, c, h, w] if is_channel_count(*c) && !is_channel_count(*w) => Some((*h, *w)),
        [_, h, w, ..] => Some((*h, *w)),
        _ => None,
    }
}

fn is_channel_count(dim: Option<usize>) -> bool {
    matches!(dim, Some(1) | Some(3))
}

/// An ONNX recognition model, opened only to read its declared input.
pub struct OnnxModel {
    session: Session,
}

impl OnnxModel {
    /// Load an ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, ShapeError> {
        if !Path::new(model_path).exists() {
            return Err(ShapeError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(1)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            "loaded recognition model"
        );

        Ok(Self { session })
    }

    /// Shape of the first input, or `NotATensor` if it is a map or sequence.
    pub fn input_dims(&self) -> Result<Vec<Option<usize>>, ShapeError> {
        let input = self.session.inputs().first().ok_or(ShapeError::EmptyShape)?;
        match input.dtype() {
            ValueType::Tensor { shape, .. } => Ok(shape.iter().map(|&d| onnx_dim(d)).collect()),
            _ => Err(ShapeError::NotATensor),
        }
    }
}

impl ModelInputShape for OnnxModel {
    fn declared_input_shape(&self) -> Result<DeclaredShape, ShapeError> {
        self.input_dims().map(DeclaredShape::Single)
    }
}

/// ONNX marks dynamic dimensions with -1 (or 0 for symbolic names).
fn onnx_dim(dim: i64) -> Option<usize> {
    usize::try_from(dim).ok().filter(|&d| d > 0)
}
