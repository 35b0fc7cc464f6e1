//! facekit-core — Face image preprocessing for recognition models.
//!
//! Loads images from paths, base64 data URIs or pixel arrays, locates the
//! face through a pluggable detector backend, letterboxes it to the model's
//! input size and applies per-model pixel normalization.

pub mod config;
pub mod detector;
pub mod geometry;
pub mod input_shape;
pub mod loader;
pub mod normalization;
pub mod pipeline;
pub mod types;

pub use config::Config;
pub use detector::{DetectionOutcome, DetectorRegistry, FaceDetectorBackend, SKIP_BACKEND};
pub use input_shape::{find_input_shape, AxisOrder, DeclaredShape, ModelInputShape, OnnxModel};
pub use loader::{load_image, ImageSource};
pub use normalization::{normalize_input, NormalizationScheme};
pub use pipeline::{PreprocessError, PreprocessOptions, Preprocessor};
pub use types::{DetectedFace, Image, PreparedFace, Region, TargetSize};
