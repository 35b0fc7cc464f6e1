//! Image loading — resolves an [`ImageSource`] into a decoded BGR pixel array.

use crate::types::Image;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageReader};
use ndarray::Array3;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Literal prefix marking a base64 data URI.
pub const DATA_URI_PREFIX: &str = "data:image/";

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("image not found: {} — confirm that the path exists", .0.display())]
    NotFound(PathBuf),
    #[error("data URI has no ',' separating the header from the base64 payload")]
    InvalidDataUri,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

/// Where an image comes from. Resolved exactly once per call by [`load_image`].
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Path to an encoded image file.
    Path(PathBuf),
    /// `data:image/<subtype>;base64,<payload>` string.
    Base64(String),
    /// Already-decoded `(H, W, C)` pixels.
    Pixels(Image),
}

impl ImageSource {
    /// Classify a string descriptor: data URIs become [`ImageSource::Base64`],
    /// everything else is treated as a filesystem path.
    pub fn classify(descriptor: &str) -> Self {
        if is_data_uri(descriptor) {
            Self::Base64(descriptor.to_string())
        } else {
            Self::Path(PathBuf::from(descriptor))
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Path(_) => "path",
            Self::Base64(_) => "base64",
            Self::Pixels(_) => "pixels",
        }
    }
}

/// The bare prefix alone does not count: it carries no payload.
fn is_data_uri(descriptor: &str) -> bool {
    descriptor.len() > DATA_URI_PREFIX.len() && descriptor.starts_with(DATA_URI_PREFIX)
}

impl From<&str> for ImageSource {
    fn from(descriptor: &str) -> Self {
        Self::classify(descriptor)
    }
}

impl From<String> for ImageSource {
    fn from(descriptor: String) -> Self {
        if is_data_uri(&descriptor) {
            Self::Base64(descriptor)
        } else {
            Self::Path(PathBuf::from(descriptor))
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<Image> for ImageSource {
    fn from(pixels: Image) -> Self {
        Self::Pixels(pixels)
    }
}

impl From<Array3<u8>> for ImageSource {
    fn from(pixels: Array3<u8>) -> Self {
        Self::Pixels(pixels.mapv(f32::from))
    }
}

/// Resolve an image source into decoded pixels.
///
/// Raw pixels pass through untouched; data URIs and files are decoded into
/// a 3-channel BGR array.
pub fn load_image(source: ImageSource) -> Result<Image, LoadError> {
    let kind = source.kind();
    let image = match source {
        ImageSource::Pixels(pixels) => pixels,
        ImageSource::Base64(uri) => load_base64(&uri)?,
        ImageSource::Path(path) => load_file(&path)?,
    };

    let (height, width, channels) = image.dim();
    tracing::debug!(source = kind, height, width, channels, "image loaded");
    Ok(image)
}

/// Decode a `data:image/...;base64,<payload>` URI.
///
/// Only the part after the first comma is decoded; the header is not inspected.
/// Whitespace anywhere in the payload (e.g. line-wrapped base64) is ignored.
pub fn load_base64(uri: &str) -> Result<Image, LoadError> {
    let (_, payload) = uri.split_once(',').ok_or(LoadError::InvalidDataUri)?;
    let compact: Vec<u8> = payload
        .bytes()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD.decode(compact)?;
    decode_image_bytes(&bytes)
}

fn load_file(path: &Path) -> Result<Image, LoadError> {
    if !path.is_file() {
        return Err(LoadError::NotFound(path.to_path_buf()));
    }
    // Sniff the container from content so a misleading extension still decodes.
    let decoded = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(dynamic_to_bgr(&decoded))
}

/// Decode an encoded image (PNG, JPEG, ...) from memory into BGR pixels.
pub fn decode_image_bytes(bytes: &[u8]) -> Result<Image, LoadError> {
    let decoded = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;
    Ok(dynamic_to_bgr(&decoded))
}

/// Convert a decoded image into a `(H, W, 3)` BGR array.
pub fn dynamic_to_bgr(decoded: &DynamicImage) -> Image {
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut out = Image::zeros((height as usize, width as usize, 3));
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let (y, x) = (y as usize, x as usize);
        out[[y, x, 0]] = f32::from(b);
        out[[y, x, 1]] = f32::from(g);
        out[[y, x, 2]] = f32::from(r);
    }
    out
}
