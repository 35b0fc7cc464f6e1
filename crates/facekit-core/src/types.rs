use ndarray::{Array3, Array4};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Decoded pixel array, shape `(height, width, channels)`.
///
/// Color images are BGR with 3 channels, grayscale images carry a single
/// channel. Decoded images hold values in the `[0, 255]` domain.
pub type Image = Array3<f32>;

/// Default spatial size of a prepared tensor.
pub const DEFAULT_TARGET_SIZE: TargetSize = TargetSize { width: 224, height: 224 };

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetSizeError {
    #[error("target size must be positive, got {width}x{height}")]
    NonPositive { width: u32, height: u32 },
    #[error("invalid target size {0:?} — expected WIDTHxHEIGHT or a single number")]
    Malformed(String),
}

/// Rectangle of a face in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub top: u32,
    pub left: u32,
    pub height: u32,
    pub width: u32,
}

impl Region {
    pub fn new(top: u32, left: u32, height: u32, width: u32) -> Self {
        Self { top, left, height, width }
    }

    /// The whole-image region `(0, 0, H, W)` used for skipped detection and fallback.
    pub fn whole(image: &Image) -> Self {
        let (height, width, _) = image.dim();
        Self {
            top: 0,
            left: 0,
            height: height as u32,
            width: width as u32,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        self.height == 0 || self.width == 0
    }
}

/// One face candidate: the crop and where it came from.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub image: Image,
    pub region: Region,
}

impl DetectedFace {
    pub fn new(image: Image, region: Region) -> Self {
        Self { image, region }
    }

    /// Wrap the whole image as a face.
    pub fn whole(image: Image) -> Self {
        let region = Region::whole(&image);
        Self { image, region }
    }

    /// `(height, width)` of the crop.
    pub fn crop_size(&self) -> (usize, usize) {
        let (h, w, _) = self.image.dim();
        (h, w)
    }
}

/// Spatial size `(width, height)` of a prepared tensor. Both components are > 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(u32, u32)", into = "(u32, u32)")]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    pub fn new(width: u32, height: u32) -> Result<Self, TargetSizeError> {
        if width == 0 || height == 0 {
            return Err(TargetSizeError::NonPositive { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn square(side: u32) -> Result<Self, TargetSizeError> {
        Self::new(side, side)
    }
}

impl Default for TargetSize {
    fn default() -> Self {
        DEFAULT_TARGET_SIZE
    }
}

impl fmt::Display for TargetSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for TargetSize {
    type Err = TargetSizeError;

    /// Parses `"224x224"` or `"224"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || TargetSizeError::Malformed(s.to_string());
        let trimmed = s.trim();
        match trimmed.split_once(['x', 'X']) {
            Some((w, h)) => {
                let width = w.trim().parse().map_err(|_| malformed())?;
                let height = h.trim().parse().map_err(|_| malformed())?;
                Self::new(width, height)
            }
            None => Self::square(trimmed.parse().map_err(|_| malformed())?),
        }
    }
}

impl TryFrom<(u32, u32)> for TargetSize {
    type Error = TargetSizeError;

    fn try_from((width, height): (u32, u32)) -> Result<Self, Self::Error> {
        Self::new(width, height)
    }
}

impl From<TargetSize> for (u32, u32) {
    fn from(size: TargetSize) -> Self {
        (size.width, size.height)
    }
}

/// Output of the preprocessing pipeline.
#[derive(Debug, Clone)]
pub struct PreparedFace {
    /// Tensor of shape `(1, height, width, channels)`.
    pub tensor: Array4<f32>,
    /// Region of the face in the original image.
    pub region: Region,
}
