//! Per-model pixel normalization of prepared tensors.
//!
//! Input tensors are `(1, H, W, C)` with values in `[0, 1]`. Every scheme but
//! `base` first restores the `[0, 255]` domain, then applies the statistics the
//! target model family was trained with.

use ndarray::{Array4, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// --- Named constants (per model family) ---
const VGGFACE_MEAN: [f32; 3] = [93.5940, 104.7624, 129.1863];
const VGGFACE2_MEAN: [f32; 3] = [91.4953, 103.8827, 131.0912];
const FACENET2018_SCALE: f32 = 127.5;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 128.0; // NOT 127.5 — matches the ArcFace paper

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("unknown normalization scheme: {0} — expected one of base, raw, Facenet, Facenet2018, VGGFace, VGGFace2, ArcFace")]
    UnknownScheme(String),
    #[error("{scheme} normalization needs a 3-channel tensor, got {channels}")]
    ChannelMismatch { scheme: NormalizationScheme, channels: usize },
}

/// Named pixel-statistics transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NormalizationScheme {
    /// Leave values in `[0, 1]`.
    #[default]
    Base,
    /// Restore `[0, 255]`.
    Raw,
    /// Per-tensor standardization.
    Facenet,
    /// `x / 127.5 - 1`.
    Facenet2018,
    /// VGGFace1 per-channel mean subtraction.
    VggFace,
    /// VGGFace2 per-channel mean subtraction.
    VggFace2,
    /// `(x - 127.5) / 128`.
    ArcFace,
}

impl NormalizationScheme {
    pub const ALL: [NormalizationScheme; 7] = [
        Self::Base,
        Self::Raw,
        Self::Facenet,
        Self::Facenet2018,
        Self::VggFace,
        Self::VggFace2,
        Self::ArcFace,
    ];

    /// Canonical name, as accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Raw => "raw",
            Self::Facenet => "Facenet",
            Self::Facenet2018 => "Facenet2018",
            Self::VggFace => "VGGFace",
            Self::VggFace2 => "VGGFace2",
            Self::ArcFace => "ArcFace",
        }
    }
}

impl fmt::Display for NormalizationScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NormalizationScheme {
    type Err = NormalizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scheme| scheme.name() == s)
            .ok_or_else(|| NormalizeError::UnknownScheme(s.to_string()))
    }
}

impl TryFrom<String> for NormalizationScheme {
    type Error = NormalizeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<NormalizationScheme> for String {
    fn from(scheme: NormalizationScheme) -> Self {
        scheme.name().to_string()
    }
}

/// Apply `scheme` to a `[0, 1]` tensor of shape `(1, H, W, C)`.
pub fn normalize_input(
    mut tensor: Array4<f32>,
    scheme: NormalizationScheme,
) -> Result<Array4<f32>, NormalizeError> {
    if scheme == NormalizationScheme::Base {
        return Ok(tensor);
    }

    tensor *= 255.0;

    match scheme {
        NormalizationScheme::Base | NormalizationScheme::Raw => {}
        NormalizationScheme::Facenet => {
            let mean = tensor.mean().unwrap_or(0.0);
            let std = tensor.std(0.0);
            tensor -= mean;
            // A flat image has nothing to scale; leave it centred at zero.
            if std > 0.0 {
                tensor /= std;
            }
        }
        NormalizationScheme::Facenet2018 => {
            tensor /= FACENET2018_SCALE;
            tensor -= 1.0;
        }
        NormalizationScheme::VggFace => subtract_channel_means(&mut tensor, scheme, VGGFACE_MEAN)?,
        NormalizationScheme::VggFace2 => subtract_channel_means(&mut tensor, scheme, VGGFACE2_MEAN)?,
        NormalizationScheme::ArcFace => {
            tensor -= ARCFACE_MEAN;
            tensor /= ARCFACE_STD;
        }
    }

    Ok(tensor)
}

/// Parse `name` and apply the scheme.
pub fn normalize_input_named(tensor: Array4<f32>, name: &str) -> Result<Array4<f32>, NormalizeError> {
    normalize_input(tensor, name.parse()?)
}

fn subtract_channel_means(
    tensor: &mut Array4<f32>,
    scheme: NormalizationScheme,
    means: [f32; 3],
) -> Result<(), NormalizeError> {
    let channels = tensor.len_of(Axis(3));
    if channels != means.len() {
        return Err(NormalizeError::ChannelMismatch { scheme, channels });
    }
    for (c, mean) in means.into_iter().enumerate() {
        tensor.index_axis_mut(Axis(3), c).mapv_inplace(|v| v - mean);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(value: f32) -> Array4<f32> {
        Array4::from_elem((1, 4, 5, 3), value)
    }

    fn ramp() -> Array4<f32> {
        Array4::from_shape_fn((1, 4, 4, 3), |(_, y, x, c)| ((y * 12 + x * 3 + c) as f32) / 47.0)
    }

    #[test]
    fn test_base_is_identity() {
        let t = ramp();
        assert_eq!(normalize_input(t.clone(), NormalizationScheme::Base).unwrap(), t);
    }

    #[test]
    fn test_raw_restores_255() {
        let out = normalize_input(filled(1.0), NormalizationScheme::Raw).unwrap();
        assert!(out.iter().all(|&v| (v - 255.0).abs() < 1e-4));
    }

    #[test]
    fn test_vggface_on_black() {
        let out = normalize_input(filled(0.0), NormalizationScheme::VggFace).unwrap();
        for (c, expected) in [-93.5940f32, -104.7624, -129.1863].into_iter().enumerate() {
            assert!(out.index_axis(Axis(3), c).iter().all(|&v| (v - expected).abs() < 1e-4));
        }
    }

    #[test]
    fn test_vggface2_on_black() {
        let out = normalize_input(filled(0.0), NormalizationScheme::VggFace2).unwrap();
        for (c, expected) in [-91.4953f32, -103.8827, -131.0912].into_iter().enumerate() {
            assert!(out.index_axis(Axis(3), c).iter().all(|&v| (v - expected).abs() < 1e-4));
        }
    }

    #[test]
    fn test_vggface_needs_three_channels() {
        let gray = Array4::<f32>::zeros((1, 2, 2, 1));
        let err = normalize_input(gray, NormalizationScheme::VggFace).unwrap_err();
        assert_eq!(
            err,
            NormalizeError::ChannelMismatch { scheme: NormalizationScheme::VggFace, channels: 1 }
        );
    }

    #[test]
    fn test_facenet_standardizes() {
        let out = normalize_input(ramp(), NormalizationScheme::Facenet).unwrap();
        let mean = out.mean().unwrap();
        let std = out.std(0.0);
        assert!(mean.abs() < 1e-4, "mean = {mean}");
        assert!((std - 1.0).abs() < 1e-4, "std = {std}");
    }

    #[test]
    fn test_facenet_flat_image() {
        let out = normalize_input(filled(0.5), NormalizationScheme::Facenet).unwrap();
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_facenet2018_range() {
        let black = normalize_input(filled(0.0), NormalizationScheme::Facenet2018).unwrap();
        let white = normalize_input(filled(1.0), NormalizationScheme::Facenet2018).unwrap();
        assert!(black.iter().all(|&v| (v + 1.0).abs() < 1e-6));
        assert!(white.iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_arcface() {
        let out = normalize_input(filled(0.5), NormalizationScheme::ArcFace).unwrap();
        let expected = (127.5 - 127.5) / 128.0;
        assert!(out.iter().all(|&v| (v - expected).abs() < 1e-5));

        let out = normalize_input(filled(1.0), NormalizationScheme::ArcFace).unwrap();
        let expected = (255.0 - 127.5) / 128.0;
        assert!(out.iter().all(|&v| (v - expected).abs() < 1e-5));
    }

    #[test]
    fn test_scheme_names_roundtrip() {
        for scheme in NormalizationScheme::ALL {
            assert_eq!(scheme.to_string().parse::<NormalizationScheme>().unwrap(), scheme);
        }
        assert_eq!("VGGFace".parse::<NormalizationScheme>().unwrap(), NormalizationScheme::VggFace);
    }

    #[test]
    fn test_unknown_scheme() {
        let err = normalize_input_named(filled(0.0), "vggface").unwrap_err();
        assert_eq!(err, NormalizeError::UnknownScheme("vggface".into()));
    }
}
