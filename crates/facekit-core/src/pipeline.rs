//! End-to-end face preprocessing: load → detect → reshape → normalize.

use crate::detector::{DetectorError, DetectorRegistry, SKIP_BACKEND};
use crate::geometry::{self, GeometryError};
use crate::loader::{self, ImageSource, LoadError};
use crate::normalization::{self, NormalizationScheme, NormalizeError};
use crate::types::{PreparedFace, Region, TargetSize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

/// Per-call preprocessing settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessOptions {
    pub target_size: TargetSize,
    pub grayscale: bool,
    pub enforce_detection: bool,
    pub detector_backend: String,
    pub align: bool,
    pub normalization: NormalizationScheme,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            target_size: TargetSize::default(),
            grayscale: false,
            enforce_detection: true,
            detector_backend: SKIP_BACKEND.to_string(),
            align: true,
            normalization: NormalizationScheme::Base,
        }
    }
}

/// Prepares face tensors for a recognition model.
///
/// Owns the detector registry, so backends are built once per preprocessor
/// and reused across calls.
#[derive(Debug, Default)]
pub struct Preprocessor {
    registry: DetectorRegistry,
}

impl Preprocessor {
    pub fn new(registry: DetectorRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &DetectorRegistry {
        &self.registry
    }

    /// Turn `source` into a `(1, H, W, C)` tensor of its primary face.
    ///
    /// When the primary crop is empty or its region has zero extent, the
    /// whole decoded image and the whole-image region are used instead.
    pub fn preprocess_face(
        &self,
        source: impl Into<ImageSource>,
        options: &PreprocessOptions,
    ) -> Result<PreparedFace, PreprocessError> {
        let image = loader::load_image(source.into())?;
        let original = image.clone();

        let faces = self.registry.detect_faces(
            image,
            &options.detector_backend,
            options.align,
            options.enforce_detection,
        )?;
        let Some(primary) = faces.into_iter().next() else {
            // detect_faces always yields at least one face on success
            return Err(DetectorError::NoFaceDetected.into());
        };

        let (crop_h, crop_w) = primary.crop_size();
        let (crop, region) = if crop_h == 0 || crop_w == 0 || primary.region.is_degenerate() {
            tracing::debug!(
                crop_h, crop_w, region = ?primary.region,
                "primary face degenerate, using whole image"
            );
            let region = Region::whole(&original);
            (original, region)
        } else {
            (primary.image, primary.region)
        };

        let reshaped = geometry::reshape_face(&crop, options.target_size, options.grayscale)?;
        let tensor = normalization::normalize_input(geometry::to_tensor(&reshaped), options.normalization)?;

        tracing::debug!(
            backend = %options.detector_backend,
            shape = ?tensor.shape(),
            ?region,
            normalization = %options.normalization,
            "face preprocessed"
        );

        Ok(PreparedFace { tensor, region })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{DetectionOutcome, FaceDetectorBackend};
    use crate::types::{DetectedFace, Image};
    use ndarray::{s, Array3, Axis};

    struct EmptyCropBackend;

    impl FaceDetectorBackend for EmptyCropBackend {
        fn detect(&self, _image: &Image, _align: bool) -> DetectionOutcome {
            DetectionOutcome::Succeeded(vec![DetectedFace::new(
                Image::zeros((0, 0, 3)),
                Region::new(5, 5, 0, 0),
            )])
        }
    }

    /// Returns real pixels but a zero-extent region.
    struct ZeroRegionBackend;

    impl FaceDetectorBackend for ZeroRegionBackend {
        fn detect(&self, _image: &Image, _align: bool) -> DetectionOutcome {
            DetectionOutcome::Succeeded(vec![DetectedFace::new(
                Image::zeros((10, 10, 3)),
                Region::new(0, 0, 0, 0),
            )])
        }
    }

    struct CenterBackend;

    impl FaceDetectorBackend for CenterBackend {
        fn detect(&self, image: &Image, _align: bool) -> DetectionOutcome {
            let (h, w, _) = image.dim();
            let crop = image.slice(s![h / 4..3 * h / 4, w / 4..3 * w / 4, ..]).to_owned();
            let region = Region::new((h / 4) as u32, (w / 4) as u32, (h / 2) as u32, (w / 2) as u32);
            DetectionOutcome::Succeeded(vec![DetectedFace::new(crop, region)])
        }
    }

    fn preprocessor() -> Preprocessor {
        let mut registry = DetectorRegistry::new();
        registry.register("empty-crop", || Ok(EmptyCropBackend));
        registry.register("center", || Ok(CenterBackend));
        registry.register("zero-region", || Ok(ZeroRegionBackend));
        Preprocessor::new(registry)
    }

    fn options(backend: &str) -> PreprocessOptions {
        PreprocessOptions {
            detector_backend: backend.to_string(),
            ..PreprocessOptions::default()
        }
    }

    #[test]
    fn test_skip_pipeline_shape_and_range() {
        let pixels = Array3::<u8>::from_elem((60, 30, 3), 255);
        let face = preprocessor().preprocess_face(pixels, &options("skip")).unwrap();

        assert_eq!(face.tensor.shape(), &[1, 224, 224, 3]);
        assert_eq!(face.region, Region::new(0, 0, 60, 30));
        assert!(face.tensor.iter().all(|&v| (0.0..=1.0 + 1e-6).contains(&v)));
        // 30x60 scaled by 224/60 -> 112 wide, padded 56 on each side.
        assert_eq!(face.tensor[[0, 100, 0, 0]], 0.0);
        assert!((face.tensor[[0, 100, 112, 0]] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_grayscale_and_target_size() {
        let opts = PreprocessOptions {
            target_size: TargetSize::new(96, 112).unwrap(),
            grayscale: true,
            ..options("skip")
        };
        let face = preprocessor()
            .preprocess_face(Image::from_elem((40, 40, 3), 128.0), &opts)
            .unwrap();
        assert_eq!(face.tensor.shape(), &[1, 112, 96, 1]);
    }

    #[test]
    fn test_detected_region_reported() {
        let face = preprocessor()
            .preprocess_face(Image::from_elem((80, 40, 3), 10.0), &options("center"))
            .unwrap();
        assert_eq!(face.region, Region::new(20, 10, 40, 20));
    }

    #[test]
    fn test_empty_crop_falls_back_to_original() {
        let opts = PreprocessOptions {
            enforce_detection: false,
            ..options("empty-crop")
        };
        let face = preprocessor()
            .preprocess_face(Image::from_elem((50, 50, 3), 255.0), &opts)
            .unwrap();
        assert_eq!(face.tensor.shape(), &[1, 224, 224, 3]);
        assert!(face.tensor.iter().all(|&v| (v - 1.0).abs() < 1e-5));
        assert_eq!(face.region, Region::new(0, 0, 50, 50));
    }

    #[test]
    fn test_zero_region_falls_back_to_whole_image() {
        // Enforcement only inspects crop pixels, so this face gets through.
        let face = preprocessor()
            .preprocess_face(Image::from_elem((50, 40, 3), 255.0), &options("zero-region"))
            .unwrap();
        assert_eq!(face.region, Region::new(0, 0, 50, 40));
        let max = face.tensor.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        assert!((max - 1.0).abs() < 1e-5, "tensor built from the zero crop, max = {max}");
    }

    #[test]
    fn test_empty_crop_enforced_fails() {
        let err = preprocessor()
            .preprocess_face(Image::from_elem((50, 50, 3), 255.0), &options("empty-crop"))
            .unwrap_err();
        assert!(matches!(
            err,
            PreprocessError::Detector(DetectorError::DegenerateFace { height: 0, width: 0 })
        ));
    }

    #[test]
    fn test_vggface_normalization_applied() {
        let opts = PreprocessOptions {
            normalization: NormalizationScheme::VggFace,
            ..options("skip")
        };
        let face = preprocessor()
            .preprocess_face(Image::zeros((10, 10, 3)), &opts)
            .unwrap();
        let blue = face.tensor.index_axis(Axis(3), 0);
        assert!(blue.iter().all(|&v| (v + 93.5940).abs() < 1e-4));
    }

    #[test]
    fn test_vggface_rejects_grayscale() {
        let opts = PreprocessOptions {
            normalization: NormalizationScheme::VggFace,
            grayscale: true,
            ..options("skip")
        };
        let err = preprocessor()
            .preprocess_face(Image::zeros((10, 10, 3)), &opts)
            .unwrap_err();
        assert!(matches!(err, PreprocessError::Normalize(NormalizeError::ChannelMismatch { .. })));
    }

    #[test]
    fn test_missing_file() {
        let err = preprocessor()
            .preprocess_face("/no/such/face.png", &options("skip"))
            .unwrap_err();
        assert!(matches!(err, PreprocessError::Load(LoadError::NotFound(_))));
    }

    #[test]
    fn test_unknown_backend() {
        let err = preprocessor()
            .preprocess_face(Image::zeros((4, 4, 3)), &options("retinaface"))
            .unwrap_err();
        assert!(matches!(err, PreprocessError::Detector(DetectorError::UnknownBackend(_))));
    }
}
