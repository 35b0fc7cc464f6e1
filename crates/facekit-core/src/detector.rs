//! Face detector adapter.
//!
//! Detector backends are built by name through a [`DetectorRegistry`] and
//! cached for the lifetime of the registry. The adapter turns backend output
//! into a uniform list of [`DetectedFace`]s and applies the enforcement policy
//! when nothing is found.

use crate::types::{DetectedFace, Image};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Backend name that bypasses detection for pre-cropped input.
pub const SKIP_BACKEND: &str = "skip";

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("unknown detector backend: {0}")]
    UnknownBackend(String),
    #[error("failed to build detector backend {name}: {reason}")]
    Build { name: String, reason: String },
    #[error(
        "no face could be detected — confirm that the picture is a face photo \
         or consider setting enforce_detection to false"
    )]
    NoFaceDetected,
    #[error(
        "detected face shape is ({height}, {width}) — consider setting \
         enforce_detection to false"
    )]
    DegenerateFace { height: usize, width: usize },
}

/// Outcome of a single backend invocation.
#[derive(Debug, Clone)]
pub enum DetectionOutcome {
    Succeeded(Vec<DetectedFace>),
    /// Detection or alignment failed internally (e.g. a zero-area crop that
    /// could not be aligned). The adapter treats this as zero faces.
    Failed(String),
}

/// A face detection backend.
pub trait FaceDetectorBackend: Send + Sync {
    /// Detect faces in a BGR image, optionally aligning each crop.
    fn detect(&self, image: &Image, align: bool) -> DetectionOutcome;
}

type Builder = Box<dyn Fn() -> Result<Arc<dyn FaceDetectorBackend>, String> + Send + Sync>;

/// Named detector builders plus a per-name cache of built backends.
///
/// A backend is constructed at most once per name: the cache lock is held
/// for the whole check-then-build, so concurrent callers asking for the same
/// name wait for the first build instead of starting their own.
#[derive(Default)]
pub struct DetectorRegistry {
    builders: HashMap<String, Builder>,
    cache: Mutex<HashMap<String, Arc<dyn FaceDetectorBackend>>>,
}

impl fmt::Debug for DetectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("DetectorRegistry").field("backends", &names).finish()
    }
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a builder under `name`, replacing any previous builder and
    /// dropping a cached instance built from it.
    pub fn register<F, B>(&mut self, name: impl Into<String>, builder: F)
    where
        F: Fn() -> Result<B, String> + Send + Sync + 'static,
        B: FaceDetectorBackend + 'static,
    {
        let name = name.into();
        self.cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&name);
        self.builders.insert(
            name,
            Box::new(move || builder().map(|b| Arc::new(b) as Arc<dyn FaceDetectorBackend>)),
        );
    }

    /// Names of all registered backends, sorted.
    pub fn backend_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.builders.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Return the cached backend for `name`, building it on first use.
    pub fn get_or_build(&self, name: &str) -> Result<Arc<dyn FaceDetectorBackend>, DetectorError> {
        // A builder that panicked never reached the insert, so the map is intact.
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(backend) = cache.get(name) {
            return Ok(Arc::clone(backend));
        }

        let builder = self
            .builders
            .get(name)
            .ok_or_else(|| DetectorError::UnknownBackend(name.to_string()))?;
        let backend = builder().map_err(|reason| DetectorError::Build {
            name: name.to_string(),
            reason,
        })?;
        tracing::info!(backend = name, "built face detector backend");

        cache.insert(name.to_string(), Arc::clone(&backend));
        Ok(backend)
    }

    /// Detect faces in `image` with the named backend.
    ///
    /// With `enforce_detection` off, finding nothing yields the whole image as
    /// a single face. With it on, an empty result or any zero-sized crop is an
    /// error.
    pub fn detect_faces(
        &self,
        image: Image,
        backend: &str,
        align: bool,
        enforce_detection: bool,
    ) -> Result<Vec<DetectedFace>, DetectorError> {
        if backend == SKIP_BACKEND {
            return Ok(vec![DetectedFace::whole(image)]);
        }

        let detector = self.get_or_build(backend)?;
        let faces = match detector.detect(&image, align) {
            DetectionOutcome::Succeeded(faces) => faces,
            DetectionOutcome::Failed(cause) => {
                tracing::warn!(backend, %cause, "face detection failed, treating as no face");
                Vec::new()
            }
        };
        tracing::debug!(backend, count = faces.len(), "faces detected");

        let faces = if faces.is_empty() {
            if enforce_detection {
                return Err(DetectorError::NoFaceDetected);
            }
            tracing::debug!(backend, "no face found, falling back to whole image");
            vec![DetectedFace::whole(image)]
        } else {
            faces
        };

        if enforce_detection {
            for face in &faces {
                let (height, width) = face.crop_size();
                if height == 0 || width == 0 {
                    return Err(DetectorError::DegenerateFace { height, width });
                }
            }
        }

        Ok(faces)
    }
}
