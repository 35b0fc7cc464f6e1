use crate::detector::SKIP_BACKEND;
use crate::input_shape::AxisOrder;
use crate::normalization::NormalizationScheme;
use crate::pipeline::PreprocessOptions;
use crate::types::TargetSize;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable overriding the directory that holds `.deepface/weights`.
pub const HOME_ENV: &str = "DEEPFACE_HOME";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to create {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Preprocessing configuration, loaded from a TOML file or `FACEKIT_*`
/// environment variables with defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Spatial size of prepared tensors.
    pub target_size: TargetSize,
    /// Detector backend name (`skip` bypasses detection).
    pub detector_backend: String,
    /// Fail when no face is found instead of using the whole image.
    pub enforce_detection: bool,
    /// Ask the backend to align detected faces.
    pub align: bool,
    /// Convert crops to a single luma channel.
    pub grayscale: bool,
    pub normalization: NormalizationScheme,
    /// Swap the declared spatial axes of recognition models.
    pub swap_input_axes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_size: TargetSize::default(),
            detector_backend: SKIP_BACKEND.to_string(),
            enforce_detection: true,
            align: true,
            grayscale: false,
            normalization: NormalizationScheme::Base,
            swap_input_axes: false,
        }
    }
}

impl Config {
    /// Load configuration from `FACEKIT_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(src: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(src)?)
    }

    /// Read a TOML config file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let src = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&src)?.with_env_overrides();
        tracing::debug!(path = %path.display(), ?config, "loaded config");
        Ok(config)
    }

    /// Replace fields whose `FACEKIT_*` variable is set and parses.
    pub fn with_env_overrides(self) -> Self {
        Self {
            target_size: env_parse("FACEKIT_TARGET_SIZE", self.target_size),
            detector_backend: std::env::var("FACEKIT_DETECTOR_BACKEND")
                .unwrap_or(self.detector_backend),
            enforce_detection: env_bool("FACEKIT_ENFORCE_DETECTION", self.enforce_detection),
            align: env_bool("FACEKIT_ALIGN", self.align),
            grayscale: env_bool("FACEKIT_GRAYSCALE", self.grayscale),
            normalization: env_parse("FACEKIT_NORMALIZATION", self.normalization),
            swap_input_axes: env_bool("FACEKIT_SWAP_INPUT_AXES", self.swap_input_axes),
        }
    }

    pub fn preprocess_options(&self) -> PreprocessOptions {
        PreprocessOptions {
            target_size: self.target_size,
            grayscale: self.grayscale,
            enforce_detection: self.enforce_detection,
            detector_backend: self.detector_backend.clone(),
            align: self.align,
            normalization: self.normalization,
        }
    }

    pub fn axis_order(&self) -> AxisOrder {
        if self.swap_input_axes {
            AxisOrder::Swapped
        } else {
            AxisOrder::AsDeclared
        }
    }
}

/// Base directory for model weights: `$DEEPFACE_HOME`, else `$HOME`.
pub fn home_dir() -> PathBuf {
    std::env::var(HOME_ENV)
        .or_else(|_| std::env::var("HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

/// Create `<home>/.deepface/weights` if missing. Returns the weights directory.
pub fn initialize_home(home: &Path) -> Result<PathBuf, ConfigError> {
    let base = home.join(".deepface");
    let weights = base.join("weights");

    for dir in [&base, &weights] {
        if !dir.exists() {
            std::fs::create_dir_all(dir).map_err(|source| ConfigError::CreateDir {
                path: dir.clone(),
                source,
            })?;
            tracing::info!(path = %dir.display(), "created directory");
        }
    }

    Ok(weights)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.target_size, TargetSize::new(224, 224).unwrap());
        assert_eq!(config.detector_backend, "skip");
        assert!(config.enforce_detection);
        assert_eq!(config.normalization, NormalizationScheme::Base);
        assert_eq!(config.axis_order(), AxisOrder::AsDeclared);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = Config::from_toml_str(
            r#"
            target_size = [160, 120]
            normalization = "VGGFace2"
            enforce_detection = false
            swap_input_axes = true
            "#,
        )
        .unwrap();
        assert_eq!(config.target_size, TargetSize::new(160, 120).unwrap());
        assert_eq!(config.normalization, NormalizationScheme::VggFace2);
        assert!(!config.enforce_detection);
        assert!(config.align);
        assert_eq!(config.axis_order(), AxisOrder::Swapped);
    }

    #[test]
    fn test_from_toml_rejects_bad_values() {
        assert!(Config::from_toml_str(r#"normalization = "vgg""#).is_err());
        assert!(Config::from_toml_str("target_size = [0, 10]").is_err());
    }

    #[test]
    fn test_preprocess_options_bridge() {
        let config = Config {
            grayscale: true,
            detector_backend: "mtcnn".into(),
            ..Config::default()
        };
        let options = config.preprocess_options();
        assert!(options.grayscale);
        assert_eq!(options.detector_backend, "mtcnn");
        assert_eq!(options.target_size, config.target_size);
    }

    #[test]
    fn test_env_helpers_fall_back_on_missing_keys() {
        assert_eq!(env_parse("FACEKIT_TEST_UNSET_KEY_1", 7u32), 7);
        assert!(env_bool("FACEKIT_TEST_UNSET_KEY_2", true));
    }

    #[test]
    fn test_initialize_home_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let weights = initialize_home(dir.path()).unwrap();
        assert_eq!(weights, dir.path().join(".deepface/weights"));
        assert!(weights.is_dir());
        assert_eq!(initialize_home(dir.path()).unwrap(), weights);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/facekit.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
