use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facekit_core::config::{home_dir, initialize_home};
use facekit_core::{
    find_input_shape, Config, DetectorRegistry, NormalizationScheme, OnnxModel, Preprocessor,
    TargetSize,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "facekit", about = "Face image preprocessing for recognition models")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare a normalized face tensor and print a summary
    Prepare {
        /// Image path or data:image/...;base64,... URI
        input: String,
        /// TOML config file (FACEKIT_* variables still apply on top)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Target size, e.g. 224x224 or 160
        #[arg(long)]
        target: Option<TargetSize>,
        /// Detector backend name
        #[arg(long)]
        detector: Option<String>,
        /// Normalization scheme (base, raw, Facenet, Facenet2018, VGGFace, VGGFace2, ArcFace)
        #[arg(long)]
        normalization: Option<NormalizationScheme>,
        /// Convert the face to grayscale
        #[arg(long)]
        grayscale: bool,
        /// Fall back to the whole image when no face is found
        #[arg(long)]
        no_enforce: bool,
        /// Skip face alignment
        #[arg(long)]
        no_align: bool,
    },
    /// Print the input size an ONNX recognition model expects
    InputShape {
        /// Path to the ONNX model
        model: PathBuf,
        /// Swap the declared spatial axes
        #[arg(long)]
        swap_axes: bool,
    },
    /// Create the weights directory under DEEPFACE_HOME
    InitHome,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Prepare {
            input,
            config,
            target,
            detector,
            normalization,
            grayscale,
            no_enforce,
            no_align,
        } => {
            let mut config = match config {
                Some(path) => Config::load(&path)?,
                None => Config::from_env(),
            };
            if let Some(target) = target {
                config.target_size = target;
            }
            if let Some(detector) = detector {
                config.detector_backend = detector;
            }
            if let Some(normalization) = normalization {
                config.normalization = normalization;
            }
            config.grayscale |= grayscale;
            config.enforce_detection &= !no_enforce;
            config.align &= !no_align;

            // Detector algorithms live outside this crate; only `skip` is built in.
            let preprocessor = Preprocessor::new(DetectorRegistry::new());
            tracing::debug!(
                backend = %config.detector_backend,
                registered = ?preprocessor.registry().backend_names(),
                "preparing face"
            );
            let face = preprocessor
                .preprocess_face(input.as_str(), &config.preprocess_options())
                .context("preprocessing failed")?;

            let tensor = &face.tensor;
            let count = tensor.len().max(1) as f32;
            let summary = serde_json::json!({
                "shape": tensor.shape(),
                "region": face.region,
                "normalization": config.normalization.name(),
                "min": tensor.iter().copied().fold(f32::INFINITY, f32::min),
                "max": tensor.iter().copied().fold(f32::NEG_INFINITY, f32::max),
                "mean": tensor.sum() / count,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::InputShape { model, swap_axes } => {
            let mut config = Config::from_env();
            config.swap_input_axes |= swap_axes;

            let path = model.to_string_lossy();
            let model = OnnxModel::load(&path)?;
            let size = find_input_shape(&model, config.axis_order())?;
            tracing::info!(%size, "model input size");
            println!(
                "{}",
                serde_json::json!({ "width": size.width, "height": size.height })
            );
        }
        Commands::InitHome => {
            let weights = initialize_home(&home_dir())?;
            println!("{}", weights.display());
        }
    }

    Ok(())
}
