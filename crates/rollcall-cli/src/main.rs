use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::detect::SeetaFaceDetector;
use rollcall_core::features::FeatureExtractor;
use rollcall_service::config::ServiceConfig;
use rollcall_service::response::{ErrorBody, MatchedStudent, RetrainBody, StatusBody};
use rollcall_service::service::{RecognitionService, ServiceError};
use rollcall_service::store::{FsModelStore, FsTrainingSource};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face recognition backend for student attendance")]
struct Cli {
    /// Config file (default: ROLLCALL_CONFIG or <data_dir>/rollcall.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect face regions in a photo
    Detect {
        /// Photo to scan
        photo: PathBuf,
    },
    /// Identify the student in a photo
    Recognize {
        /// Photo to identify
        photo: PathBuf,
    },
    /// Rebuild the recognition model from the training photo library
    Train,
    /// Show the published model
    Status,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => ServiceConfig::load_from(path)?,
        None => ServiceConfig::load()?,
    };

    let detector = SeetaFaceDetector::load(&config.detector_model_path, config.detector.clone())
        .with_context(|| {
            format!(
                "loading face detection model from {}",
                config.detector_model_path.display()
            )
        })?;
    let extractor =
        FeatureExtractor::new(config.face_size).context("building feature extractor")?;
    let store = FsModelStore::new(config.model_path.clone());
    let source = FsTrainingSource::new(config.training_dir.clone());
    let service = RecognitionService::new(
        Box::new(detector),
        extractor,
        Box::new(store),
        Box::new(source),
        &config,
    );

    match service.load_published_model() {
        Ok(true) => {}
        Ok(false) => tracing::info!("no published model yet; run `rollcall train`"),
        Err(err) => tracing::warn!(error = %err, "stored model not loaded"),
    }

    match cli.command {
        Commands::Detect { photo } => {
            let bytes = read_photo(&photo)?;
            match service.detect_faces(&bytes) {
                Ok(regions) => emit(&regions),
                Err(err) => fail(&err),
            }
        }
        Commands::Recognize { photo } => {
            let bytes = read_photo(&photo)?;
            match service.recognize(&bytes) {
                Ok(ident) => emit(&MatchedStudent::from(&ident)),
                Err(err) => fail(&err),
            }
        }
        Commands::Train => match service.retrain() {
            Ok(summary) => {
                tracing::info!(
                    students = summary.students,
                    faces = summary.faces,
                    skipped_images = summary.skipped_images,
                    "model retrained"
                );
                emit(&RetrainBody::from(&summary))
            }
            Err(err) => fail(&err),
        },
        Commands::Status => {
            let artifact = service.current_artifact();
            emit(&StatusBody::from_artifact(artifact.as_deref()))
        }
    }
}

fn read_photo(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading photo {}", path.display()))
}

/// One JSON body per invocation on stdout; logs stay on stderr.
fn emit<T: Serialize>(body: &T) -> Result<ExitCode> {
    println!("{}", serde_json::to_string(body)?);
    Ok(ExitCode::SUCCESS)
}

fn fail(err: &ServiceError) -> Result<ExitCode> {
    println!("{}", serde_json::to_string(&ErrorBody::from(err))?);
    Ok(ExitCode::FAILURE)
}
