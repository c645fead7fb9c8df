//! Model store and training data source boundaries, with filesystem backends.
//!
//! The service only ever sees these traits; a deployment can point them at
//! a cloud bucket or a document database without touching the pipeline.
//! The bundled implementations work off the local filesystem.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence boundary for the serialized model artifact.
///
/// One opaque blob, replaced wholesale by each successful training run.
/// Implementations that cross a network must bound each call with their own
/// deadline; the service layer retries transient failures with backoff.
pub trait ModelStore: Send + Sync {
    fn exists(&self) -> Result<bool, StoreError>;
    fn load(&self) -> Result<Vec<u8>, StoreError>;
    fn save(&self, bytes: &[u8]) -> Result<(), StoreError>;
}

/// One labeled reference photo, still in its uploaded encoding.
#[derive(Debug, Clone)]
pub struct LabeledImage {
    pub bytes: Vec<u8>,
    pub student_id: String,
}

/// Supplies the labeled photos a retrain fits on.
pub trait TrainingDataSource: Send + Sync {
    fn list_labeled_images(&self) -> Result<Vec<LabeledImage>, StoreError>;
}

/// Artifact store backed by a single file.
///
/// Saves go to a sibling temp file first and are renamed into place, so a
/// crash mid-save never leaves a partial artifact at the published path.
pub struct FsModelStore {
    path: PathBuf,
}

impl FsModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ModelStore for FsModelStore {
    fn exists(&self) -> Result<bool, StoreError> {
        Ok(self.path.exists())
    }

    fn load(&self) -> Result<Vec<u8>, StoreError> {
        Ok(std::fs::read(&self.path)?)
    }

    fn save(&self, bytes: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), len = bytes.len(), "artifact saved");
        Ok(())
    }
}

/// Training photos on disk: one subdirectory per student id.
///
/// Layout is `<root>/<student_id>/<photo>`. Every regular file in a
/// student directory is offered as an image; undecodable files are the
/// retrain loop's problem, not this source's. Directories and files are
/// visited in sorted order so a fetch is deterministic for a given tree.
pub struct FsTrainingSource {
    root: PathBuf,
}

impl FsTrainingSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl TrainingDataSource for FsTrainingSource {
    fn list_labeled_images(&self) -> Result<Vec<LabeledImage>, StoreError> {
        let mut images = Vec::new();
        if !self.root.exists() {
            // A missing tree is just an empty training set.
            return Ok(images);
        }

        let mut student_dirs: Vec<PathBuf> = std::fs::read_dir(&self.root)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir())
            .collect();
        student_dirs.sort();

        for dir in student_dirs {
            let student_id = match dir.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.is_file())
                .collect();
            files.sort();

            for file in files {
                let bytes = std::fs::read(&file)?;
                images.push(LabeledImage {
                    bytes,
                    student_id: student_id.clone(),
                });
            }
        }

        tracing::debug!(count = images.len(), root = %self.root.display(), "listed training images");
        Ok(images)
    }
}
