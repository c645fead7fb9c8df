//! Persistence format for the trained classifier and its label registry.
//!
//! The classifier and its label registry are only valid together, so they
//! are encoded into a single opaque blob. A leading format version tag lets
//! a newer build refuse an incompatible artifact at load time instead of
//! mispredicting silently.

use crate::classify::CentroidModel;
use crate::registry::LabelRegistry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bump on any breaking change to the artifact layout.
pub const ARTIFACT_FORMAT_VERSION: u16 = 1;

#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("could not encode model artifact: {0}")]
    Encode(String),
    #[error("could not decode model artifact: {0}")]
    Decode(String),
    #[error("unsupported artifact format version {found}, this build reads version {supported}")]
    UnsupportedVersion { found: u16, supported: u16 },
    #[error("artifact inconsistent: {classes} model classes vs {labels} registry labels")]
    RegistryMismatch { classes: usize, labels: usize },
}

/// Serialized unit of persistence: one trained model plus the registry it
/// was trained with, stamped with the format version and training time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Must be the first field: it is decoded alone to vet compatibility
    /// before the rest of the blob is interpreted.
    pub format_version: u16,
    pub trained_at: DateTime<Utc>,
    pub model: CentroidModel,
    pub registry: LabelRegistry,
}

impl ModelArtifact {
    /// Wrap a freshly trained pair. Rejects a registry that does not pair
    /// with the model's class count.
    pub fn new(model: CentroidModel, registry: LabelRegistry) -> Result<Self, ArtifactError> {
        let artifact = Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            trained_at: Utc::now(),
            model,
            registry,
        };
        artifact.check_pairing()?;
        Ok(artifact)
    }

    /// Encode to the opaque blob handed to the model store.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ArtifactError> {
        bincode::serialize(self).map_err(|e| ArtifactError::Encode(e.to_string()))
    }

    /// Decode a blob loaded from the model store.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArtifactError> {
        // Version tag first, on its own, so a layout change in a future
        // version still reports UnsupportedVersion rather than a decode error.
        let version: u16 =
            bincode::deserialize(bytes).map_err(|e| ArtifactError::Decode(e.to_string()))?;
        if version != ARTIFACT_FORMAT_VERSION {
            return Err(ArtifactError::UnsupportedVersion {
                found: version,
                supported: ARTIFACT_FORMAT_VERSION,
            });
        }

        let artifact: Self =
            bincode::deserialize(bytes).map_err(|e| ArtifactError::Decode(e.to_string()))?;
        artifact.check_pairing()?;
        Ok(artifact)
    }

    fn check_pairing(&self) -> Result<(), ArtifactError> {
        let classes = self.model.num_classes();
        let labels = self.registry.len();
        if classes != labels {
            return Err(ArtifactError::RegistryMismatch { classes, labels });
        }
        Ok(())
    }
}
