//! rollcall-core — Face identification pipeline for student attendance.
//!
//! Decodes uploaded photos into grayscale rasters, locates faces with a
//! SeetaFace frontal detector, turns each face into a fixed-length pixel
//! feature vector, and identifies enrolled students with a nearest-centroid
//! classifier. The trained classifier and its label registry travel
//! together as one versioned artifact.

pub mod artifact;
pub mod classify;
pub mod detect;
pub mod features;
pub mod raster;
pub mod registry;

pub use artifact::ModelArtifact;
pub use classify::{CentroidModel, Prediction, TrainingSample};
pub use detect::{DetectorConfig, FaceDetector, FaceRegion, SeetaFaceDetector};
pub use features::FeatureExtractor;
pub use raster::Raster;
pub use registry::{LabelId, LabelRegistry};
