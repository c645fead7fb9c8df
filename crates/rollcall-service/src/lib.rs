//! rollcall-service — recognition and retraining orchestration.
//!
//! Wires the rollcall-core pipeline (decode, detect, extract, classify)
//! behind a service with an atomically swapped model snapshot, pluggable
//! model-store and training-source boundaries, and the JSON contract a
//! transport layer serves to clients.

pub mod config;
pub mod response;
pub mod service;
pub mod store;

pub use config::ServiceConfig;
pub use service::{Identification, RecognitionService, RetrainSummary, ServiceError};
pub use store::{
    FsModelStore, FsTrainingSource, LabeledImage, ModelStore, StoreError, TrainingDataSource,
};
