//! The recognition service orchestrating detect, recognize and retrain.
//!
//! Holds the published (model, registry) snapshot behind an atomically
//! swapped handle: readers clone the `Arc` once and use a self-consistent
//! pair for the whole request, while a retrain publishes a brand-new pair
//! only after it has been persisted.

use crate::config::ServiceConfig;
use crate::store::{ModelStore, StoreError, TrainingDataSource};
use rollcall_core::artifact::{ArtifactError, ModelArtifact};
use rollcall_core::classify::{CentroidModel, ClassifierError, Prediction, TrainingSample};
use rollcall_core::detect::{FaceDetector, FaceRegion};
use rollcall_core::features::{FeatureError, FeatureExtractor};
use rollcall_core::raster::{Raster, RasterError};
use std::sync::{Arc, Mutex, RwLock, TryLockError};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("invalid image: {0}")]
    InvalidImage(#[from] RasterError),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("face not recognized: best confidence {confidence:.3} below threshold {threshold:.3}")]
    NoMatch { confidence: f32, threshold: f32 },
    #[error("no model loaded, train one first")]
    ModelNotLoaded,
    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("feature extraction error: {0}")]
    Feature(#[from] FeatureError),
    #[error("artifact error: {0}")]
    Artifact(#[from] ArtifactError),
    #[error("no usable training data")]
    NoTrainingData,
    #[error("a retrain is already in progress")]
    RetrainInProgress,
    #[error("model store: {0}")]
    Store(#[source] StoreError),
    #[error("training data source: {0}")]
    TrainingSource(#[source] StoreError),
}

impl ServiceError {
    /// Stable machine-readable code, one per logical failure kind.
    /// These strings are part of the boundary contract; never reuse or
    /// renumber them.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidImage(_) => "invalid_image",
            Self::NoFaceDetected => "no_face_detected",
            Self::NoMatch { .. } => "no_match",
            Self::ModelNotLoaded => "model_not_loaded",
            Self::Classifier(ClassifierError::InsufficientData { .. }) => "insufficient_data",
            Self::Classifier(ClassifierError::DimensionMismatch { .. }) => "dimension_mismatch",
            Self::Feature(FeatureError::InvalidRegion { .. }) => "invalid_region",
            Self::Feature(FeatureError::InvalidFaceSize) => "invalid_face_size",
            Self::Artifact(_) => "bad_artifact",
            Self::NoTrainingData => "no_training_data",
            Self::RetrainInProgress => "retrain_in_progress",
            Self::Store(_) => "model_store",
            Self::TrainingSource(_) => "training_source",
        }
    }

    /// HTTP status an embedding transport should answer with.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidImage(_)
            | Self::NoFaceDetected
            | Self::NoMatch { .. }
            | Self::NoTrainingData
            | Self::Feature(_)
            | Self::Classifier(ClassifierError::InsufficientData { .. }) => 400,
            Self::RetrainInProgress => 409,
            Self::Classifier(ClassifierError::DimensionMismatch { .. }) | Self::Artifact(_) => 500,
            Self::Store(_) | Self::TrainingSource(_) => 502,
            Self::ModelNotLoaded => 503,
        }
    }
}

/// A positive identification of one student.
#[derive(Debug, Clone)]
pub struct Identification {
    pub student_id: String,
    /// Cosine confidence of the winning region, `>= match_threshold`.
    pub confidence: f32,
    /// The face region the identification came from.
    pub region: FaceRegion,
}

/// Counts reported by a completed retrain.
#[derive(Debug, Clone, Copy)]
pub struct RetrainSummary {
    pub students: usize,
    pub faces: usize,
    pub skipped_images: usize,
}

#[derive(Debug, Clone, Copy)]
struct RetryPolicy {
    attempts: u32,
    backoff: Duration,
}

pub struct RecognitionService {
    detector: Box<dyn FaceDetector>,
    extractor: FeatureExtractor,
    store: Box<dyn ModelStore>,
    source: Box<dyn TrainingDataSource>,
    threshold: f32,
    first_face_only: bool,
    retry: RetryPolicy,
    /// Published snapshot. `None` until the first load or retrain.
    current: RwLock<Option<Arc<ModelArtifact>>>,
    /// Serializes retrains; held for the whole fetch-fit-publish pass.
    retrain_gate: Mutex<()>,
}

impl RecognitionService {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        extractor: FeatureExtractor,
        store: Box<dyn ModelStore>,
        source: Box<dyn TrainingDataSource>,
        config: &ServiceConfig,
    ) -> Self {
        Self {
            detector,
            extractor,
            store,
            source,
            threshold: config.match_threshold,
            first_face_only: config.first_face_only,
            retry: RetryPolicy {
                attempts: config.store_retries,
                backoff: Duration::from_millis(config.store_backoff_ms),
            },
            current: RwLock::new(None),
            retrain_gate: Mutex::new(()),
        }
    }

    /// Startup load: publish the artifact from the store if one exists.
    ///
    /// Absence is not an error; the service then answers `ModelNotLoaded`
    /// until the first successful retrain. Returns whether a model was
    /// published.
    pub fn load_published_model(&self) -> Result<bool, ServiceError> {
        let exists = with_retry(self.retry, "model store exists", || self.store.exists())
            .map_err(ServiceError::Store)?;
        if !exists {
            tracing::info!("no published model artifact yet");
            return Ok(false);
        }

        let bytes = with_retry(self.retry, "model store load", || self.store.load())
            .map_err(ServiceError::Store)?;
        let artifact = ModelArtifact::from_bytes(&bytes)?;
        self.check_feature_len(&artifact)?;

        tracing::info!(
            classes = artifact.registry.len(),
            feature_len = artifact.model.feature_len(),
            trained_at = %artifact.trained_at,
            "loaded published model artifact"
        );
        self.publish(artifact);
        Ok(true)
    }

    /// Locate faces in an uploaded image. Needs no model.
    pub fn detect_faces(&self, image: &[u8]) -> Result<Vec<FaceRegion>, ServiceError> {
        let raster = Raster::decode(image)?;
        let regions = self.detector.detect(&raster);
        tracing::debug!(found = regions.len(), "detect request served");
        Ok(regions)
    }

    /// Identify the student in an uploaded image.
    ///
    /// Scores every detected region (or only the first, per configuration)
    /// against the published model and reports the best match; below the
    /// threshold the outcome is `NoMatch`, never the nearest guess.
    pub fn recognize(&self, image: &[u8]) -> Result<Identification, ServiceError> {
        let raster = Raster::decode(image)?;
        let regions = self.detector.detect(&raster);
        if regions.is_empty() {
            return Err(ServiceError::NoFaceDetected);
        }

        let snapshot = self.current_artifact().ok_or(ServiceError::ModelNotLoaded)?;

        let candidates: &[FaceRegion] = if self.first_face_only {
            &regions[..1]
        } else {
            &regions
        };

        let mut best: Option<(Prediction, FaceRegion)> = None;
        for region in candidates {
            let features = self.extractor.extract(&raster, region)?;
            let prediction = snapshot.model.predict(&features)?;
            let better = best
                .as_ref()
                .map_or(true, |(b, _)| prediction.confidence > b.confidence);
            if better {
                best = Some((prediction, *region));
            }
        }
        // Candidates is non-empty, so the first iteration always sets best.
        let (prediction, region) = best.ok_or(ServiceError::NoFaceDetected)?;

        if !meets_threshold(prediction.confidence, self.threshold) {
            tracing::info!(
                confidence = prediction.confidence,
                threshold = self.threshold,
                "face not recognized"
            );
            return Err(ServiceError::NoMatch {
                confidence: prediction.confidence,
                threshold: self.threshold,
            });
        }

        let student_id = snapshot
            .registry
            .student_of(prediction.label)
            .ok_or(ServiceError::Artifact(ArtifactError::RegistryMismatch {
                classes: snapshot.model.num_classes(),
                labels: snapshot.registry.len(),
            }))?
            .to_string();

        tracing::info!(
            student_id = %student_id,
            confidence = prediction.confidence,
            "student recognized"
        );
        Ok(Identification {
            student_id,
            confidence: prediction.confidence,
            region,
        })
    }

    /// Rebuild the model from the training source and publish it.
    ///
    /// Fetch, detect+extract over every photo, fit, persist, then swap the
    /// in-process snapshot. Any failure leaves the previously published
    /// pair untouched. At most one retrain runs at a time; a concurrent
    /// request fails fast with `RetrainInProgress`.
    pub fn retrain(&self) -> Result<RetrainSummary, ServiceError> {
        let _gate = match self.retrain_gate.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(ServiceError::RetrainInProgress),
        };

        tracing::info!("retrain started");
        let labeled = with_retry(self.retry, "training source list", || {
            self.source.list_labeled_images()
        })
        .map_err(ServiceError::TrainingSource)?;

        let mut samples: Vec<TrainingSample> = Vec::new();
        let mut skipped_images = 0usize;
        for item in &labeled {
            let raster = match Raster::decode(&item.bytes) {
                Ok(raster) => raster,
                Err(err) => {
                    tracing::warn!(
                        student_id = %item.student_id,
                        error = %err,
                        "skipping undecodable training image"
                    );
                    skipped_images += 1;
                    continue;
                }
            };
            let regions = self.detector.detect(&raster);
            if regions.is_empty() {
                tracing::warn!(
                    student_id = %item.student_id,
                    "skipping training image with no detectable face"
                );
                skipped_images += 1;
                continue;
            }
            for region in &regions {
                let features = self.extractor.extract(&raster, region)?;
                samples.push(TrainingSample {
                    features,
                    student_id: item.student_id.clone(),
                });
            }
        }

        if samples.is_empty() {
            return Err(ServiceError::NoTrainingData);
        }

        let (model, registry) = CentroidModel::fit(&samples)?;
        let artifact = ModelArtifact::new(model, registry)?;
        let bytes = artifact.to_bytes()?;
        with_retry(self.retry, "model store save", || self.store.save(&bytes))
            .map_err(ServiceError::Store)?;

        let summary = RetrainSummary {
            students: artifact.registry.len(),
            faces: samples.len(),
            skipped_images,
        };
        tracing::info!(
            students = summary.students,
            faces = summary.faces,
            skipped_images = summary.skipped_images,
            "retrain complete, publishing new model"
        );
        self.publish(artifact);
        Ok(summary)
    }

    /// The currently published snapshot, if any.
    pub fn current_artifact(&self) -> Option<Arc<ModelArtifact>> {
        // The lock only guards a pointer assignment; a poisoned guard
        // still holds a fully formed snapshot.
        self.current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn publish(&self, artifact: ModelArtifact) {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = Some(Arc::new(artifact));
    }

    fn check_feature_len(&self, artifact: &ModelArtifact) -> Result<(), ServiceError> {
        let expected = artifact.model.feature_len();
        let actual = self.extractor.feature_len();
        if expected != actual {
            // Stale artifact or extractor drift; refuse rather than mispredict.
            return Err(ClassifierError::DimensionMismatch { expected, actual }.into());
        }
        Ok(())
    }
}

/// Inclusive threshold rule: a confidence exactly at the threshold matches.
fn meets_threshold(confidence: f32, threshold: f32) -> bool {
    confidence >= threshold
}

/// Run a store/source call up to `policy.attempts` times, doubling the
/// backoff between tries. The last error propagates.
fn with_retry<T>(
    policy: RetryPolicy,
    what: &str,
    mut op: impl FnMut() -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let attempts = policy.attempts.max(1);
    let mut backoff = policy.backoff;
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < attempts => {
                tracing::warn!(what, attempt, error = %err, "store call failed, retrying");
                std::thread::sleep(backoff);
                backoff = backoff.saturating_mul(2);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_threshold_is_inclusive_both_directions() {
        assert!(meets_threshold(0.40, 0.40));
        assert!(meets_threshold(0.40 + 1e-6, 0.40));
        assert!(!meets_threshold(0.40 - 1e-6, 0.40));
    }

    #[test]
    fn test_with_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(0),
        };
        let result = with_retry(policy, "test op", || {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(StoreError::Unavailable("flaky".into()))
            } else {
                Ok(42)
            }
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_with_retry_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(0),
        };
        let result: Result<(), StoreError> = with_retry(policy, "test op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable("down".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_with_retry_zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            attempts: 0,
            backoff: Duration::from_millis(0),
        };
        let _ = with_retry(policy, "test op", || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    fn representative_errors() -> Vec<ServiceError> {
        vec![
            ServiceError::InvalidImage(RasterError::ZeroDimensions),
            ServiceError::NoFaceDetected,
            ServiceError::NoMatch {
                confidence: 0.1,
                threshold: 0.4,
            },
            ServiceError::ModelNotLoaded,
            ServiceError::Classifier(ClassifierError::InsufficientData {
                found: 0,
                required: 1,
            }),
            ServiceError::Classifier(ClassifierError::DimensionMismatch {
                expected: 100,
                actual: 64,
            }),
            ServiceError::Feature(FeatureError::InvalidFaceSize),
            ServiceError::Feature(FeatureError::InvalidRegion {
                x: 0,
                y: 0,
                width: 10,
                height: 10,
                raster_width: 5,
                raster_height: 5,
            }),
            ServiceError::Artifact(ArtifactError::UnsupportedVersion {
                found: 9,
                supported: 1,
            }),
            ServiceError::NoTrainingData,
            ServiceError::RetrainInProgress,
            ServiceError::Store(StoreError::Unavailable("down".into())),
            ServiceError::TrainingSource(StoreError::Unavailable("down".into())),
        ]
    }

    #[test]
    fn test_error_codes_are_pairwise_distinct() {
        let errors = representative_errors();
        let codes: HashSet<&'static str> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_error_codes_are_stable() {
        // Boundary contract: these strings must never change.
        assert_eq!(ServiceError::NoFaceDetected.code(), "no_face_detected");
        assert_eq!(
            ServiceError::NoMatch {
                confidence: 0.0,
                threshold: 0.4
            }
            .code(),
            "no_match"
        );
        assert_eq!(ServiceError::ModelNotLoaded.code(), "model_not_loaded");
        assert_eq!(ServiceError::NoTrainingData.code(), "no_training_data");
        assert_eq!(ServiceError::RetrainInProgress.code(), "retrain_in_progress");
        assert_eq!(
            ServiceError::InvalidImage(RasterError::ZeroDimensions).code(),
            "invalid_image"
        );
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(ServiceError::NoFaceDetected.http_status(), 400);
        assert_eq!(
            ServiceError::NoMatch {
                confidence: 0.0,
                threshold: 0.4
            }
            .http_status(),
            400
        );
        assert_eq!(ServiceError::ModelNotLoaded.http_status(), 503);
        assert_eq!(ServiceError::RetrainInProgress.http_status(), 409);
        assert_eq!(
            ServiceError::Classifier(ClassifierError::DimensionMismatch {
                expected: 1,
                actual: 2
            })
            .http_status(),
            500
        );
        assert_eq!(
            ServiceError::Store(StoreError::Unavailable("down".into())).http_status(),
            502
        );
    }
}
