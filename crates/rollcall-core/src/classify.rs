//! Nearest-centroid classifier over a cosine metric.
//!
//! Training is closed-form (per-class mean of normalized vectors), so the
//! whole fit/predict path is deterministic with no seed to manage.

use crate::registry::{LabelId, LabelRegistry};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum usable face samples required before a fit is attempted.
pub const MIN_TRAINING_FACES: usize = 1;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("not enough training data: {found} usable faces, need at least {required}")]
    InsufficientData { found: usize, required: usize },
    #[error("feature length mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// One labeled face for training.
#[derive(Debug, Clone)]
pub struct TrainingSample {
    pub features: Vec<f32>,
    pub student_id: String,
}

/// Best-class prediction with its raw score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub label: LabelId,
    /// Cosine similarity against the winning centroid, in [-1, 1].
    /// A decision margin, not a probability.
    pub confidence: f32,
}

/// Trained nearest-centroid model.
///
/// Each enrolled class is the unit-length mean direction of its normalized
/// training vectors; scoring a probe is one matrix-vector product. The
/// feature length is locked in at fit time and enforced on every predict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CentroidModel {
    feature_len: usize,
    /// One row per class, unit length (all zero for degenerate classes).
    centroids: Array2<f32>,
}

impl CentroidModel {
    /// Fit a model and its label registry from a training batch.
    ///
    /// Labels are assigned by the returned registry (sorted distinct
    /// student ids); the registry and model must stay together from here on.
    pub fn fit(samples: &[TrainingSample]) -> Result<(Self, LabelRegistry), ClassifierError> {
        if samples.len() < MIN_TRAINING_FACES {
            return Err(ClassifierError::InsufficientData {
                found: samples.len(),
                required: MIN_TRAINING_FACES,
            });
        }

        let feature_len = samples[0].features.len();
        for sample in samples {
            if sample.features.len() != feature_len {
                return Err(ClassifierError::DimensionMismatch {
                    expected: feature_len,
                    actual: sample.features.len(),
                });
            }
        }

        let registry =
            LabelRegistry::from_student_ids(samples.iter().map(|s| s.student_id.as_str()));
        let num_classes = registry.len();

        let mut centroids = Array2::<f32>::zeros((num_classes, feature_len));
        let mut counts = vec![0usize; num_classes];
        for sample in samples {
            // Every id in the batch is in the registry built from the batch.
            let Some(label) = registry.label_of(&sample.student_id) else {
                continue;
            };
            let normalized = normalize(&sample.features);
            let mut row = centroids.row_mut(label);
            row += &normalized;
            counts[label] += 1;
        }

        for (label, &count) in counts.iter().enumerate() {
            if count > 1 {
                let inv = 1.0 / count as f32;
                centroids.row_mut(label).mapv_inplace(|v| v * inv);
            }
        }
        for mut row in centroids.rows_mut() {
            let norm = row.iter().map(|v| v * v).sum::<f32>().sqrt();
            if norm > 0.0 {
                row.mapv_inplace(|v| v / norm);
            }
        }

        tracing::debug!(
            classes = num_classes,
            faces = samples.len(),
            feature_len,
            "fitted centroid model"
        );

        Ok((
            Self {
                feature_len,
                centroids,
            },
            registry,
        ))
    }

    /// Score a probe vector against every class; returns the best one.
    pub fn predict(&self, features: &[f32]) -> Result<Prediction, ClassifierError> {
        if features.len() != self.feature_len {
            return Err(ClassifierError::DimensionMismatch {
                expected: self.feature_len,
                actual: features.len(),
            });
        }

        let probe = normalize(features);
        let sims = self.centroids.dot(&probe);

        let mut best_label: LabelId = 0;
        let mut best_sim = f32::NEG_INFINITY;
        for (label, &sim) in sims.iter().enumerate() {
            if sim > best_sim {
                best_sim = sim;
                best_label = label;
            }
        }

        Ok(Prediction {
            label: best_label,
            confidence: if best_sim == f32::NEG_INFINITY {
                0.0
            } else {
                best_sim
            },
        })
    }

    /// Feature length this model was trained on.
    pub fn feature_len(&self) -> usize {
        self.feature_len
    }

    /// Number of classes (= rows in the centroid matrix).
    pub fn num_classes(&self) -> usize {
        self.centroids.nrows()
    }
}

/// Mean-center then L2-normalize a feature vector.
///
/// Raw pixel vectors are all-positive and share a large common brightness
/// component; removing the per-vector mean makes the cosine discriminate
/// between faces instead of between exposures. Constant vectors map to
/// all zeros, which score 0 against every centroid.
fn normalize(features: &[f32]) -> Array1<f32> {
    if features.is_empty() {
        return Array1::zeros(0);
    }
    let mean = features.iter().sum::<f32>() / features.len() as f32;
    let mut centered = Array1::from_iter(features.iter().map(|&v| v - mean));
    let norm = centered.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        centered.mapv_inplace(|v| v / norm);
    } else {
        centered.fill(0.0);
    }
    centered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(features: &[f32], student_id: &str) -> TrainingSample {
        TrainingSample {
            features: features.to_vec(),
            student_id: student_id.to_string(),
        }
    }

    // Zero-mean patterns so mean-centering is a no-op and the cosine
    // values work out exactly.
    const PATTERN_A: [f32; 4] = [1.0, -1.0, 1.0, -1.0];
    const PATTERN_B: [f32; 4] = [1.0, 1.0, -1.0, -1.0];

    #[test]
    fn test_fit_empty_batch_rejected() {
        let result = CentroidModel::fit(&[]);
        assert!(matches!(
            result,
            Err(ClassifierError::InsufficientData {
                found: 0,
                required: MIN_TRAINING_FACES
            })
        ));
    }

    #[test]
    fn test_fit_mixed_lengths_rejected() {
        let batch = [
            sample(&[1.0, 2.0, 3.0], "s1"),
            sample(&[1.0, 2.0], "s2"),
        ];
        assert!(matches!(
            CentroidModel::fit(&batch),
            Err(ClassifierError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_predict_own_training_sample() {
        let batch = [sample(&PATTERN_A, "s1")];
        let (model, registry) = CentroidModel::fit(&batch).unwrap();
        let prediction = model.predict(&PATTERN_A).unwrap();
        assert_eq!(registry.student_of(prediction.label), Some("s1"));
        assert!((prediction.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_two_classes_separate() {
        let batch = [sample(&PATTERN_A, "s1"), sample(&PATTERN_B, "s2")];
        let (model, registry) = CentroidModel::fit(&batch).unwrap();

        let a = model.predict(&PATTERN_A).unwrap();
        assert_eq!(registry.student_of(a.label), Some("s1"));
        assert!((a.confidence - 1.0).abs() < 1e-6);

        let b = model.predict(&PATTERN_B).unwrap();
        assert_eq!(registry.student_of(b.label), Some("s2"));
        assert!((b.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_orthogonal_probe_scores_zero() {
        let batch = [sample(&PATTERN_A, "s1"), sample(&PATTERN_B, "s2")];
        let (model, _) = CentroidModel::fit(&batch).unwrap();
        // Zero-mean and orthogonal to both patterns.
        let probe = [1.0, -1.0, -1.0, 1.0];
        let prediction = model.predict(&probe).unwrap();
        assert!(prediction.confidence.abs() < 1e-6);
    }

    #[test]
    fn test_scaled_samples_share_a_centroid() {
        // Same direction at different magnitudes: normalization makes the
        // class centroid identical to either sample's direction.
        let scaled: Vec<f32> = PATTERN_A.iter().map(|v| v * 3.0).collect();
        let batch = [sample(&PATTERN_A, "s1"), sample(&scaled, "s1")];
        let (model, _) = CentroidModel::fit(&batch).unwrap();
        let prediction = model.predict(&PATTERN_A).unwrap();
        assert!((prediction.confidence - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_constant_probe_scores_zero() {
        let batch = [sample(&PATTERN_A, "s1")];
        let (model, _) = CentroidModel::fit(&batch).unwrap();
        let prediction = model.predict(&[5.0, 5.0, 5.0, 5.0]).unwrap();
        assert_eq!(prediction.confidence, 0.0);
    }

    #[test]
    fn test_predict_length_mismatch() {
        let batch = [sample(&PATTERN_A, "s1")];
        let (model, _) = CentroidModel::fit(&batch).unwrap();
        assert!(matches!(
            model.predict(&[1.0, 2.0, 3.0]),
            Err(ClassifierError::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_matching_length_never_mismatches() {
        let batch = [sample(&PATTERN_A, "s1"), sample(&PATTERN_B, "s2")];
        let (model, _) = CentroidModel::fit(&batch).unwrap();
        let probes: [[f32; 4]; 4] = [
            [0.0, 0.0, 0.0, 0.0],
            [9.0, -3.0, 2.5, 0.1],
            [-1.0, -1.0, -1.0, -1.0],
            [0.25, 0.5, 0.75, 1.0],
        ];
        for probe in &probes {
            assert!(model.predict(probe).is_ok());
        }
    }

    #[test]
    fn test_registry_pairs_with_model() {
        let batch = [
            sample(&PATTERN_A, "s2"),
            sample(&PATTERN_B, "s1"),
            sample(&PATTERN_A, "s2"),
        ];
        let (model, registry) = CentroidModel::fit(&batch).unwrap();
        assert_eq!(model.num_classes(), registry.len());
        assert_eq!(model.feature_len(), 4);
    }

    #[test]
    fn test_fit_is_deterministic_for_identical_input() {
        let batch = [
            sample(&PATTERN_A, "s1"),
            sample(&PATTERN_B, "s2"),
            sample(&[0.5, -0.5, 0.25, -0.25], "s1"),
        ];
        let (model_a, _) = CentroidModel::fit(&batch).unwrap();
        let (model_b, _) = CentroidModel::fit(&batch).unwrap();
        assert_eq!(model_a.centroids, model_b.centroids);
    }
}
