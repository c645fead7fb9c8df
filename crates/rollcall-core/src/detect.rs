//! Face detection seam and the SeetaFace (rustface) backend.
//!
//! Detection is pluggable: the pipeline only sees the [`FaceDetector`]
//! trait, so tests and embedders can swap in their own backend. The
//! shipped implementation wraps the `rustface` SeetaFace frontal model.

use crate::raster::Raster;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

// --- Detection tunables (SeetaFace fd_frontal defaults) ---
const DEFAULT_MIN_FACE_SIZE: u32 = 20;
const DEFAULT_SCORE_THRESH: f64 = 2.0;
const DEFAULT_PYRAMID_SCALE_FACTOR: f32 = 0.8;
const DEFAULT_SLIDE_WINDOW_STEP: u32 = 4;

/// Axis-aligned bounding box of a detected face within a raster.
///
/// Invariant: `x + width <= raster.width` and `y + height <= raster.height`;
/// detectors clamp their raw output to the raster before returning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Pluggable face detection backend.
///
/// Implementations must be deterministic: identical rasters yield the same
/// regions in the same (implementation-defined) order. No side effects.
pub trait FaceDetector: Send + Sync {
    /// Detect faces in a grayscale raster. May be empty, never fails.
    fn detect(&self, raster: &Raster) -> Vec<FaceRegion>;
}

/// Detection sensitivity knobs, fixed at construction time.
///
/// These change what counts as a face and must be configured once per
/// deployment, not varied per call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Smallest face edge (pixels) the sliding window will consider.
    pub min_face_size: u32,
    /// SeetaFace classifier score threshold; higher = fewer, surer faces.
    pub score_thresh: f64,
    /// Image pyramid downscale factor per level (0 < f < 1).
    pub pyramid_scale_factor: f32,
    /// Sliding window step in both axes (pixels).
    pub slide_window_step: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            score_thresh: DEFAULT_SCORE_THRESH,
            pyramid_scale_factor: DEFAULT_PYRAMID_SCALE_FACTOR,
            slide_window_step: DEFAULT_SLIDE_WINDOW_STEP,
        }
    }
}

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} (expected the SeetaFace frontal model, seeta_fd_frontal_v1.0.bin)")]
    ModelNotFound(String),
    #[error("could not read detector model: {0}")]
    ModelLoad(String),
}

/// Face detector backed by the `rustface` crate (SeetaFace engine).
///
/// The model is loaded once from disk; each `detect` call builds a fresh
/// rustface detector from it because the underlying API needs `&mut self`.
pub struct SeetaFaceDetector {
    model: rustface::Model,
    config: DetectorConfig,
}

impl SeetaFaceDetector {
    /// Load the SeetaFace frontal model from the given path.
    pub fn load(model_path: &Path, config: DetectorConfig) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(
                model_path.display().to_string(),
            ));
        }

        let bytes = std::fs::read(model_path)
            .map_err(|e| DetectorError::ModelLoad(format!("{}: {e}", model_path.display())))?;
        let model = rustface::read_model(std::io::Cursor::new(bytes))
            .map_err(|e| DetectorError::ModelLoad(format!("{}: {e}", model_path.display())))?;

        tracing::info!(
            path = %model_path.display(),
            min_face_size = config.min_face_size,
            score_thresh = config.score_thresh,
            "loaded SeetaFace detector model"
        );

        Ok(Self { model, config })
    }
}

impl FaceDetector for SeetaFaceDetector {
    fn detect(&self, raster: &Raster) -> Vec<FaceRegion> {
        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(self.config.min_face_size);
        detector.set_score_thresh(self.config.score_thresh);
        detector.set_pyramid_scale_factor(self.config.pyramid_scale_factor);
        detector.set_slide_window_step(self.config.slide_window_step, self.config.slide_window_step);

        let image = rustface::ImageData::new(&raster.data, raster.width, raster.height);
        let faces = detector.detect(&image);

        let regions: Vec<FaceRegion> = faces
            .iter()
            .filter_map(|face| {
                let bbox = face.bbox();
                clamp_region(
                    bbox.x(),
                    bbox.y(),
                    bbox.width(),
                    bbox.height(),
                    raster.width,
                    raster.height,
                )
            })
            .collect();

        tracing::debug!(
            found = regions.len(),
            width = raster.width,
            height = raster.height,
            "face detection pass"
        );
        regions
    }
}

/// Clamp a raw detector box to raster bounds; drops boxes with no overlap.
///
/// SeetaFace can report boxes that start at negative coordinates or run past
/// the image edge near borders.
fn clamp_region(
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    raster_width: u32,
    raster_height: u32,
) -> Option<FaceRegion> {
    let x0 = i64::from(x).max(0);
    let y0 = i64::from(y).max(0);
    let x1 = (i64::from(x) + i64::from(width)).min(i64::from(raster_width));
    let y1 = (i64::from(y) + i64::from(height)).min(i64::from(raster_height));
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(FaceRegion {
        x: x0 as u32,
        y: y0 as u32,
        width: (x1 - x0) as u32,
        height: (y1 - y0) as u32,
    })
}
