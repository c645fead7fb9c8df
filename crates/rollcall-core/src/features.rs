//! Turns face crops into fixed-length pixel feature vectors.
//!
//! Every face, whatever its detected size, becomes the same canonical
//! square before flattening, so all feature vectors in the system share
//! one length. That length is locked into the trained model artifact.

use crate::detect::FaceRegion;
use crate::raster::Raster;
use thiserror::Error;

/// Canonical face edge in pixels; features are `size * size` floats.
pub const DEFAULT_FACE_SIZE: u32 = 100;

#[derive(Error, Debug)]
pub enum FeatureError {
    #[error("canonical face size must be nonzero")]
    InvalidFaceSize,
    #[error(
        "region ({x},{y}) {width}x{height} outside raster {raster_width}x{raster_height}"
    )]
    InvalidRegion {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        raster_width: u32,
        raster_height: u32,
    },
}

/// Turns a detected face region into a fixed-length feature vector.
///
/// Pure and deterministic: crop, bilinear resize to `face_size` square,
/// row-major flatten, scale to `[0, 1]`. No further normalization here;
/// the classifier applies its own as part of its training contract.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    face_size: u32,
}

impl FeatureExtractor {
    pub fn new(face_size: u32) -> Result<Self, FeatureError> {
        if face_size == 0 {
            return Err(FeatureError::InvalidFaceSize);
        }
        Ok(Self { face_size })
    }

    /// Length of every vector this extractor produces.
    pub fn feature_len(&self) -> usize {
        self.face_size as usize * self.face_size as usize
    }

    /// Extract the feature vector for one face region.
    pub fn extract(&self, raster: &Raster, region: &FaceRegion) -> Result<Vec<f32>, FeatureError> {
        let in_bounds = region.width > 0
            && region.height > 0
            && u64::from(region.x) + u64::from(region.width) <= u64::from(raster.width)
            && u64::from(region.y) + u64::from(region.height) <= u64::from(raster.height);
        if !in_bounds {
            return Err(FeatureError::InvalidRegion {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
                raster_width: raster.width,
                raster_height: raster.height,
            });
        }

        let out = self.face_size as usize;
        let src_w = region.width as usize;
        let src_h = region.height as usize;
        let scale_x = src_w as f32 / out as f32;
        let scale_y = src_h as f32 / out as f32;

        // Bilinear resample of the crop, sampled directly from the raster
        // with the region offset applied. Stretches non-square crops.
        let stride = raster.width as usize;
        let base = region.y as usize * stride + region.x as usize;
        let mut features = Vec::with_capacity(out * out);

        for y in 0..out {
            let src_y = (y as f32 + 0.5) * scale_y - 0.5;
            let y0 = (src_y.floor() as i32).clamp(0, src_h as i32 - 1) as usize;
            let y1 = (y0 + 1).min(src_h - 1);
            let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

            for x in 0..out {
                let src_x = (x as f32 + 0.5) * scale_x - 0.5;
                let x0 = (src_x.floor() as i32).clamp(0, src_w as i32 - 1) as usize;
                let x1 = (x0 + 1).min(src_w - 1);
                let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

                let tl = raster.data[base + y0 * stride + x0] as f32;
                let tr = raster.data[base + y0 * stride + x1] as f32;
                let bl = raster.data[base + y1 * stride + x0] as f32;
                let br = raster.data[base + y1 * stride + x1] as f32;

                let val = tl * (1.0 - fx) * (1.0 - fy)
                    + tr * fx * (1.0 - fy)
                    + bl * (1.0 - fx) * fy
                    + br * fx * fy;

                features.push(val / 255.0);
            }
        }

        Ok(features)
    }
}
