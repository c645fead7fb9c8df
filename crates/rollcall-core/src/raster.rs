//! Grayscale raster type and image decoding.

use serde::{Deserialize, Serialize};

/// A decoded grayscale image, row-major, one byte per pixel.
///
/// Every pipeline stage (detection, cropping, feature extraction) operates
/// on this single-channel representation; color uploads are converted to
/// luma once, at decode time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Raster {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Raster {
    /// Decode uploaded image bytes (PNG, JPEG, WebP, ...) into a grayscale raster.
    pub fn decode(bytes: &[u8]) -> Result<Self, RasterError> {
        let img = image::load_from_memory(bytes).map_err(|e| RasterError::Decode(e.to_string()))?;
        let gray = img.to_luma8();
        let (width, height) = gray.dimensions();
        Self::from_gray(gray.into_raw(), width, height)
    }

    /// Build a raster from an existing grayscale buffer.
    pub fn from_gray(data: Vec<u8>, width: u32, height: u32) -> Result<Self, RasterError> {
        if width == 0 || height == 0 {
            return Err(RasterError::ZeroDimensions);
        }
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(RasterError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Pixel value at (x, y). Caller must stay in bounds.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        self.data[y as usize * self.width as usize + x as usize]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("could not decode image: {0}")]
    Decode(String),
    #[error("image has zero width or height")]
    ZeroDimensions,
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32, shade: u8) -> Vec<u8> {
        let img = image::GrayImage::from_pixel(width, height, image::Luma([shade]));
        let mut out = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_decode_grayscale_png() {
        let bytes = png_bytes(8, 6, 200);
        let raster = Raster::decode(&bytes).unwrap();
        assert_eq!(raster.width, 8);
        assert_eq!(raster.height, 6);
        assert_eq!(raster.data.len(), 48);
        assert!(raster.data.iter().all(|&p| p == 200));
    }

    #[test]
    fn test_decode_color_png_converts_to_luma() {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([255, 255, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let raster = Raster::decode(&bytes).unwrap();
        assert_eq!(raster.data.len(), 16);
        // White stays white regardless of the luma coefficients used.
        assert!(raster.data.iter().all(|&p| p == 255));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = Raster::decode(&[0x00, 0x01, 0x02, 0x03]);
        assert!(matches!(result, Err(RasterError::Decode(_))));
    }

    #[test]
    fn test_decode_empty_fails() {
        assert!(Raster::decode(&[]).is_err());
    }

    #[test]
    fn test_from_gray_rejects_zero_dimensions() {
        let result = Raster::from_gray(vec![], 0, 10);
        assert!(matches!(result, Err(RasterError::ZeroDimensions)));
    }

    #[test]
    fn test_from_gray_rejects_wrong_length() {
        let result = Raster::from_gray(vec![0u8; 10], 4, 4);
        assert!(matches!(
            result,
            Err(RasterError::InvalidLength {
                expected: 16,
                actual: 10
            })
        ));
    }

    #[test]
    fn test_pixel_indexing_row_major() {
        let data = vec![0, 1, 2, 3, 4, 5];
        let raster = Raster::from_gray(data, 3, 2).unwrap();
        assert_eq!(raster.pixel(0, 0), 0);
        assert_eq!(raster.pixel(2, 0), 2);
        assert_eq!(raster.pixel(0, 1), 3);
        assert_eq!(raster.pixel(2, 1), 5);
    }
}
