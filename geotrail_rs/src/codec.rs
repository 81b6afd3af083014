// codec.rs - Image decode/rotate/downsample collaborator
//
// The pipeline only needs three operations on encoded photos. `JpegCodec`
// provides them on top of the `image` crate; platforms with a hardware codec
// can plug in their own implementation.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use log::debug;

use crate::error::{CaptureResult, GeotrailError};

/// Re-encoded image plus its pixel size
#[derive(Clone, Debug)]
pub struct EncodedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub trait ImageCodec: Send + Sync {
    /// Pixel dimensions read from the header, without a full decode
    fn dimensions(&self, data: &[u8]) -> CaptureResult<(u32, u32)>;

    /// Rotate by 90 degrees clockwise and re-encode
    fn rotate90(&self, data: &[u8]) -> CaptureResult<EncodedImage>;

    /// Shrink both axes by `factor` (a power of two) and re-encode
    fn downsample(&self, data: &[u8], factor: u32) -> CaptureResult<EncodedImage>;
}

pub const DEFAULT_JPEG_QUALITY: u8 = 100;

pub struct JpegCodec {
    quality: u8,
}

impl JpegCodec {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    fn decode(&self, data: &[u8]) -> CaptureResult<DynamicImage> {
        image::load_from_memory(data).map_err(|e| GeotrailError::Codec(e.to_string()))
    }

    pub fn encode_image(&self, img: &DynamicImage) -> CaptureResult<EncodedImage> {
        // JPEG has no alpha channel
        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
        let mut buf = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut buf, self.quality);
        rgb.write_with_encoder(encoder)
            .map_err(|e| GeotrailError::Codec(format!("JPEG encode error: {}", e)))?;

        Ok(EncodedImage {
            data: buf,
            width: rgb.width(),
            height: rgb.height(),
        })
    }
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl ImageCodec for JpegCodec {
    fn dimensions(&self, data: &[u8]) -> CaptureResult<(u32, u32)> {
        ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| GeotrailError::Codec(e.to_string()))?
            .into_dimensions()
            .map_err(|e| GeotrailError::Codec(e.to_string()))
    }

    fn rotate90(&self, data: &[u8]) -> CaptureResult<EncodedImage> {
        let img = self.decode(data)?;
        self.encode_image(&img.rotate90())
    }

    fn downsample(&self, data: &[u8], factor: u32) -> CaptureResult<EncodedImage> {
        let img = self.decode(data)?;
        let factor = factor.max(1);
        let width = (img.width() / factor).max(1);
        let height = (img.height() / factor).max(1);
        debug!(
            "[codec] downsample {}x{} -> {}x{} (1/{})",
            img.width(),
            img.height(),
            width,
            height,
            factor
        );
        self.encode_image(&img.resize_exact(width, height, FilterType::Triangle))
    }
}

/// Round `1 / scale` down to a power of two; scale is expected in (0, 1]
pub fn sample_factor(scale: f64) -> u32 {
    if !scale.is_finite() || scale <= 0.0 || scale >= 1.0 {
        return 1;
    }
    let raw = (1.0 / scale).floor().min(f64::from(1u32 << 16)) as u32;
    let mut factor = 1u32;
    while factor * 2 <= raw {
        factor *= 2;
    }
    factor
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    /// Small solid JPEG used across the crate's tests
    pub(crate) fn test_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([120, 180, 40]));
        JpegCodec::default()
            .encode_image(&DynamicImage::ImageRgb8(img))
            .unwrap()
            .data
    }

    #[test]
    fn test_dimensions_from_header() {
        let codec = JpegCodec::default();
        assert_eq!(codec.dimensions(&test_jpeg(64, 48)).unwrap(), (64, 48));
        assert!(codec.dimensions(b"not an image").is_err());
    }

    #[test]
    fn test_rotate_swaps_axes() {
        let codec = JpegCodec::default();
        let rotated = codec.rotate90(&test_jpeg(64, 48)).unwrap();
        assert_eq!((rotated.width, rotated.height), (48, 64));
        assert_eq!(codec.dimensions(&rotated.data).unwrap(), (48, 64));
    }

    #[test]
    fn test_downsample() {
        let codec = JpegCodec::default();
        let small = codec.downsample(&test_jpeg(64, 48), 4).unwrap();
        assert_eq!((small.width, small.height), (16, 12));
    }

    #[test]
    fn test_sample_factor_rounds_down_to_power_of_two() {
        assert_eq!(sample_factor(1.0), 1);
        assert_eq!(sample_factor(0.5), 2);
        assert_eq!(sample_factor(0.3), 2);
        assert_eq!(sample_factor(0.25), 4);
        assert_eq!(sample_factor(0.1), 8);
        assert_eq!(sample_factor(0.7), 1);
        assert_eq!(sample_factor(0.0), 1);
    }
}
