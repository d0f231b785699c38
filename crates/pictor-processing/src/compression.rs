//! Final encoding step.

use std::io::Cursor;

use image::DynamicImage;
use pictor_core::models::ImageFormat;

use crate::error::{ProcessingError, ProcessingResult};
use crate::metadata::to_codec_format;

pub const DEFAULT_JPEG_QUALITY: u8 = 80;
pub const WEBP_QUALITY: f32 = 80.0;
pub const AVIF_QUALITY: f32 = 60.0;
pub const AVIF_SPEED: u8 = 6;

/// How the pipeline output gets encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding {
    pub format: ImageFormat,
    /// Only read when `format` is JPEG.
    pub jpeg_quality: u8,
}

impl Encoding {
    pub fn new(format: ImageFormat) -> Self {
        Self {
            format,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

pub fn encode(img: &DynamicImage, encoding: Encoding) -> ProcessingResult<Vec<u8>> {
    match encoding.format {
        ImageFormat::Jpeg => encode_jpeg(img, encoding.jpeg_quality),
        ImageFormat::Webp => Ok(encode_webp(img)),
        ImageFormat::Avif => encode_avif(img),
        ImageFormat::Png | ImageFormat::Gif => encode_with_codec(img, encoding.format),
    }
}

/// Compress to JPEG using mozjpeg
fn encode_jpeg(img: &DynamicImage, quality: u8) -> ProcessingResult<Vec<u8>> {
    let rgb_img = img.to_rgb8();
    let (width, height) = rgb_img.dimensions();

    let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
    comp.set_size(width as usize, height as usize);
    comp.set_quality(quality.clamp(1, 100) as f32);
    comp.set_optimize_coding(true);

    let mut comp = comp
        .start_compress(Vec::new())
        .map_err(|e| ProcessingError::Encode(e.to_string()))?;
    comp.write_scanlines(&rgb_img)
        .map_err(|e| ProcessingError::Encode(e.to_string()))?;
    comp.finish()
        .map_err(|e| ProcessingError::Encode(e.to_string()))
}

fn encode_webp(img: &DynamicImage) -> Vec<u8> {
    let rgba_img = img.to_rgba8();
    let (width, height) = rgba_img.dimensions();

    let encoder = webp::Encoder::from_rgba(&rgba_img, width, height);
    encoder.encode(WEBP_QUALITY).to_vec()
}

fn encode_avif(img: &DynamicImage) -> ProcessingResult<Vec<u8>> {
    let rgb_img = img.to_rgb8();
    let (width, height) = rgb_img.dimensions();

    let rgb_data: Vec<rgb::RGB8> = rgb_img
        .as_raw()
        .chunks_exact(3)
        .map(|chunk| rgb::RGB8::new(chunk[0], chunk[1], chunk[2]))
        .collect();

    let img_buf = ravif::Img::new(rgb_data.as_slice(), width as usize, height as usize);

    let encoder = ravif::Encoder::new()
        .with_quality(AVIF_QUALITY)
        .with_speed(AVIF_SPEED);

    let encoded = encoder
        .encode_rgb(img_buf)
        .map_err(|e| ProcessingError::Encode(e.to_string()))?;

    Ok(encoded.avif_file)
}

fn encode_with_codec(img: &DynamicImage, format: ImageFormat) -> ProcessingResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    // GIF and PNG encoders take RGBA directly.
    DynamicImage::ImageRgba8(img.to_rgba8())
        .write_to(&mut cursor, to_codec_format(format))
        .map_err(|e| ProcessingError::Encode(e.to_string()))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::read_metadata;
    use image::{Rgba, RgbaImage};

    fn sample() -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_fn(32, 16, |x, y| {
            Rgba([(x * 8) as u8, (y * 16) as u8, 128, 255])
        }))
    }

    #[test]
    fn test_each_format_is_readable_back() {
        for format in [
            ImageFormat::Jpeg,
            ImageFormat::Png,
            ImageFormat::Webp,
            ImageFormat::Gif,
        ] {
            let data = encode(&sample(), Encoding::new(format)).unwrap();
            let meta = read_metadata(&data).unwrap();
            assert_eq!(meta.format, format);
            assert_eq!((meta.width, meta.height), (32, 16));
        }
    }

    #[test]
    fn test_avif_encodes() {
        let data = encode(&sample(), Encoding::new(ImageFormat::Avif)).unwrap();
        let meta = read_metadata(&data).unwrap();
        assert_eq!(meta.format, ImageFormat::Avif);
        assert_eq!((meta.width, meta.height), (32, 16));
    }

    #[test]
    fn test_jpeg_quality_changes_size() {
        let noisy = DynamicImage::ImageRgba8(RgbaImage::from_fn(64, 64, |x, y| {
            Rgba([((x * 37 + y * 11) % 256) as u8, ((x * y) % 256) as u8, (y * 4) as u8, 255])
        }));
        let mut low = Encoding::new(ImageFormat::Jpeg);
        low.jpeg_quality = 10;
        let mut high = Encoding::new(ImageFormat::Jpeg);
        high.jpeg_quality = 95;
        let low = encode(&noisy, low).unwrap();
        let high = encode(&noisy, high).unwrap();
        assert!(low.len() < high.len());
    }
}
