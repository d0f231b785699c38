use std::io::Cursor;

use image::ImageReader;
use pictor_core::models::ImageFormat;

use crate::error::{ProcessingError, ProcessingResult};

/// What the processor reports about an encoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMetadata {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    /// Encoded size in bytes.
    pub size: u64,
}

/// Identify the container format from magic bytes.
pub fn detect_format(data: &[u8]) -> ProcessingResult<ImageFormat> {
    let format = image::guess_format(data).map_err(|_| ProcessingError::UnknownFormat)?;
    match format {
        image::ImageFormat::Jpeg => Ok(ImageFormat::Jpeg),
        image::ImageFormat::Png => Ok(ImageFormat::Png),
        image::ImageFormat::WebP => Ok(ImageFormat::Webp),
        image::ImageFormat::Gif => Ok(ImageFormat::Gif),
        image::ImageFormat::Avif => Ok(ImageFormat::Avif),
        _ => Err(ProcessingError::UnknownFormat),
    }
}

pub(crate) fn to_codec_format(format: ImageFormat) -> image::ImageFormat {
    match format {
        ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        ImageFormat::Png => image::ImageFormat::Png,
        ImageFormat::Webp => image::ImageFormat::WebP,
        ImageFormat::Gif => image::ImageFormat::Gif,
        ImageFormat::Avif => image::ImageFormat::Avif,
    }
}

/// Read dimensions from the image header without decoding pixels.
pub fn read_metadata(data: &[u8]) -> ProcessingResult<ImageMetadata> {
    let format = detect_format(data)?;

    let (width, height) = match format {
        // The image crate only encodes AVIF; dimensions come from the container.
        ImageFormat::Avif => avif_dimensions(data)?,
        other => ImageReader::with_format(Cursor::new(data), to_codec_format(other))
            .into_dimensions()
            .map_err(|e| ProcessingError::Decode(e.to_string()))?,
    };

    if width == 0 || height == 0 {
        return Err(ProcessingError::Decode("image has no pixels".to_string()));
    }

    Ok(ImageMetadata {
        width,
        height,
        format,
        size: data.len() as u64,
    })
}

fn avif_dimensions(data: &[u8]) -> ProcessingResult<(u32, u32)> {
    let avif = avif_parse::read_avif(&mut Cursor::new(data))
        .map_err(|e| ProcessingError::Decode(format!("Failed to parse AVIF: {e:?}")))?;
    let meta = avif
        .primary_item_metadata()
        .map_err(|e| ProcessingError::Decode(format!("Failed to read AVIF metadata: {e:?}")))?;
    Ok((meta.max_frame_width.get(), meta.max_frame_height.get()))
}
