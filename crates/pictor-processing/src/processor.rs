use std::path::Path;

use ab_glyph::FontArc;
use image::DynamicImage;
use pictor_core::models::{ImageFormat, TransformOptions};

use crate::compression::{encode, Encoding};
use crate::error::{ProcessingError, ProcessingResult};
use crate::metadata::{detect_format, read_metadata, to_codec_format, ImageMetadata};
use crate::ops::{filters, orientation, resize, watermark};
use crate::pipeline::{plan, Step};

/// Locations tried when no watermark font is configured.
const FALLBACK_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Pixel transformation engine.
pub trait ImageProcessor: Send + Sync {
    /// Dimensions, format and byte size of an encoded image.
    fn metadata(&self, data: &[u8]) -> ProcessingResult<ImageMetadata>;

    /// Run the requested operations in pipeline order and encode the result.
    fn transform(&self, data: &[u8], options: &TransformOptions) -> ProcessingResult<Vec<u8>>;
}

/// [`ImageProcessor`] built on the `image` and `imageproc` crates.
#[derive(Clone, Default)]
pub struct RasterProcessor {
    font: Option<FontArc>,
}

impl std::fmt::Debug for RasterProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterProcessor")
            .field("has_font", &self.font.is_some())
            .finish()
    }
}

impl RasterProcessor {
    /// A processor without a watermark font. Watermark requests fail.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_font(font: FontArc) -> Self {
        Self { font: Some(font) }
    }

    /// Load the configured font, or the first system font found when `path` is `None`.
    ///
    /// A configured path that cannot be loaded is an error. Finding no system
    /// font is not: the processor is returned without watermark support.
    pub fn from_font_path(path: Option<&str>) -> ProcessingResult<Self> {
        if let Some(path) = path {
            let font = load_font(Path::new(path))?;
            tracing::info!(path = %path, "Loaded watermark font");
            return Ok(Self::with_font(font));
        }

        for candidate in FALLBACK_FONT_PATHS {
            let candidate = Path::new(candidate);
            if candidate.exists() {
                if let Ok(font) = load_font(candidate) {
                    tracing::info!(path = %candidate.display(), "Loaded system watermark font");
                    return Ok(Self::with_font(font));
                }
            }
        }

        tracing::warn!("No watermark font found; watermark transforms will fail");
        Ok(Self::new())
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    fn decode(&self, data: &[u8]) -> ProcessingResult<(DynamicImage, ImageFormat)> {
        let format = detect_format(data)?;
        if format == ImageFormat::Avif {
            return Err(ProcessingError::UnsupportedFormat("AVIF".to_string()));
        }
        let img = image::load_from_memory_with_format(data, to_codec_format(format))
            .map_err(|e| ProcessingError::Decode(e.to_string()))?;
        Ok((img, format))
    }
}

fn load_font(path: &Path) -> ProcessingResult<FontArc> {
    let bytes = std::fs::read(path).map_err(|e| {
        ProcessingError::FontUnavailable(format!("cannot read {}: {}", path.display(), e))
    })?;
    FontArc::try_from_vec(bytes).map_err(|e| {
        ProcessingError::FontUnavailable(format!("invalid font {}: {}", path.display(), e))
    })
}

impl ImageProcessor for RasterProcessor {
    fn metadata(&self, data: &[u8]) -> ProcessingResult<ImageMetadata> {
        read_metadata(data)
    }

    fn transform(&self, data: &[u8], options: &TransformOptions) -> ProcessingResult<Vec<u8>> {
        let steps = plan(options);

        // Fail before decoding rather than after the expensive steps.
        if options.watermark.is_some() && self.font.is_none() {
            return Err(ProcessingError::FontUnavailable(
                "no watermark font configured".to_string(),
            ));
        }

        let (mut img, source_format) = self.decode(data)?;
        let mut encoding = Encoding::new(source_format);

        for step in &steps {
            img = match step {
                Step::Crop => match &options.crop {
                    Some(crop) => resize::crop(&img, crop)?,
                    None => img,
                },
                Step::Resize => match &options.resize {
                    Some(opts) => resize::resize(&img, opts)?,
                    None => img,
                },
                Step::Rotate => match &options.rotate {
                    Some(rotate) => orientation::rotate(img, rotate.angle),
                    None => img,
                },
                Step::Flip => match &options.flip {
                    Some(flip) => orientation::flip(img, flip),
                    None => img,
                },
                Step::Compress => {
                    if let Some(compress) = &options.compress {
                        encoding.jpeg_quality = compress.quality;
                    }
                    img
                }
                Step::Filter => match &options.filter {
                    Some(filter) => filters::apply(img, filter),
                    None => img,
                },
                Step::Watermark => match (&options.watermark, &self.font) {
                    (Some(mark), Some(font)) => watermark::apply(img, mark, font),
                    _ => img,
                },
                Step::Format => {
                    if let Some(format) = options.format {
                        encoding.format = format.into();
                    }
                    img
                }
            };
        }

        if options.compress.is_some() && encoding.format != ImageFormat::Jpeg {
            tracing::debug!(
                format = %encoding.format,
                "Compress quality ignored for non-JPEG output"
            );
        }

        let output = encode(&img, encoding)?;

        tracing::debug!(
            steps = ?steps,
            source_format = %source_format,
            output_format = %encoding.format,
            input_bytes = data.len(),
            output_bytes = output.len(),
            "Transform pipeline finished"
        );

        Ok(output)
    }
}
