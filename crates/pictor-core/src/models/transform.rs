//! Transform request types.
//!
//! Field order in a request carries no meaning: the processing pipeline
//! always applies crop, resize, rotate, flip, compress, filter, watermark and
//! format in that order.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::image::ImageFormat;

const MAX_DIMENSION: u32 = 16_384;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFit {
    /// Scale to cover the box, then center-crop
    #[default]
    Cover,
    /// Scale to fit inside the box, then pad
    Contain,
    /// Stretch to the exact box
    Fill,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_resize"))]
pub struct ResizeOptions {
    #[validate(range(min = 1, max = 16384))]
    pub width: Option<u32>,
    #[validate(range(min = 1, max = 16384))]
    pub height: Option<u32>,
    #[serde(default)]
    pub fit: ResizeFit,
}

fn validate_resize(options: &ResizeOptions) -> Result<(), ValidationError> {
    if options.width.is_none() && options.height.is_none() {
        return Err(ValidationError::new("resize_needs_dimension")
            .with_message("resize requires width or height".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CropOptions {
    pub x: u32,
    pub y: u32,
    #[validate(range(min = 1, max = 16384))]
    pub width: u32,
    #[validate(range(min = 1, max = 16384))]
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotateOptions {
    /// Degrees, clockwise.
    pub angle: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlipOptions {
    #[serde(default)]
    pub horizontal: bool,
    #[serde(default)]
    pub vertical: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CompressOptions {
    #[validate(range(min = 1, max = 100))]
    pub quality: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct FilterOptions {
    #[serde(default)]
    pub grayscale: bool,
    #[serde(default)]
    pub sepia: bool,
    /// Gaussian sigma.
    #[validate(range(min = 0.3, max = 1000.0))]
    pub blur: Option<f32>,
    #[serde(default)]
    pub sharpen: bool,
    #[serde(default)]
    pub negate: bool,
}

impl FilterOptions {
    pub fn is_noop(&self) -> bool {
        !self.grayscale && !self.sepia && self.blur.is_none() && !self.sharpen && !self.negate
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct WatermarkOptions {
    #[validate(length(min = 1, max = 256))]
    pub text: String,
    #[serde(default)]
    pub position: WatermarkPosition,
}

/// Encodings a transform can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    Webp,
    Avif,
}

impl From<OutputFormat> for ImageFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Jpeg => ImageFormat::Jpeg,
            OutputFormat::Png => ImageFormat::Png,
            OutputFormat::Webp => ImageFormat::Webp,
            OutputFormat::Avif => ImageFormat::Avif,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct TransformOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub resize: Option<ResizeOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub crop: Option<CropOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotate: Option<RotateOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flip: Option<FlipOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub compress: Option<CompressOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub filter: Option<FilterOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(nested)]
    pub watermark: Option<WatermarkOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
}

impl TransformOptions {
    pub fn is_empty(&self) -> bool {
        self.resize.is_none()
            && self.crop.is_none()
            && self.rotate.is_none()
            && self.flip.is_none()
            && self.compress.is_none()
            && self.filter.is_none()
            && self.watermark.is_none()
            && self.format.is_none()
    }

    /// Checks the options that depend on the source image size.
    ///
    /// Crop runs first, so its region is checked against the source dimensions.
    pub fn check_bounds(&self, width: u32, height: u32) -> Result<(), String> {
        if let Some(crop) = &self.crop {
            let right = crop.x as u64 + crop.width as u64;
            let bottom = crop.y as u64 + crop.height as u64;
            if right > width as u64 || bottom > height as u64 {
                return Err(format!(
                    "crop region {}x{}+{}+{} exceeds image bounds {}x{}",
                    crop.width, crop.height, crop.x, crop.y, width, height
                ));
            }
        }
        if let Some(rotate) = &self.rotate {
            if !rotate.angle.is_finite() {
                return Err("rotate angle must be a finite number".to_string());
            }
        }
        if let Some(resize) = &self.resize {
            let too_large = |v: Option<u32>| v.is_some_and(|v| v > MAX_DIMENSION);
            if too_large(resize.width) || too_large(resize.height) {
                return Err(format!("resize exceeds {} pixels", MAX_DIMENSION));
            }
        }
        Ok(())
    }
}

/// How a finished transform is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformMode {
    /// Overwrite the source image record; the id stays the same
    #[default]
    InPlace,
    /// Save the result as a new image and leave the source untouched
    NewDerivative,
}

/// Body of a transform submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct TransformRequest {
    #[serde(flatten)]
    #[validate(nested)]
    pub options: TransformOptions,
    #[serde(default)]
    pub mode: TransformMode,
}
