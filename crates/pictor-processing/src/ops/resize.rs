use image::imageops::FilterType;
use image::{imageops, DynamicImage, GenericImageView, Rgba, RgbaImage};
use pictor_core::models::{CropOptions, ResizeFit, ResizeOptions};

use crate::error::{ProcessingError, ProcessingResult};

/// Cut the region described by `crop` out of `img`.
pub fn crop(img: &DynamicImage, crop: &CropOptions) -> ProcessingResult<DynamicImage> {
    let (width, height) = img.dimensions();
    let right = crop.x as u64 + crop.width as u64;
    let bottom = crop.y as u64 + crop.height as u64;
    if crop.width == 0 || crop.height == 0 || right > width as u64 || bottom > height as u64 {
        return Err(ProcessingError::InvalidOperation(format!(
            "crop {}x{}+{}+{} outside {}x{} image",
            crop.width, crop.height, crop.x, crop.y, width, height
        )));
    }
    Ok(img.crop_imm(crop.x, crop.y, crop.width, crop.height))
}

/// Fill in a missing side from the source aspect ratio.
pub fn calculate_dimensions(
    orig_width: u32,
    orig_height: u32,
    width: Option<u32>,
    height: Option<u32>,
) -> (u32, u32) {
    match (width, height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) => {
            let aspect_ratio = orig_height as f32 / orig_width as f32;
            let h = (w as f32 * aspect_ratio).round() as u32;
            (w, h.max(1))
        }
        (None, Some(h)) => {
            let aspect_ratio = orig_width as f32 / orig_height as f32;
            let w = (h as f32 * aspect_ratio).round() as u32;
            (w.max(1), h)
        }
        (None, None) => (orig_width, orig_height),
    }
}

/// Cheaper filters for strong downscales, Lanczos3 otherwise.
pub fn select_filter(
    orig_width: u32,
    orig_height: u32,
    new_width: u32,
    new_height: u32,
) -> FilterType {
    let width_ratio = orig_width as f32 / new_width as f32;
    let height_ratio = orig_height as f32 / new_height as f32;
    let max_ratio = width_ratio.max(height_ratio);

    if max_ratio > 2.0 {
        FilterType::Triangle
    } else if max_ratio > 1.5 {
        FilterType::CatmullRom
    } else {
        FilterType::Lanczos3
    }
}

pub fn resize(img: &DynamicImage, options: &ResizeOptions) -> ProcessingResult<DynamicImage> {
    let (orig_width, orig_height) = img.dimensions();
    let (target_width, target_height) =
        calculate_dimensions(orig_width, orig_height, options.width, options.height);

    if target_width == 0 || target_height == 0 {
        return Err(ProcessingError::InvalidOperation(
            "resize target has a zero dimension".to_string(),
        ));
    }

    // With a single side given the box already has the source aspect ratio.
    let fit = if options.width.is_none() || options.height.is_none() {
        ResizeFit::Fill
    } else {
        options.fit
    };

    let filter = select_filter(orig_width, orig_height, target_width, target_height);
    let resized = match fit {
        ResizeFit::Fill => img.resize_exact(target_width, target_height, filter),
        ResizeFit::Cover => img.resize_to_fill(target_width, target_height, filter),
        ResizeFit::Contain => contain(img, target_width, target_height, filter),
    };

    tracing::debug!(
        from_width = orig_width,
        from_height = orig_height,
        to_width = target_width,
        to_height = target_height,
        fit = ?fit,
        "Resized image"
    );

    Ok(resized)
}

/// Scale to fit inside the box and center on an opaque black canvas.
fn contain(
    img: &DynamicImage,
    target_width: u32,
    target_height: u32,
    filter: FilterType,
) -> DynamicImage {
    let scaled = img.resize(target_width, target_height, filter);
    let (scaled_width, scaled_height) = scaled.dimensions();

    let canvas_img = RgbaImage::from_pixel(target_width, target_height, Rgba([0, 0, 0, 255]));
    let mut canvas = DynamicImage::ImageRgba8(canvas_img);

    let x_offset = (target_width.saturating_sub(scaled_width)) / 2;
    let y_offset = (target_height.saturating_sub(scaled_height)) / 2;
    imageops::overlay(&mut canvas, &scaled, x_offset as i64, y_offset as i64);

    canvas
}
