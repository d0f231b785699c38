use ab_glyph::{FontArc, PxScale};
use image::{imageops, DynamicImage, GenericImageView, Rgba, RgbaImage};
use imageproc::drawing::{draw_text_mut, text_size};
use pictor_core::constants::WATERMARK_MARGIN_PX;
use pictor_core::models::{WatermarkOptions, WatermarkPosition};

const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 200]);
const PADDING_PX: u32 = 2;

/// Font size in pixels, following the shorter image side.
pub fn font_scale(width: u32, height: u32) -> f32 {
    (width.min(height) as f32 / 12.0).clamp(12.0, 128.0)
}

/// Top-left corner of an overlay of `overlay` size placed at `position`.
pub fn anchor(
    position: WatermarkPosition,
    image: (u32, u32),
    overlay: (u32, u32),
    margin: u32,
) -> (i64, i64) {
    let (iw, ih) = (image.0 as i64, image.1 as i64);
    let (ow, oh) = (overlay.0 as i64, overlay.1 as i64);
    let m = margin as i64;

    match position {
        WatermarkPosition::TopLeft => (m, m),
        WatermarkPosition::TopRight => (iw - ow - m, m),
        WatermarkPosition::BottomLeft => (m, ih - oh - m),
        WatermarkPosition::BottomRight => (iw - ow - m, ih - oh - m),
        WatermarkPosition::Center => ((iw - ow) / 2, (ih - oh) / 2),
    }
}

/// Render the text into a transparent overlay.
pub fn render_text(text: &str, scale: f32, font: &FontArc) -> RgbaImage {
    let scale = PxScale::from(scale);
    let (text_width, text_height) = text_size(scale, font, text);
    let mut overlay = RgbaImage::new(text_width + PADDING_PX * 2, text_height + PADDING_PX * 2);
    draw_text_mut(
        &mut overlay,
        TEXT_COLOR,
        PADDING_PX as i32,
        PADDING_PX as i32,
        scale,
        font,
        text,
    );
    overlay
}

/// Composite the watermark text onto `img`.
pub fn apply(img: DynamicImage, options: &WatermarkOptions, font: &FontArc) -> DynamicImage {
    let (width, height) = img.dimensions();
    let overlay = render_text(&options.text, font_scale(width, height), font);
    let (x, y) = anchor(
        options.position,
        (width, height),
        overlay.dimensions(),
        WATERMARK_MARGIN_PX,
    );

    let mut base = img.to_rgba8();
    imageops::overlay(&mut base, &overlay, x, y);

    tracing::debug!(
        position = ?options.position,
        x = x,
        y = y,
        overlay_width = overlay.width(),
        overlay_height = overlay.height(),
        "Applied watermark"
    );

    DynamicImage::ImageRgba8(base)
}
