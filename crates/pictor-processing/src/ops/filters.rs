use image::{DynamicImage, Rgba};
use pictor_core::models::FilterOptions;

const SHARPEN_KERNEL: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];

const SEPIA_MATRIX: [[f32; 3]; 3] = [
    [0.393, 0.769, 0.189],
    [0.349, 0.686, 0.168],
    [0.272, 0.534, 0.131],
];

/// Apply every enabled filter. Each flag is independent; they run as
/// grayscale, blur, sharpen, negate, sepia.
pub fn apply(img: DynamicImage, options: &FilterOptions) -> DynamicImage {
    let mut result = img;

    if options.grayscale {
        result = result.grayscale();
    }

    if let Some(sigma) = options.blur {
        result = result.blur(sigma.clamp(0.3, 1000.0));
    }

    if options.sharpen {
        result = result.filter3x3(&SHARPEN_KERNEL);
    }

    if options.negate {
        result.invert();
    }

    if options.sepia {
        result = sepia(&result);
    }

    result
}

/// Recombine color channels through the sepia matrix. Alpha is kept.
pub fn sepia(img: &DynamicImage) -> DynamicImage {
    let mut rgba = img.to_rgba8();
    for pixel in rgba.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        let (r, g, b) = (r as f32, g as f32, b as f32);
        let mix = |row: [f32; 3]| (row[0] * r + row[1] * g + row[2] * b).round().min(255.0) as u8;
        *pixel = Rgba([
            mix(SEPIA_MATRIX[0]),
            mix(SEPIA_MATRIX[1]),
            mix(SEPIA_MATRIX[2]),
            a,
        ]);
    }
    DynamicImage::ImageRgba8(rgba)
}
