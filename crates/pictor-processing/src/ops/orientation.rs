use image::{imageops, DynamicImage, GenericImageView, Rgba, RgbaImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use pictor_core::models::FlipOptions;

const ANGLE_EPSILON: f32 = 1e-3;

/// Rotate clockwise by `angle` degrees.
///
/// Right angles are lossless pixel moves. Any other angle grows the canvas to
/// hold the whole rotated image; uncovered corners are transparent black.
pub fn rotate(img: DynamicImage, angle: f32) -> DynamicImage {
    let angle = angle.rem_euclid(360.0);
    let near = |target: f32| (angle - target).abs() < ANGLE_EPSILON;

    if near(0.0) || near(360.0) {
        img
    } else if near(90.0) {
        img.rotate90()
    } else if near(180.0) {
        img.rotate180()
    } else if near(270.0) {
        img.rotate270()
    } else {
        rotate_arbitrary(&img, angle)
    }
}

fn rotate_arbitrary(img: &DynamicImage, degrees: f32) -> DynamicImage {
    let (width, height) = img.dimensions();
    let theta = degrees.to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());

    let new_width = (width as f32 * cos + height as f32 * sin).ceil() as u32;
    let new_height = (width as f32 * sin + height as f32 * cos).ceil() as u32;

    let mut canvas = RgbaImage::from_pixel(new_width.max(1), new_height.max(1), Rgba([0, 0, 0, 0]));
    let x_offset = (new_width.saturating_sub(width)) / 2;
    let y_offset = (new_height.saturating_sub(height)) / 2;
    imageops::overlay(
        &mut canvas,
        &img.to_rgba8(),
        x_offset as i64,
        y_offset as i64,
    );

    let rotated = rotate_about_center(&canvas, theta, Interpolation::Bilinear, Rgba([0, 0, 0, 0]));
    DynamicImage::ImageRgba8(rotated)
}

pub fn flip(img: DynamicImage, options: &FlipOptions) -> DynamicImage {
    let mut img = img;
    if options.horizontal {
        img = img.fliph();
    }
    if options.vertical {
        img = img.flipv();
    }
    img
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn marked(width: u32, height: u32) -> DynamicImage {
        let mut img = RgbImage::from_pixel(width, height, Rgb([0, 0, 0]));
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_right_angles_swap_dimensions() {
        assert_eq!(rotate(marked(4, 2), 90.0).dimensions(), (2, 4));
        assert_eq!(rotate(marked(4, 2), 180.0).dimensions(), (4, 2));
        assert_eq!(rotate(marked(4, 2), -90.0).dimensions(), (2, 4));
        assert_eq!(rotate(marked(4, 2), 720.0).dimensions(), (4, 2));
    }

    #[test]
    fn test_rotate_90_is_clockwise() {
        let rotated = rotate(marked(4, 2), 90.0).to_rgb8();
        // Top-left moves to top-right.
        assert_eq!(rotated.get_pixel(1, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_arbitrary_angle_expands_canvas() {
        let rotated = rotate(marked(100, 100), 45.0);
        let (w, h) = rotated.dimensions();
        assert!(w >= 141 && h >= 141, "got {}x{}", w, h);
        // Corners fall outside the source and stay transparent.
        assert_eq!(rotated.to_rgba8().get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_flip() {
        let img = marked(3, 3);
        let horizontal = FlipOptions {
            horizontal: true,
            vertical: false,
        };
        let h = flip(img.clone(), &horizontal).to_rgb8();
        assert_eq!(h.get_pixel(2, 0), &Rgb([255, 0, 0]));

        let both = FlipOptions {
            horizontal: true,
            vertical: true,
        };
        let hv = flip(img, &both).to_rgb8();
        assert_eq!(hv.get_pixel(2, 2), &Rgb([255, 0, 0]));
    }
}
