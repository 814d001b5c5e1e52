use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::map::map_colors;

use crate::state::EffectMode;

/// Renders the colour-mode view of `img`.
///
/// HSV and HSL are shown the way an 8-bit BGR viewer would show the raw
/// channel planes: hue (halved to 0..180) lands in blue, the second plane in
/// green and the third in red.
pub fn apply(img: &RgbImage, mode: EffectMode) -> RgbImage {
    match mode {
        EffectMode::Original => img.clone(),
        EffectMode::Grayscale => gray_to_rgb(grayscale(img)),
        EffectMode::Hsv => channel_planes(img, rgb_to_hsv),
        EffectMode::Hsl => channel_planes(img, |r, g, b| {
            let (h, s, l) = rgb_to_hsl(r, g, b);
            (h, l, s)
        }),
    }
}

/// BT.601 luma (0.299, 0.587, 0.114), the weighting YCrCb also uses.
pub fn luma([r, g, b]: [u8; 3]) -> f32 {
    0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32
}

pub fn grayscale(img: &RgbImage) -> GrayImage {
    map_colors(img, |px: Rgb<u8>| {
        Luma([luma(px.0).round().clamp(0.0, 255.0) as u8])
    })
}

pub fn gray_to_rgb(gray: GrayImage) -> RgbImage {
    DynamicImage::ImageLuma8(gray).to_rgb8()
}

/// Packs the (hue, second, third) planes produced by `f` into blue, green
/// and red respectively.
fn channel_planes<F>(img: &RgbImage, f: F) -> RgbImage
where
    F: Fn(f32, f32, f32) -> (f32, f32, f32),
{
    let mut out = img.clone();
    for px in out.pixels_mut() {
        let r = px[0] as f32 / 255.0;
        let g = px[1] as f32 / 255.0;
        let b = px[2] as f32 / 255.0;
        let (hue, second, third) = f(r, g, b);
        *px = Rgb([
            to_u8(third),
            to_u8(second),
            (hue * 180.0).round().clamp(0.0, 179.0) as u8,
        ]);
    }
    out
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn wrap_unit(mut v: f32) -> f32 {
    while v < 0.0 {
        v += 1.0;
    }
    while v >= 1.0 {
        v -= 1.0;
    }
    v
}

fn hue_unit(r: f32, g: f32, b: f32, max: f32, d: f32) -> f32 {
    let h = if (max - r).abs() < f32::EPSILON {
        ((g - b) / d) % 6.0
    } else if (max - g).abs() < f32::EPSILON {
        ((b - r) / d) + 2.0
    } else {
        ((r - g) / d) + 4.0
    };
    wrap_unit(h / 6.0)
}

/// Returns (hue, saturation, value), all in 0..1.
fn rgb_to_hsv(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g.max(b));
    let min = r.min(g.min(b));
    let d = max - min;

    if d <= 1e-6 {
        return (0.0, 0.0, max);
    }

    let s = if max > 0.0 { d / max } else { 0.0 };
    (hue_unit(r, g, b, max, d), s.clamp(0.0, 1.0), max)
}

/// Returns (hue, saturation, lightness), all in 0..1.
fn rgb_to_hsl(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let max = r.max(g.max(b));
    let min = r.min(g.min(b));
    let l = (max + min) * 0.5;
    let d = max - min;

    if d <= 1e-6 {
        return (0.0, 0.0, l);
    }

    let s = d / (1.0 - (2.0 * l - 1.0).abs());
    (hue_unit(r, g, b, max, d), s.clamp(0.0, 1.0), l.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use image::{ImageBuffer, Rgb, RgbImage};

    use crate::state::EffectMode;

    use super::{apply, grayscale};

    fn one_pixel(rgb: [u8; 3]) -> RgbImage {
        ImageBuffer::from_pixel(1, 1, Rgb(rgb))
    }

    fn pixel(img: &RgbImage) -> [u8; 3] {
        img.get_pixel(0, 0).0
    }

    #[test]
    fn original_is_a_copy() {
        let img = one_pixel([10, 20, 30]);
        assert_eq!(apply(&img, EffectMode::Original), img);
    }

    #[test]
    fn grayscale_has_equal_channels() {
        let rgb = pixel(&apply(&one_pixel([200, 40, 90]), EffectMode::Grayscale));
        assert_eq!(rgb[0], rgb[1]);
        assert_eq!(rgb[1], rgb[2]);
    }

    #[test]
    fn grayscale_uses_bt601_weights() {
        let gray = grayscale(&one_pixel([255, 0, 0]));
        assert_eq!(gray.get_pixel(0, 0)[0], 76);
        let gray = grayscale(&one_pixel([0, 255, 0]));
        assert_eq!(gray.get_pixel(0, 0)[0], 150);
        let gray = grayscale(&one_pixel([0, 0, 255]));
        assert_eq!(gray.get_pixel(0, 0)[0], 29);
    }

    #[test]
    fn hsv_of_pure_green_puts_hue_sixty_in_blue_plane() {
        // green hue = 120 deg, halved to 60; full saturation and value
        let rgb = pixel(&apply(&one_pixel([0, 255, 0]), EffectMode::Hsv));
        assert_eq!(rgb, [255, 255, 60]);
    }

    #[test]
    fn hsl_of_gray_has_zero_hue_and_saturation() {
        let rgb = pixel(&apply(&one_pixel([128, 128, 128]), EffectMode::Hsl));
        assert_eq!(rgb[0], 0);
        assert_eq!(rgb[1], 128);
        assert_eq!(rgb[2], 0);
    }
}
