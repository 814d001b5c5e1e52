use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use imageproc::edges::canny;
use imageproc::filter::{box_filter, median_filter};
use imageproc::morphology::{Mask, grayscale_dilate};

use super::bilateral::{BilateralParams, bilateral_filter};
use super::color::{gray_to_rgb, grayscale};

const HALO_FLOOR: f32 = 0.3;
const CARTOON_MEDIAN_RADIUS: u32 = 3;
const CARTOON_CANNY_LOW: f32 = 50.0;
const CARTOON_CANNY_HIGH: f32 = 150.0;
const CARTOON_LEVEL_STEP: f32 = 25.0;
const SKETCH_CANNY_LOW: f32 = 50.0;
const SKETCH_CANNY_HIGH: f32 = 150.0;

/// Sigmoid colour curve used on the red channel.
pub fn lomo_lut() -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        let x = i as f32 / 256.0;
        let y = 256.0 / (1.0 + (-(x - 0.5) / 0.1).exp());
        *v = y.round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Red-channel curve plus a dark vignette around a bright centre disc.
pub fn lomography(img: &RgbImage) -> RgbImage {
    let (w, h) = img.dimensions();
    let lut = lomo_lut();
    let halo = halo_mask(w, h);

    RgbImage::from_fn(w, h, |x, y| {
        let px = img.get_pixel(x, y);
        let factor = halo.get_pixel(x, y)[0] as f32 / 255.0;
        let curved = [lut[px[0] as usize], px[1], px[2]];
        Rgb(curved.map(|c| (c as f32 * factor).round().clamp(0.0, 255.0) as u8))
    })
}

fn halo_mask(w: u32, h: u32) -> GrayImage {
    let floor = (HALO_FLOOR * 255.0).round() as u8;
    let mut halo = GrayImage::from_pixel(w, h, Luma([floor]));
    let radius = (w / 3) as i32;
    draw_filled_circle_mut(
        &mut halo,
        ((w / 2) as i32, (h / 2) as i32),
        radius,
        Luma([255]),
    );
    let blur_radius = (w / 3) / 2;
    box_filter(&halo, blur_radius, blur_radius)
}

/// Flattened colours from a bilateral filter, outlined by dilated Canny edges.
pub fn cartoon(img: &RgbImage) -> RgbImage {
    let edges = edge_weight(img);

    let smoothed = bilateral_filter(img, BilateralParams::default());
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let px = smoothed.get_pixel(x, y);
        let weight = edges.get_pixel(x, y)[0] as f32 / 255.0;
        Rgb(px.0.map(|c| {
            let level = ((c as f32 / CARTOON_LEVEL_STEP).round() * CARTOON_LEVEL_STEP).min(255.0);
            (level * weight).round() as u8
        }))
    })
}

/// 2x2 square anchored at its bottom-right cell: each pixel also takes the
/// maximum of its left, upper and upper-left neighbours.
fn edge_mask() -> Mask {
    Mask::from_image(&GrayImage::from_pixel(2, 2, Luma([255])), 1, 1)
}

/// 255 away from edges, falling towards 0 on dilated, softened edge lines.
fn edge_weight(img: &RgbImage) -> GrayImage {
    let median = median_filter(img, CARTOON_MEDIAN_RADIUS, CARTOON_MEDIAN_RADIUS);
    let edges = canny(&grayscale(&median), CARTOON_CANNY_LOW, CARTOON_CANNY_HIGH);
    let mut edges = grayscale_dilate(&edges, &edge_mask());
    invert(&mut edges);
    box_filter(&edges, 2, 2)
}

/// Dark Canny edge lines on a white page.
pub fn sketch(img: &RgbImage) -> RgbImage {
    let mut edges = canny(&grayscale(img), SKETCH_CANNY_LOW, SKETCH_CANNY_HIGH);
    invert(&mut edges);
    gray_to_rgb(edges)
}

fn invert(img: &mut GrayImage) {
    for px in img.pixels_mut() {
        px[0] = 255 - px[0];
    }
}
