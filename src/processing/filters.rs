use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::definitions::Image;
use imageproc::edges::canny;
use imageproc::filter::{box_filter, filter3x3, laplacian_filter};
use imageproc::map::{blue_channel, green_channel, red_channel};

use crate::state::{Filter, FilterToggleSet};

use super::color::{gray_to_rgb, grayscale};

pub const CANNY_LOW: f32 = 50.0;
pub const CANNY_HIGH: f32 = 150.0;
/// Radius of the 5x5 box blur.
pub const BLUR_RADIUS: u32 = 2;

/// Second-order mixed Sobel kernel (d2/dxdy), row-major.
const MIXED_SOBEL: [i32; 9] = [1, 0, -1, 0, 0, 0, -1, 0, 1];

/// One entry of the filter pipeline. A stage receives the working buffer and
/// the grayscale plane of the untouched source.
pub struct FilterStage {
    pub filter: Filter,
    pub apply: fn(&RgbImage, &GrayImage) -> RgbImage,
}

/// Stages in the order they are applied; each replaces the working buffer.
pub const PIPELINE: [FilterStage; 4] = [
    FilterStage {
        filter: Filter::Sobel,
        apply: sobel_stage,
    },
    FilterStage {
        filter: Filter::Canny,
        apply: canny_stage,
    },
    FilterStage {
        filter: Filter::Laplacian,
        apply: laplacian_stage,
    },
    FilterStage {
        filter: Filter::Blur,
        apply: blur_stage,
    },
];

fn sobel_stage(working: &RgbImage, _gray: &GrayImage) -> RgbImage {
    sobel(working)
}

fn canny_stage(_working: &RgbImage, gray: &GrayImage) -> RgbImage {
    canny_edges(gray)
}

fn laplacian_stage(_working: &RgbImage, gray: &GrayImage) -> RgbImage {
    laplacian(gray)
}

fn blur_stage(working: &RgbImage, _gray: &GrayImage) -> RgbImage {
    blur(working)
}

/// Runs every active stage of [`PIPELINE`] over a copy of `img`.
///
/// Canny and Laplacian read the grayscale source, so they discard whatever
/// earlier stages produced. Sobel and Blur work on the current buffer.
pub fn apply(img: &RgbImage, toggles: &FilterToggleSet) -> RgbImage {
    let gray = grayscale(img);
    PIPELINE
        .iter()
        .filter(|stage| toggles.is_active(stage.filter))
        .fold(img.clone(), |working, stage| (stage.apply)(&working, &gray))
}

/// Mixed second derivative per colour channel; negative responses become 0.
pub fn sobel(img: &RgbImage) -> RgbImage {
    per_channel(img, |plane| {
        let response: Image<Luma<i16>> = filter3x3(plane, &MIXED_SOBEL);
        saturate(&response)
    })
}

pub fn canny_edges(gray: &GrayImage) -> RgbImage {
    gray_to_rgb(canny(gray, CANNY_LOW, CANNY_HIGH))
}

/// Laplacian of `gray` with negative responses clipped to 0.
pub fn laplacian(gray: &GrayImage) -> RgbImage {
    gray_to_rgb(saturate(&laplacian_filter(gray)))
}

pub fn blur(img: &RgbImage) -> RgbImage {
    per_channel(img, |plane| box_filter(plane, BLUR_RADIUS, BLUR_RADIUS))
}

fn saturate(response: &Image<Luma<i16>>) -> GrayImage {
    GrayImage::from_fn(response.width(), response.height(), |x, y| {
        Luma([response.get_pixel(x, y)[0].clamp(0, 255) as u8])
    })
}

/// Applies `f` to each colour plane independently and merges the results.
pub fn per_channel<F>(img: &RgbImage, f: F) -> RgbImage
where
    F: Fn(&GrayImage) -> GrayImage,
{
    let r = f(&red_channel(img));
    let g = f(&green_channel(img));
    let b = f(&blue_channel(img));
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        Rgb([
            r.get_pixel(x, y)[0],
            g.get_pixel(x, y)[0],
            b.get_pixel(x, y)[0],
        ])
    })
}
