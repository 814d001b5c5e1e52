use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::contrast::equalize_histogram;
use imageproc::drawing::draw_line_segment_mut;
use imageproc::stats::histogram;

use super::color::luma;

pub const PLOT_WIDTH: u32 = 512;
pub const PLOT_HEIGHT: u32 = 300;
const BINS: usize = 256;
const BACKGROUND: Rgb<u8> = Rgb([20, 20, 20]);

/// Draws one polyline per channel, each normalized to the plot height.
pub fn plot(img: &RgbImage) -> RgbImage {
    let hist = histogram(img);
    let mut canvas = RgbImage::from_pixel(PLOT_WIDTH, PLOT_HEIGHT, BACKGROUND);
    let bin_step = (PLOT_WIDTH as f32 / BINS as f32).round();

    // Drawn blue, green, red so red ends up on top.
    let colors = [
        (2, Rgb([0, 0, 255])),
        (1, Rgb([0, 255, 0])),
        (0, Rgb([255, 0, 0])),
    ];
    for (channel, color) in colors {
        let heights = normalize(&hist.channels[channel], PLOT_HEIGHT as f32);
        for i in 1..BINS {
            draw_line_segment_mut(
                &mut canvas,
                (bin_step * (i - 1) as f32, PLOT_HEIGHT as f32 - heights[i - 1]),
                (bin_step * i as f32, PLOT_HEIGHT as f32 - heights[i]),
                color,
            );
        }
    }
    canvas
}

/// Min-max normalizes `bins` into `0..=height`.
fn normalize(bins: &[u32; BINS], height: f32) -> [f32; BINS] {
    let min = bins.iter().copied().min().unwrap_or(0) as f32;
    let max = bins.iter().copied().max().unwrap_or(0) as f32;
    let range = max - min;
    let mut out = [0.0; BINS];
    if range <= 0.0 {
        return out;
    }
    for (o, &b) in out.iter_mut().zip(bins.iter()) {
        *o = ((b as f32 - min) / range * height).round();
    }
    out
}

/// Equalizes the luma of `img` in YCrCb space, leaving chroma untouched.
pub fn equalize(img: &RgbImage) -> RgbImage {
    let (w, h) = img.dimensions();
    let mut chroma = Vec::with_capacity((w * h) as usize);
    let mut luma = GrayImage::new(w, h);
    for (x, y, px) in img.enumerate_pixels() {
        let (yv, cr, cb) = rgb_to_ycrcb(px.0);
        luma.put_pixel(x, y, Luma([yv]));
        chroma.push((cr, cb));
    }

    let luma = equalize_histogram(&luma);

    RgbImage::from_fn(w, h, |x, y| {
        let (cr, cb) = chroma[(y * w + x) as usize];
        Rgb(ycrcb_to_rgb(luma.get_pixel(x, y)[0], cr, cb))
    })
}

fn rgb_to_ycrcb(px: [u8; 3]) -> (u8, f32, f32) {
    let y = luma(px);
    let (r, b) = (px[0] as f32, px[2] as f32);
    let cr = (r - y) * 0.713 + 128.0;
    let cb = (b - y) * 0.564 + 128.0;
    (y.round().clamp(0.0, 255.0) as u8, cr, cb)
}

fn ycrcb_to_rgb(y: u8, cr: f32, cb: f32) -> [u8; 3] {
    let y = y as f32;
    let r = y + 1.403 * (cr - 128.0);
    let g = y - 0.714 * (cr - 128.0) - 0.344 * (cb - 128.0);
    let b = y + 1.773 * (cb - 128.0);
    [r, g, b].map(|v| v.round().clamp(0.0, 255.0) as u8)
}
