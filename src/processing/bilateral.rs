//! Edge-preserving smoothing weighted by both spatial and colour distance.

use image::RgbImage;
use rayon::prelude::*;

#[derive(Debug, Clone, Copy)]
pub struct BilateralParams {
    /// Neighbourhood diameter in pixels.
    pub diameter: u32,
    pub sigma_color: f32,
    pub sigma_space: f32,
}

impl Default for BilateralParams {
    fn default() -> Self {
        Self {
            diameter: 9,
            sigma_color: 150.0,
            sigma_space: 150.0,
        }
    }
}

pub fn bilateral_filter(img: &RgbImage, params: BilateralParams) -> RgbImage {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return img.clone();
    }

    let radius = (params.diameter / 2).max(1) as i32;
    let space_coeff = -0.5 / (params.sigma_space * params.sigma_space);
    let color_coeff = -0.5 / (params.sigma_color * params.sigma_color);

    // Circular neighbourhood with precomputed spatial weights.
    let offsets: Vec<(i32, i32, f32)> = (-radius..=radius)
        .flat_map(|dy| (-radius..=radius).map(move |dx| (dx, dy)))
        .filter(|&(dx, dy)| dx * dx + dy * dy <= radius * radius)
        .map(|(dx, dy)| (dx, dy, ((dx * dx + dy * dy) as f32 * space_coeff).exp()))
        .collect();

    let src = img.as_raw();
    let stride = width as usize * 3;
    let mut out = vec![0u8; src.len()];

    out.par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as usize {
                let center = y * stride + x * 3;
                let c = [
                    src[center] as f32,
                    src[center + 1] as f32,
                    src[center + 2] as f32,
                ];

                let mut sum = [0.0f32; 3];
                let mut weight_sum = 0.0f32;
                for &(dx, dy, space_weight) in &offsets {
                    let nx = (x as i32 + dx).clamp(0, width as i32 - 1) as usize;
                    let ny = (y as i32 + dy).clamp(0, height as i32 - 1) as usize;
                    let n = ny * stride + nx * 3;
                    let p = [src[n] as f32, src[n + 1] as f32, src[n + 2] as f32];

                    let color_dist = (p[0] - c[0]).abs() + (p[1] - c[1]).abs() + (p[2] - c[2]).abs();
                    let weight = space_weight * (color_dist * color_dist * color_coeff).exp();
                    for k in 0..3 {
                        sum[k] += p[k] * weight;
                    }
                    weight_sum += weight;
                }

                let o = x * 3;
                for k in 0..3 {
                    row[o + k] = (sum[k] / weight_sum).round().clamp(0.0, 255.0) as u8;
                }
            }
        });

    RgbImage::from_raw(width, height, out).unwrap_or_else(|| img.clone())
}
