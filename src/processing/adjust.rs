use image::RgbImage;

use crate::state::AdjustmentParams;

/// Applies `v * contrast + brightness` to every normalized channel value.
pub fn apply(img: &RgbImage, params: &AdjustmentParams) -> RgbImage {
    let gain = params.contrast;
    let offset = params.brightness;

    let mut out = img.clone();
    for px in out.pixels_mut() {
        for c in 0..3 {
            let v = px[c] as f32 / 255.0;
            px[c] = ((v * gain + offset).clamp(0.0, 1.0) * 255.0).round() as u8;
        }
    }
    out
}
