use std::path::Path;

use anyhow::Context;
use image::{DynamicImage, RgbImage};

static RAW_EXTS: &[&str] = &["raf", "dng", "nef", "cr2", "arw"];

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    let Some(ext) = path.extension().map(|e| e.to_string_lossy()) else {
        return false;
    };
    exts.iter().any(|known| ext.eq_ignore_ascii_case(known))
}

pub fn is_raw_image(path: &Path) -> bool {
    has_extension(path, RAW_EXTS)
}

/// Loads the source image as 8-bit RGB, dropping any alpha channel.
pub fn load_source(path: &Path) -> anyhow::Result<RgbImage> {
    let img = open_image(path)
        .with_context(|| format!("could not load image {}", path.display()))?;
    tracing::info!(
        path = %path.display(),
        width = img.width(),
        height = img.height(),
        "loaded source image"
    );
    Ok(img.to_rgb8())
}

/// Open an image, falling back to raw decoding for RAW extensions.
pub fn open_image(path: &Path) -> anyhow::Result<DynamicImage> {
    open_image_with_hooks(path, |p| Ok(image::open(p)?), develop_raw)
}

fn open_image_with_hooks<FStd, FRaw>(
    path: &Path,
    open_standard: FStd,
    open_raw: FRaw,
) -> anyhow::Result<DynamicImage>
where
    FStd: Fn(&Path) -> anyhow::Result<DynamicImage>,
    FRaw: Fn(&Path) -> anyhow::Result<DynamicImage>,
{
    // Fast path: try the standard image crate first.
    let err = match open_standard(path) {
        Ok(img) => return Ok(img),
        Err(err) => err,
    };

    if !is_raw_image(path) {
        return Err(err);
    }

    tracing::debug!(path = %path.display(), "standard decode failed, trying raw develop");
    open_raw(path)
}

fn develop_raw(path: &Path) -> anyhow::Result<DynamicImage> {
    let raw = rawler::decode_file(path)?;
    let develop = rawler::imgop::develop::RawDevelop::default();
    let intermediate = develop.develop_intermediate(&raw)?;
    intermediate
        .to_dynamic_image()
        .ok_or_else(|| anyhow::anyhow!("raw develop produced invalid image"))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::path::{Path, PathBuf};

    use image::{DynamicImage, ImageBuffer, Rgba};

    use super::{is_raw_image, load_source, open_image_with_hooks};

    fn img(px: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(ImageBuffer::from_pixel(1, 1, Rgba(px)))
    }

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("photofx-loader-{}-{}", std::process::id(), name))
    }

    #[test]
    fn raw_extension_falls_back_to_develop() {
        let raw_calls = Cell::new(0);
        let out = open_image_with_hooks(
            Path::new("/tmp/test.raf"),
            |_: &Path| anyhow::bail!("unsupported format"),
            |_: &Path| {
                raw_calls.set(raw_calls.get() + 1);
                Ok(img([9, 9, 9, 255]))
            },
        )
        .expect("raw develop should succeed");

        assert_eq!(raw_calls.get(), 1);
        assert_eq!(out.to_rgba8().get_pixel(0, 0).0, [9, 9, 9, 255]);
    }

    #[test]
    fn standard_decode_skips_raw_develop() {
        let raw_calls = Cell::new(0);
        let out = open_image_with_hooks(
            Path::new("/tmp/test.dng"),
            |_: &Path| Ok(img([1, 2, 3, 255])),
            |_: &Path| {
                raw_calls.set(raw_calls.get() + 1);
                Ok(img([9, 9, 9, 255]))
            },
        )
        .expect("standard decode should succeed");

        assert_eq!(raw_calls.get(), 0);
        assert_eq!(out.to_rgba8().get_pixel(0, 0).0, [1, 2, 3, 255]);
    }

    #[test]
    fn non_raw_failure_keeps_the_original_error() {
        let raw_calls = Cell::new(0);
        let err = open_image_with_hooks(
            Path::new("/tmp/test.jpg"),
            |_: &Path| anyhow::bail!("bad jpeg"),
            |_: &Path| {
                raw_calls.set(raw_calls.get() + 1);
                Ok(img([9, 9, 9, 255]))
            },
        )
        .expect_err("jpeg failure should surface");

        assert_eq!(raw_calls.get(), 0);
        assert!(err.to_string().contains("bad jpeg"));
    }

    #[test]
    fn raw_extension_detection_is_case_insensitive() {
        assert!(is_raw_image(Path::new("/tmp/a.raf")));
        assert!(is_raw_image(Path::new("/tmp/a.NEF")));
        assert!(!is_raw_image(Path::new("/tmp/a.jpg")));
        assert!(!is_raw_image(Path::new("/tmp/noext")));
    }

    #[test]
    fn load_source_drops_alpha() {
        let path = scratch_path("alpha.png");
        img([10, 20, 30, 40]).save(&path).expect("fixture should save");
        let rgb = load_source(&path).expect("png should load");
        let _ = std::fs::remove_file(&path);
        assert_eq!(rgb.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn load_source_reports_missing_files() {
        let err = load_source(&scratch_path("missing.png")).expect_err("missing file");
        assert!(err.to_string().contains("could not load image"));
    }
}
