use image::RgbImage;

use crate::processing::faces::{self, FaceDetectParams, HaarCascade};
use crate::processing::{adjust, color, filters, histogram, stylize};
use crate::state::{EffectMode, EffectState, Filter};

/// Where a rendered frame is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    Main,
    Histogram,
}

/// Receives every frame the controller renders.
pub trait DisplaySink {
    fn present(&mut self, surface: Surface, frame: RgbImage);
}

/// One user action. Each dispatch presents exactly one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetColorMode(EffectMode),
    ToggleFilter(Filter),
    /// Blur is driven by a checkbox that reports its own state.
    SetBlur(bool),
    SetContrast(u8),
    SetBrightness(u8),
    ShowHistogram,
    Equalize,
    Lomography,
    Cartoon,
    Sketch,
    DetectFaces,
}

pub struct Controller {
    source: RgbImage,
    state: EffectState,
    cascade: Option<HaarCascade>,
    face_params: FaceDetectParams,
}

impl Controller {
    pub fn new(source: RgbImage) -> Self {
        Self {
            source,
            state: EffectState::default(),
            cascade: None,
            face_params: FaceDetectParams::default(),
        }
    }

    pub fn with_face_detection(mut self, cascade: HaarCascade, params: FaceDetectParams) -> Self {
        self.cascade = Some(cascade);
        self.face_params = params;
        self
    }

    pub fn state(&self) -> &EffectState {
        &self.state
    }

    pub fn source(&self) -> &RgbImage {
        &self.source
    }

    pub fn has_face_detection(&self) -> bool {
        self.cascade.is_some()
    }

    /// Shows the untouched source; used once at startup.
    pub fn present_source(&self, sink: &mut dyn DisplaySink) {
        sink.present(Surface::Main, self.source.clone());
    }

    pub fn dispatch(&mut self, command: Command, sink: &mut dyn DisplaySink) {
        tracing::debug!(?command, "dispatch");
        let (surface, frame) = match command {
            Command::SetColorMode(mode) => {
                self.state.mode = mode;
                (Surface::Main, self.render_color_mode())
            }
            Command::ToggleFilter(filter) => {
                self.state.filters.toggle(filter);
                (Surface::Main, self.render_filters())
            }
            Command::SetBlur(on) => {
                self.state.filters.set(Filter::Blur, on);
                (Surface::Main, self.render_filters())
            }
            Command::SetContrast(raw) => {
                self.state.adjust.set_contrast_slider(raw);
                (Surface::Main, self.adjust())
            }
            Command::SetBrightness(raw) => {
                self.state.adjust.set_brightness_slider(raw);
                (Surface::Main, self.adjust())
            }
            Command::ShowHistogram => (Surface::Histogram, histogram::plot(&self.source)),
            Command::Equalize => (Surface::Main, histogram::equalize(&self.source)),
            Command::Lomography => (Surface::Main, stylize::lomography(&self.source)),
            Command::Cartoon => (Surface::Main, stylize::cartoon(&self.source)),
            Command::Sketch => (Surface::Main, stylize::sketch(&self.source)),
            Command::DetectFaces => (Surface::Main, self.detect_faces()),
        };
        sink.present(surface, frame);
    }

    /// Colour-mode path: the source seen through the current [`EffectMode`].
    pub fn render_color_mode(&self) -> RgbImage {
        color::apply(&self.source, self.state.mode)
    }

    /// Filter path: the source run through every active stage in order.
    pub fn render_filters(&self) -> RgbImage {
        filters::apply(&self.source, &self.state.filters)
    }

    /// Contrast/brightness over the source, independent of mode and filters.
    pub fn adjust(&self) -> RgbImage {
        adjust::apply(&self.source, &self.state.adjust)
    }

    fn detect_faces(&self) -> RgbImage {
        let Some(cascade) = self.cascade.as_ref() else {
            tracing::warn!("face detection requested but no cascade is loaded");
            return self.source.clone();
        };
        let found = faces::detect_faces(&self.source, cascade, &self.face_params);
        tracing::info!(faces = found.len(), "face detection finished");
        faces::draw_faces(&self.source, &found)
    }
}

#[cfg(test)]
mod tests {
    use image::{ImageBuffer, Rgb, RgbImage};

    use crate::processing::histogram::{PLOT_HEIGHT, PLOT_WIDTH};
    use crate::state::{EffectMode, Filter};

    use super::{Command, Controller, DisplaySink, Surface};

    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<(Surface, RgbImage)>,
    }

    impl DisplaySink for RecordingSink {
        fn present(&mut self, surface: Surface, frame: RgbImage) {
            self.frames.push((surface, frame));
        }
    }

    impl RecordingSink {
        fn last(&self) -> &RgbImage {
            &self.frames.last().expect("a frame should have been presented").1
        }
    }

    fn run(source: &RgbImage, commands: &[Command]) -> RgbImage {
        let mut controller = Controller::new(source.clone());
        let mut sink = RecordingSink::default();
        for &cmd in commands {
            controller.dispatch(cmd, &mut sink);
        }
        sink.last().clone()
    }

    fn constant_gray(v: u8) -> RgbImage {
        ImageBuffer::from_pixel(100, 100, Rgb([v, v, v]))
    }

    fn ramp() -> RgbImage {
        ImageBuffer::from_fn(256, 3, |x, y| {
            let v = x as u8;
            Rgb([v, v.wrapping_add(y as u8 * 40), 255 - v])
        })
    }

    fn step_edge() -> RgbImage {
        ImageBuffer::from_fn(20, 20, |x, _y| {
            if x < 10 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    fn white_square() -> RgbImage {
        ImageBuffer::from_fn(20, 20, |x, y| {
            if (8..12).contains(&x) && (8..12).contains(&y) {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        })
    }

    /// Sum of absolute differences between horizontal neighbours.
    fn total_variation(img: &RgbImage) -> u64 {
        let mut tv = 0u64;
        for y in 0..img.height() {
            for x in 1..img.width() {
                let a = img.get_pixel(x - 1, y);
                let b = img.get_pixel(x, y);
                for c in 0..3 {
                    tv += (a[c] as i64 - b[c] as i64).unsigned_abs();
                }
            }
        }
        tv
    }

    fn assert_close(actual: &RgbImage, expected: impl Fn(u8) -> f32, source: &RgbImage) {
        for (out, src) in actual.pixels().zip(source.pixels()) {
            for c in 0..3 {
                let want = expected(src[c]).clamp(0.0, 255.0);
                assert!(
                    (out[c] as f32 - want).abs() <= 1.0,
                    "got {} want {} for source {}",
                    out[c],
                    want,
                    src[c]
                );
            }
        }
    }

    #[test]
    fn every_command_presents_exactly_one_frame() {
        let commands = [
            Command::SetColorMode(EffectMode::Hsv),
            Command::ToggleFilter(Filter::Sobel),
            Command::SetBlur(true),
            Command::SetContrast(70),
            Command::SetBrightness(10),
            Command::ShowHistogram,
            Command::Equalize,
            Command::Lomography,
            Command::Cartoon,
            Command::Sketch,
            Command::DetectFaces,
        ];
        let mut controller = Controller::new(step_edge());
        let mut sink = RecordingSink::default();
        for (i, &cmd) in commands.iter().enumerate() {
            controller.dispatch(cmd, &mut sink);
            assert_eq!(sink.frames.len(), i + 1, "{:?}", cmd);
        }
    }

    #[test]
    fn contrast_slider_scales_normalized_intensities() {
        let source = ramp();
        for v in [0u8, 10, 25, 50, 60, 75, 100] {
            let out = run(&source, &[Command::SetContrast(v)]);
            assert_close(&out, |s| s as f32 * v as f32 / 50.0, &source);
        }
    }

    #[test]
    fn contrast_fifty_is_identity() {
        let source = ramp();
        assert_eq!(run(&source, &[Command::SetContrast(50)]), source);
    }

    #[test]
    fn brightness_slider_adds_normalized_offset() {
        let source = ramp();
        for v in [0u8, 20, 50, 100] {
            let out = run(&source, &[Command::SetBrightness(v)]);
            assert_close(&out, |s| s as f32 + v as f32 / 200.0 * 255.0, &source);
        }
        assert_eq!(run(&source, &[Command::SetBrightness(0)]), source);
    }

    #[test]
    fn adjust_reads_the_source_not_the_filtered_frame() {
        let source = step_edge();
        let after_sobel = run(
            &source,
            &[Command::ToggleFilter(Filter::Sobel), Command::SetContrast(60)],
        );
        let alone = run(&source, &[Command::SetContrast(60)]);
        assert_eq!(after_sobel, alone);
    }

    #[test]
    fn blur_runs_after_sobel() {
        let source = white_square();
        let sobel_only = run(&source, &[Command::ToggleFilter(Filter::Sobel)]);
        let sobel_blur = run(
            &source,
            &[Command::ToggleFilter(Filter::Sobel), Command::SetBlur(true)],
        );
        assert!(total_variation(&sobel_blur) < total_variation(&sobel_only));
        // The corner response at (7, 7) spreads two pixels out once blurred.
        assert_eq!(sobel_only.get_pixel(5, 5)[0], 0);
        assert!(sobel_blur.get_pixel(5, 5)[0] > 0);
    }

    #[test]
    fn color_mode_is_idempotent_and_exclusive() {
        let source = ramp();
        let once = run(&source, &[Command::SetColorMode(EffectMode::Hsv)]);
        let twice = run(
            &source,
            &[
                Command::SetColorMode(EffectMode::Hsv),
                Command::SetColorMode(EffectMode::Hsv),
            ],
        );
        assert_eq!(once, twice);

        let replaced = run(
            &source,
            &[
                Command::SetColorMode(EffectMode::Hsv),
                Command::SetColorMode(EffectMode::Grayscale),
            ],
        );
        let gray_only = run(&source, &[Command::SetColorMode(EffectMode::Grayscale)]);
        assert_eq!(replaced, gray_only);
    }

    #[test]
    fn filter_toggle_does_not_keep_color_mode() {
        let source = ramp();
        let out = run(
            &source,
            &[
                Command::SetColorMode(EffectMode::Grayscale),
                Command::ToggleFilter(Filter::Canny),
                Command::ToggleFilter(Filter::Canny),
            ],
        );
        assert_eq!(out, source);
    }

    #[test]
    fn constant_gray_scenario() {
        let source = constant_gray(128);
        let identity = run(
            &source,
            &[Command::SetContrast(50), Command::SetBrightness(0)],
        );
        assert!(identity.pixels().all(|p| p.0 == [128, 128, 128]));

        let doubled = run(&source, &[Command::SetContrast(100)]);
        assert!(doubled.pixels().all(|p| p.0 == [255, 255, 255]));
    }

    #[test]
    fn toggling_canny_twice_restores_the_previous_render() {
        let source = step_edge();
        let mut controller = Controller::new(source.clone());
        let mut sink = RecordingSink::default();
        controller.present_source(&mut sink);
        let before = sink.last().clone();

        controller.dispatch(Command::ToggleFilter(Filter::Canny), &mut sink);
        assert!(controller.state().filters.canny);
        assert_ne!(sink.last(), &before);

        controller.dispatch(Command::ToggleFilter(Filter::Canny), &mut sink);
        assert!(!controller.state().filters.canny);
        assert_eq!(sink.last(), &before);
    }

    #[test]
    fn blur_checkbox_sets_rather_than_flips() {
        let mut controller = Controller::new(step_edge());
        let mut sink = RecordingSink::default();
        controller.dispatch(Command::SetBlur(true), &mut sink);
        controller.dispatch(Command::SetBlur(true), &mut sink);
        assert!(controller.state().filters.blur);
        controller.dispatch(Command::SetBlur(false), &mut sink);
        assert!(!controller.state().filters.blur);
    }

    #[test]
    fn histogram_goes_to_its_own_surface() {
        let mut controller = Controller::new(ramp());
        let mut sink = RecordingSink::default();
        controller.dispatch(Command::ShowHistogram, &mut sink);
        let (surface, frame) = &sink.frames[0];
        assert_eq!(*surface, Surface::Histogram);
        assert_eq!(frame.dimensions(), (PLOT_WIDTH, PLOT_HEIGHT));
    }

    #[test]
    fn push_button_effects_leave_flags_alone() {
        let mut controller = Controller::new(step_edge());
        let mut sink = RecordingSink::default();
        controller.dispatch(Command::ToggleFilter(Filter::Laplacian), &mut sink);
        let before = *controller.state();
        for cmd in [Command::Equalize, Command::Lomography, Command::Sketch] {
            controller.dispatch(cmd, &mut sink);
        }
        assert_eq!(*controller.state(), before);
    }

    #[test]
    fn face_detection_without_cascade_shows_the_source() {
        let source = step_edge();
        assert_eq!(run(&source, &[Command::DetectFaces]), source);
    }
}
