use image::RgbImage;

use crate::config::AppConfig;
use crate::controller::{Command, Controller, DisplaySink, Surface};
use crate::state::{EffectMode, Filter, SLIDER_DEFAULT, SLIDER_MAX};

const CONTROLS_WIDTH: f32 = 240.0;

/// Frames presented since the last paint, one slot per surface.
#[derive(Default)]
struct PendingFrames {
    main: Option<RgbImage>,
    histogram: Option<RgbImage>,
}

impl DisplaySink for PendingFrames {
    fn present(&mut self, surface: Surface, frame: RgbImage) {
        match surface {
            Surface::Main => self.main = Some(frame),
            Surface::Histogram => self.histogram = Some(frame),
        }
    }
}

/// Widget-side mirror of the controls; the controller owns the real state.
struct Controls {
    mode: EffectMode,
    blur: bool,
    contrast: u8,
    brightness: u8,
}

impl Default for Controls {
    fn default() -> Self {
        Self {
            mode: EffectMode::Original,
            blur: false,
            contrast: SLIDER_DEFAULT,
            brightness: SLIDER_DEFAULT,
        }
    }
}

pub struct PhotofxApp {
    controller: Controller,
    pending: PendingFrames,
    controls: Controls,
    title: String,
    main_texture: Option<egui::TextureHandle>,
    histogram_texture: Option<egui::TextureHandle>,
    show_histogram: bool,
    config: AppConfig,
}

impl PhotofxApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, controller: Controller, title: String, config: AppConfig) -> Self {
        let mut pending = PendingFrames::default();
        controller.present_source(&mut pending);
        Self {
            controller,
            pending,
            controls: Controls::default(),
            title,
            main_texture: None,
            histogram_texture: None,
            show_histogram: false,
            config,
        }
    }

    fn send(&mut self, command: Command) {
        self.controller.dispatch(command, &mut self.pending);
    }

    fn upload_frames(&mut self, ctx: &egui::Context) {
        if let Some(frame) = self.pending.main.take() {
            self.main_texture = Some(load_texture(ctx, "main_view", &frame));
        }
        if let Some(frame) = self.pending.histogram.take() {
            self.histogram_texture = Some(load_texture(ctx, "histogram_view", &frame));
            self.show_histogram = true;
        }
    }

    fn show_controls(&mut self, ui: &mut egui::Ui) {
        let mut commands = Vec::new();

        ui.label(egui::RichText::new("Colour").strong());
        for mode in EffectMode::ALL {
            if ui
                .radio_value(&mut self.controls.mode, mode, mode.label())
                .clicked()
            {
                commands.push(Command::SetColorMode(mode));
            }
        }

        ui.separator();
        ui.label(egui::RichText::new("Effects").strong());
        ui.horizontal_wrapped(|ui| {
            let buttons = [
                ("Histogram", Command::ShowHistogram),
                ("Equalize", Command::Equalize),
                ("Lomography", Command::Lomography),
                ("Cartoon", Command::Cartoon),
                ("Sketch", Command::Sketch),
            ];
            for (label, command) in buttons {
                if ui.button(label).clicked() {
                    commands.push(command);
                }
            }
            let faces = ui
                .add_enabled(self.controller.has_face_detection(), egui::Button::new("Detect faces"))
                .on_disabled_hover_text("No Haar cascade configured");
            if faces.clicked() {
                commands.push(Command::DetectFaces);
            }
        });

        ui.separator();
        ui.label(egui::RichText::new("Filters").strong());
        let filters = self.controller.state().filters;
        ui.horizontal(|ui| {
            for filter in [Filter::Sobel, Filter::Canny, Filter::Laplacian] {
                if ui
                    .selectable_label(filters.is_active(filter), filter.label())
                    .clicked()
                {
                    commands.push(Command::ToggleFilter(filter));
                }
            }
        });
        if ui
            .checkbox(&mut self.controls.blur, Filter::Blur.label())
            .changed()
        {
            commands.push(Command::SetBlur(self.controls.blur));
        }

        ui.separator();
        ui.label(egui::RichText::new("Adjust").strong());
        ui.horizontal(|ui| {
            ui.label("Contrast");
            let resp = ui.add(
                egui::Slider::new(&mut self.controls.contrast, 0..=SLIDER_MAX)
                    .clamping(egui::SliderClamping::Always),
            );
            if resp.changed() {
                commands.push(Command::SetContrast(self.controls.contrast));
            }
        });
        ui.horizontal(|ui| {
            ui.label("Brightness");
            let resp = ui.add(
                egui::Slider::new(&mut self.controls.brightness, 0..=SLIDER_MAX)
                    .clamping(egui::SliderClamping::Always),
            );
            if resp.changed() {
                commands.push(Command::SetBrightness(self.controls.brightness));
            }
        });

        for command in commands {
            self.send(command);
        }
    }
}

fn load_texture(ctx: &egui::Context, name: &str, frame: &RgbImage) -> egui::TextureHandle {
    let size = [frame.width() as usize, frame.height() as usize];
    let img = egui::ColorImage::from_rgb(size, frame.as_raw());
    ctx.load_texture(name, img, egui::TextureOptions::LINEAR)
}

/// Paints `tex` scaled to fit the available space, preserving aspect ratio.
fn paint_fitted(ui: &mut egui::Ui, tex: &egui::TextureHandle) {
    let avail = ui.available_size();
    let tex_size = tex.size_vec2();
    let scale = (avail.x / tex_size.x).min(avail.y / tex_size.y).min(1.0);
    let (rect, _) = ui.allocate_exact_size(tex_size * scale, egui::Sense::hover());
    ui.painter().image(
        tex.id(),
        rect,
        egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
        egui::Color32::WHITE,
    );
}

impl eframe::App for PhotofxApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Track window size for saving on exit
        if let Some(rect) = ctx.input(|i| i.viewport().inner_rect) {
            self.config.window_width = Some(rect.width());
            self.config.window_height = Some(rect.height());
        }

        egui::SidePanel::left("controls_panel")
            .resizable(false)
            .exact_width(CONTROLS_WIDTH)
            .show(ctx, |ui| {
                ui.label(egui::RichText::new(&self.title).strong().size(13.0));
                let (w, h) = self.controller.source().dimensions();
                ui.weak(format!("{w} x {h}"));
                ui.separator();
                self.show_controls(ui);
            });

        // Commands issued this frame are visible without waiting for input.
        self.upload_frames(ctx);

        egui::CentralPanel::default().show(ctx, |ui| match self.main_texture {
            Some(ref tex) => {
                ui.centered_and_justified(|ui| paint_fitted(ui, tex));
            }
            None => {
                ui.centered_and_justified(|ui| ui.spinner());
            }
        });

        if let Some(ref tex) = self.histogram_texture {
            egui::Window::new("Histogram")
                .open(&mut self.show_histogram)
                .resizable(false)
                .default_pos([CONTROLS_WIDTH + 40.0, 60.0])
                .show(ctx, |ui| {
                    ui.image((tex.id(), tex.size_vec2()));
                });
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.config.save();
    }
}
