use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Parser;
use image::RgbImage;

#[path = "../controller.rs"]
mod controller;
#[path = "../loader.rs"]
mod loader;
#[path = "../processing/mod.rs"]
mod processing;
#[path = "../state.rs"]
mod state;

use controller::{Command, Controller, DisplaySink, Surface};
use processing::faces::{FaceDetectParams, HaarCascade};
use state::{EffectMode, Filter};

/// Times every controller command against one image.
#[derive(Debug, Parser)]
#[command(name = "render_probe")]
struct Args {
    image: PathBuf,
    /// Samples per command
    #[arg(short, long, default_value_t = 10)]
    count: usize,
    #[arg(long)]
    cascade: Option<PathBuf>,
}

#[derive(Default)]
struct CountingSink {
    frames: usize,
    pixels: u64,
}

impl DisplaySink for CountingSink {
    fn present(&mut self, _surface: Surface, frame: RgbImage) {
        self.frames += 1;
        self.pixels += u64::from(frame.width()) * u64::from(frame.height());
    }
}

fn median_ms(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) * 0.5
    } else {
        sorted[mid]
    }
}

fn probe_commands() -> Vec<(&'static str, Command)> {
    vec![
        ("grayscale", Command::SetColorMode(EffectMode::Grayscale)),
        ("hsv", Command::SetColorMode(EffectMode::Hsv)),
        ("hsl", Command::SetColorMode(EffectMode::Hsl)),
        ("sobel", Command::ToggleFilter(Filter::Sobel)),
        ("canny", Command::ToggleFilter(Filter::Canny)),
        ("laplacian", Command::ToggleFilter(Filter::Laplacian)),
        ("blur", Command::SetBlur(true)),
        ("contrast", Command::SetContrast(80)),
        ("brightness", Command::SetBrightness(20)),
        ("histogram", Command::ShowHistogram),
        ("equalize", Command::Equalize),
        ("lomography", Command::Lomography),
        ("cartoon", Command::Cartoon),
        ("sketch", Command::Sketch),
        ("detect_faces", Command::DetectFaces),
    ]
}

/// Dispatches `command` on a fresh controller per sample, so toggles always
/// time the filter switching on.
fn time_command(
    fresh: &dyn Fn() -> Controller,
    command: Command,
    count: usize,
    sink: &mut dyn DisplaySink,
) -> Vec<f64> {
    (0..count)
        .map(|_| {
            let mut controller = fresh();
            let t0 = Instant::now();
            controller.dispatch(command, sink);
            t0.elapsed().as_secs_f64() * 1000.0
        })
        .collect()
}

fn main() -> Result<()> {
    let args = Args::parse();
    let source = loader::load_source(&args.image)?;
    eprintln!(
        "Probing {} ({}x{}), {} samples per command",
        args.image.display(),
        source.width(),
        source.height(),
        args.count
    );

    let cascade = args.cascade.as_deref().map(HaarCascade::load).transpose()?;
    let fresh_controller = || {
        let controller = Controller::new(source.clone());
        match &cascade {
            Some(c) => controller.with_face_detection(c.clone(), FaceDetectParams::default()),
            None => controller,
        }
    };

    let mut sink = CountingSink::default();
    for (name, command) in probe_commands() {
        if command == Command::DetectFaces && cascade.is_none() {
            continue;
        }
        let samples = time_command(&fresh_controller, command, args.count, &mut sink);
        println!("METRIC {name}_ms_median={:.2}", median_ms(&samples));
    }

    println!("METRIC frames={}", sink.frames);
    println!("METRIC megapixels={:.1}", sink.pixels as f64 / 1e6);
    Ok(())
}
