mod app;
mod config;
mod controller;
mod loader;
mod processing;
mod state;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use app::PhotofxApp;
use config::AppConfig;
use controller::Controller;
use processing::faces::HaarCascade;

const CASCADE_ENV: &str = "PHOTOFX_CASCADE";

/// Interactive image effects viewer.
#[derive(Debug, Parser)]
#[command(name = "photofx", version, about)]
struct Cli {
    /// Image to open
    image: PathBuf,

    /// Haar cascade XML used by "Detect faces"
    #[arg(long, value_name = "XML")]
    cascade: Option<PathBuf>,
}

fn resolve_cascade_path(
    cli: Option<PathBuf>,
    env: Option<OsString>,
    config: Option<&Path>,
) -> Option<PathBuf> {
    cli.or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
        .or_else(|| config.map(Path::to_path_buf))
}

fn load_cascade(path: &Path) -> Option<HaarCascade> {
    match HaarCascade::load(path) {
        Ok(cascade) => {
            tracing::info!(path = %path.display(), stages = cascade.stage_count(), "loaded face cascade");
            Some(cascade)
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), "face detection disabled: {err:#}");
            None
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load();

    let source = match loader::load_source(&cli.image) {
        Ok(img) => img,
        Err(err) => {
            eprintln!("photofx: {err:#}");
            return ExitCode::from(1);
        }
    };

    let mut controller = Controller::new(source);
    let cascade_path = resolve_cascade_path(
        cli.cascade,
        std::env::var_os(CASCADE_ENV),
        config.cascade_path.as_deref(),
    );
    if let Some(cascade) = cascade_path.as_deref().and_then(load_cascade) {
        controller = controller.with_face_detection(cascade, config.face_detect);
    }

    let title = cli
        .image
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| cli.image.display().to_string());
    let width = config.window_width.unwrap_or(1200.0);
    let height = config.window_height.unwrap_or(800.0);

    let native_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(format!("photofx - {title}"))
            .with_app_id("photofx")
            .with_inner_size([width, height]),
        ..Default::default()
    };

    let result = eframe::run_native(
        "photofx",
        native_options,
        Box::new(|cc| Ok(Box::new(PhotofxApp::new(cc, controller, title, config)))),
    );
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("photofx: {err}");
            ExitCode::from(3)
        }
    }
}
