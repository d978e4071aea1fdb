//! snapplate - live plate scanning preview

use anyhow::{Context, Result};
use clap::Parser;

use snapplate::config::{AppConfig, APP_NAME, DEFAULT_MODEL_PATH};
use snapplate::display::{DisplaySurface, InfoPanel};
use snapplate::ui::Ui;
use snapplate::{load_annotator, CameraSource, FixedRateRunner, LoopDriver, Session};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Detector model (ONNX file, or stub://<name> for the built-in plate finder).
    #[arg(default_value = DEFAULT_MODEL_PATH)]
    model: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = AppConfig::from_model_path(args.model)?;
    let ui = Ui::detect();
    let panel = InfoPanel::default();
    log::info!("{}", panel.title_line(APP_NAME));

    let annotator = ui
        .run("load model", || load_annotator(&config.model_path))
        .with_context(|| format!("failed to load model {}", config.model_path))?;

    let mut session = Session::new(annotator);
    ui.run("open camera", || {
        session.start(|| CameraSource::open(config.camera.clone()))
    })
    .with_context(|| format!("failed to open camera {}", config.camera.device))?;

    let display = open_display(&config, &panel)?;
    let runner = FixedRateRunner::new(config.tick_rate_hz)?;
    let mut driver = LoopDriver::new(session, display, runner);

    let stop = driver.stop_handle();
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received");
        stop.stop();
    })
    .context("error setting Ctrl-C handler")?;

    let report = driver.run()?;
    log::info!(
        "final report: {}",
        serde_json::to_string(&report).context("serialize report")?
    );
    Ok(())
}

#[cfg(feature = "display-minifb")]
fn open_display(config: &AppConfig, panel: &InfoPanel) -> Result<Box<dyn DisplaySurface>> {
    let window = snapplate::display::WindowDisplay::open(
        APP_NAME,
        panel,
        config.camera.width as usize,
        config.camera.height as usize,
    )?;
    Ok(Box::new(window))
}

#[cfg(not(feature = "display-minifb"))]
fn open_display(_config: &AppConfig, _panel: &InfoPanel) -> Result<Box<dyn DisplaySurface>> {
    log::info!("no window support compiled in (display-minifb); running headless");
    Ok(Box::new(snapplate::HeadlessDisplay::new()))
}
