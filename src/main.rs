use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use stemroll::audio::{AudioOutput, CpalOutput};
use stemroll::{StemrollApp, ViewerConfig, ViewerSession};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Piano-roll viewer that plays a transcribed melody over its stems
#[derive(Parser, Debug)]
#[command(name = "stemroll", version, about, long_about = None)]
struct Args {
    /// Song bundle manifest to open on start
    #[arg(value_name = "BUNDLE")]
    bundle: Option<PathBuf>,

    /// Viewer configuration (RON)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Reload the bundle whenever its files change
    #[arg(short, long)]
    watch: bool,

    /// Play nothing; useful on machines without an output device
    #[arg(long)]
    no_audio: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match ViewerConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                error!(%err, "failed to load config");
                return ExitCode::FAILURE;
            }
        },
        None => ViewerConfig::default(),
    };
    config.hot_reload |= args.watch;

    let mut session = if args.no_audio {
        ViewerSession::headless(config)
    } else {
        let instrument = config.instrument.clone();
        ViewerSession::new(
            config,
            Box::new(move || {
                CpalOutput::open(instrument.clone())
                    .map(|output| Box::new(output) as Box<dyn AudioOutput>)
            }),
        )
    };

    if let Some(bundle) = &args.bundle {
        if let Err(err) = session.open(bundle) {
            error!(%err, "failed to open bundle");
        }
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_title("Stemroll"),
        ..Default::default()
    };

    match eframe::run_native(
        "Stemroll",
        options,
        Box::new(|_cc| Ok(Box::new(StemrollApp::new(session)))),
    ) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "viewer exited with an error");
            ExitCode::FAILURE
        }
    }
}
