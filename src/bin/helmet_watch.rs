//! helmet_watch - helmet detection playback
//!
//! This binary:
//! 1. Loads configuration (file, environment, then flags)
//! 2. Builds the detector backend and resolves the class label table
//! 3. Opens the camera or video given on the command line
//! 4. Runs the playback loop, reading key commands from stdin

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;

use helmet_watch::{
    config::AppConfig, select_backend, ClassLabelMap, Command, Controller, DeviceOpener,
    DisplaySink, EventLoop, HeadlessDisplay, LabelTable, SnapshotDisplay,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Helmet / no-helmet detection playback")]
struct Args {
    /// Config file (JSON, or TOML with a .toml extension).
    #[arg(long, env = "HELMET_WATCH_CONFIG")]
    config: Option<PathBuf>,
    /// Start the camera with this index (default: the configured index).
    #[arg(long, num_args = 0..=1)]
    camera: Option<Option<u32>>,
    /// Play this video file, image directory or stub:// clip.
    #[arg(long, conflicts_with = "camera")]
    video: Option<PathBuf>,
    /// Class labels, e.g. "0=No Helmet,1=Helmet".
    #[arg(long)]
    labels: Option<String>,
    /// Write every Nth displayed frame as PNG into this directory.
    #[arg(long)]
    snapshots: Option<PathBuf>,
    /// Exit once playback stops or the video ends.
    #[arg(long)]
    exit_on_end: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config_path = args.config.as_deref().filter(|p| !p.as_os_str().is_empty());
    let mut cfg = AppConfig::load_with(config_path)?;
    if let Some(labels) = &args.labels {
        cfg.labels = Some(ClassLabelMap::parse(labels).context("--labels")?);
    }
    if let Some(dir) = &args.snapshots {
        cfg.display.snapshot_dir = Some(dir.clone());
    }

    let detector = select_backend(&cfg.detector)?;
    let labels = LabelTable::for_run(cfg.labels.clone(), detector.class_names().cloned())?;
    let display: Box<dyn DisplaySink> = match &cfg.display.snapshot_dir {
        Some(dir) => Box::new(SnapshotDisplay::new(
            dir,
            cfg.display.snapshot_every,
            cfg.display.viewport,
        )?),
        None => Box::new(HeadlessDisplay::new(cfg.display.viewport)),
    };
    let opener = DeviceOpener::new(cfg.camera.clone(), cfg.file.clone());
    let controller = Controller::new(
        Box::new(opener),
        detector,
        display,
        labels,
        cfg.playback.clone(),
    );
    log::info!(
        "helmet_watch running with the {} detector",
        controller.detector_name()
    );

    let (tx, rx) = mpsc::channel();
    let quit_tx = tx.clone();
    ctrlc::set_handler(move || {
        let _ = quit_tx.send(Command::Quit);
    })
    .map_err(|e| anyhow!("failed to install ctrl-c handler: {}", e))?;

    if let Some(path) = args.video {
        tx.send(Command::StartFile(Some(path)))?;
    } else if let Some(index) = args.camera {
        tx.send(Command::StartCamera(index.unwrap_or(cfg.camera.index)))?;
    }

    // Stdin only forwards commands; the controller stays on this thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match Command::parse(&line) {
                Some(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                None => log::warn!("unknown command '{}'", line.trim()),
            }
        }
    });

    let mut host = EventLoop::new(controller, rx).exit_when_idle(args.exit_on_end);
    host.run()?;

    let stats = host.controller().stats().clone();
    log::info!(
        "helmet_watch done: frames={}, detections={}, detector failures={}, camera retries={}",
        stats.frames_processed,
        stats.detections_drawn,
        stats.detector_failures,
        stats.camera_retries
    );
    Ok(())
}
