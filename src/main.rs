//! rearview - rear-view camera live preview with interactive calibration
//!
//! Captures frames from a V4L2 camera, applies a zoom crop and a four-point
//! keystone correction, and shows the corrected feed in a window. With
//! `--calib`, two extra windows expose the zoom region selector (right-button
//! drag) and the keystone corner handles (left-button drag); the calibration
//! is persisted beside the executable on exit.

mod app;
mod capture;
mod config;
mod display;
mod interact;
mod overlay;
mod pipeline;
mod transform;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Rear-view camera preview and calibration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable calibration mode (overlay windows + pointer handlers)
    #[arg(long)]
    calib: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("rearview v{}", env!("CARGO_PKG_VERSION"));

    app::run(args.calib)
}
