//! Anilay overlay application
//!
//! Listens to the microphone and shows the skin image matching the current
//! loudness in an always-on-top window.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use anilay::{
    audio::list_input_devices,
    config::AppConfig,
    session::{resolve_skin_dir, Session},
    shutdown,
    ui::{native_options, OverlayApp},
};
use eframe::egui;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "anilay")]
#[command(about = "Overlay that swaps images based on microphone loudness")]
struct Args {
    /// Skin directory (must end in .al); defaults to the per-user skin
    #[arg(long)]
    skin: Option<PathBuf>,

    /// Print available input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Allow dragging the overlay with the mouse
    #[arg(long)]
    draggable: bool,

    /// Let clicks pass through the overlay (true/false)
    #[arg(long, action = clap::ArgAction::Set)]
    click_through: Option<bool>,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    if args.list_devices {
        println!("\n=== Available Input Devices ===");
        for device in list_input_devices() {
            let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
            println!("  {}: {}{}", device.index, device.name, default_marker);
            println!("    Sample rates: {:?}", device.sample_rates);
            println!("    Channels: {:?}", device.channels);
        }
        println!();
        return Ok(());
    }

    let skin_dir = resolve_skin_dir(args.skin).context("resolving skin directory")?;

    let mut config = AppConfig::load(&skin_dir)?;
    if args.draggable {
        config.window.draggable = true;
    }
    if let Some(click_through) = args.click_through {
        config.window.click_through = click_through;
    }

    tracing::info!("Starting Anilay with skin {}", config.skin_dir.display());

    let options = native_options(&config.window);
    let session = Session::start(config).context("starting audio monitor")?;

    eframe::run_native(
        "Anilay",
        options,
        Box::new(move |cc| {
            let ctx = cc.egui_ctx.clone();
            if let Err(e) = shutdown::spawn_signal_watcher(move || {
                ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                ctx.request_repaint();
            }) {
                tracing::warn!("Could not install signal handlers: {}", e);
            }

            Ok(Box::new(OverlayApp::new(&cc.egui_ctx, session)))
        }),
    )
    .map_err(|e| anyhow::anyhow!("Overlay window failed: {}", e))?;

    tracing::info!("Anilay stopped");
    Ok(())
}
