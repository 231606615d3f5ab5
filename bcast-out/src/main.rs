//! Broadcast output (bcast-out) - Main entry point
//!
//! Plays a colour bars and tone pattern through the virtual output device for
//! a fixed time, then prints the output statistics as JSON.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bcast_common::{OutputConfig, OutputEvent};
use bcast_out::device::{CompletionMode, VirtualDevice, VirtualDriver};
use bcast_out::pattern::PatternSource;
use bcast_out::Output;
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for bcast-out
#[derive(Parser, Debug)]
#[command(name = "bcast-out")]
#[command(about = "Broadcast output scheduler")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "BCAST_OUT_CONFIG")]
    config: Option<PathBuf>,

    /// Output card index
    #[arg(long, env = "BCAST_OUT_CARD")]
    card: Option<u32>,

    /// Frames scheduled before playback starts (minimum 3)
    #[arg(long, env = "BCAST_OUT_PREROLL")]
    preroll: Option<u32>,

    /// Callback thread priority: "max", "min" or a number
    #[arg(long, env = "BCAST_OUT_PRIORITY")]
    priority: Option<String>,

    /// Seconds of pattern to play
    #[arg(short, long, default_value = "10")]
    seconds: u64,

    /// Attach a caption pair to every frame
    #[arg(long)]
    captions: bool,

    /// Attach a splice cue every N frames
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    splice_every: Option<u64>,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn load_config(args: &Args) -> Result<OutputConfig> {
    let mut config = match &args.config {
        Some(path) => OutputConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => OutputConfig::default(),
    };
    if let Some(card) = args.card {
        config.card = card;
    }
    if let Some(preroll) = args.preroll {
        config.preroll = preroll;
    }
    if let Some(priority) = &args.priority {
        config.priority = Some(priority.clone());
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("bcast_out={}", config.logging.level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("bcast-out {}", env!("CARGO_PKG_VERSION"));

    let device = VirtualDevice::builder("Virtual Output")
        .keyer(true)
        .completion(CompletionMode::Clocked)
        .build();
    let driver = Arc::new(VirtualDriver::new(vec![device]));

    let frames = (args.seconds as f64 * config.profile.fps()).ceil() as u64;
    let mut source = PatternSource::new(&config.profile, config.keyer_mode().is_enabled(), config.channels)
        .with_limit(frames);
    if args.captions {
        source = source.with_captions();
    }
    if let Some(interval) = args.splice_every {
        source = source.with_splice_every(interval);
    }

    let output = Arc::new(
        Output::new(config, driver, Box::new(source)).context("Failed to create output")?,
    );

    if args.list_devices {
        for (index, name) in output.list_devices()?.iter().enumerate() {
            println!("{}: {}", index, name);
        }
        return Ok(());
    }

    let mut events = output.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event @ OutputEvent::PlaybackStarted { .. }) => {
                    info!("Event: {}", serde_json::to_string(&event).unwrap_or_default());
                }
                Ok(event) => debug!("Event: {}", event.event_type()),
                Err(RecvError::Lagged(n)) => debug!("Event listener skipped {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let starter = Arc::clone(&output);
    let started = tokio::task::spawn_blocking(move || starter.open_configured() && starter.start())
        .await
        .context("Start task failed")?;
    if !started {
        bail!("Output failed to start");
    }
    info!("Playing {} frames (top field first: {})", frames, output.top_field_first());

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.seconds) + Duration::from_millis(500)) => {
            info!("Pattern finished");
        }
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Received Ctrl+C, stopping");
        }
    }

    let closer = Arc::clone(&output);
    tokio::task::spawn_blocking(move || closer.close())
        .await
        .context("Close task failed")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&output.stats()).context("Failed to serialize stats")?
    );
    Ok(())
}
