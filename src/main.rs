//! MoCap Console CLI - headless rig console and one-shot rig commands.
//!
//! This is the main binary entry point. See the `mocap_console` library
//! for the core functionality.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use mimalloc::MiMalloc;
use mocap_console::constants::CONTROL_OPEN_GRACE;
use mocap_console::protocol::events;
use mocap_console::{CameraId, Config, ConnectionState, Console, ControlEvent, Delivery, Direction};
use tokio::sync::watch;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "mocap-console")]
#[command(version)]
#[command(about = "Stream and state-sync console for a motion-capture rig")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the console headless until Ctrl-C
    Run {
        /// Camera to stream (repeatable). Defaults to the configured set.
        #[arg(long = "camera")]
        cameras: Vec<String>,
    },
    /// Move the calibration pattern
    Move {
        /// up, down, left, right, forward or backward
        direction: Direction,
        /// Step size. Defaults to the configured amount.
        #[arg(long)]
        amount: Option<f64>,
        /// Send through this camera's session instead of REST
        #[arg(long)]
        camera: Option<String>,
    },
    /// Turn rig-wide marker detection on or off
    Detect {
        /// Desired state
        state: Switch,
    },
    /// Set exposure and gain (clamped to 0-255 and 0-63)
    Settings {
        #[arg(long)]
        exposure: i64,
        #[arg(long)]
        gain: i64,
    },
    /// Set the dot threshold (clamped to 0-255)
    Threshold {
        /// Threshold value
        value: i64,
    },
    /// Initialize the rig cameras
    Init,
    /// Disconnect the rig cameras
    Disconnect,
    /// Submit JPEG frames for calibration
    Calibrate {
        /// JPEG files, one per camera
        #[arg(required = true)]
        frames: Vec<PathBuf>,
    },
    /// Show the server's calibration state
    CalibrationStatus,
    /// Print the effective configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();

    // MOCAP_LOG_FILE sends logs to a file instead of stderr
    if let Ok(path) = std::env::var("MOCAP_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {}", path))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }

    builder.init();
    Ok(())
}

/// Runs the console until Ctrl-C.
async fn run_headless(mut config: Config, cameras: Vec<String>) -> Result<()> {
    if !cameras.is_empty() {
        config.cameras = cameras.into_iter().map(CameraId::from).collect();
    }

    let mut console = Console::new(config)?;
    let _status = console.control().on(events::STATUS_UPDATE, |event| {
        if let ControlEvent::StatusUpdate(update) = event {
            println!("status: {}", update.status);
        }
    });

    console.start();
    console
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await;

    Ok(())
}

/// Wait up to [`CONTROL_OPEN_GRACE`] for a link to open.
async fn wait_open(mut state: watch::Receiver<ConnectionState>, what: &str) {
    let opened = tokio::time::timeout(
        CONTROL_OPEN_GRACE,
        state.wait_for(|s| matches!(s, ConnectionState::Open)),
    )
    .await;
    if !matches!(opened, Ok(Ok(_))) {
        log::info!("{} not open after {:?}, using fallback", what, CONTROL_OPEN_GRACE);
    }
}

/// Console for a one-shot command: control channel plus at most one camera.
async fn one_shot_console(mut config: Config, camera: Option<&CameraId>) -> Result<Console> {
    config.cameras = camera.into_iter().cloned().collect();
    let mut console = Console::new(config)?;
    console.start();

    wait_open(console.control().subscribe(), "Control channel").await;
    if let Some(session) = camera.and_then(|id| console.registry().get(id)) {
        wait_open(session.subscribe(), "Camera session").await;
    }
    Ok(console)
}

fn report(command: &str, delivery: Delivery) {
    match delivery {
        Delivery::Channel => println!("{}: sent", command),
        Delivery::Fallback => println!("{}: sent via REST", command),
    }
}

async fn read_frames(paths: &[PathBuf]) -> Result<Vec<Bytes>> {
    let mut frames = Vec::with_capacity(paths.len());
    for path in paths {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Could not read {}", path.display()))?;
        frames.push(Bytes::from(data));
    }
    Ok(frames)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Run { cameras } => {
            run_headless(config, cameras).await?;
        }
        Commands::Move {
            direction,
            amount,
            camera,
        } => {
            let camera = camera.map(CameraId::from);
            let mut config = config;
            if let Some(amount) = amount {
                config.move_amount = amount;
            }
            let mut console = one_shot_console(config, camera.as_ref()).await?;
            let delivery = console.move_pattern(camera.as_ref(), direction).await;
            console.shutdown();
            report("move_pattern", delivery?);
        }
        Commands::Detect { state } => {
            let mut console = one_shot_console(config, None).await?;
            let delivery = console.set_detection(matches!(state, Switch::On)).await;
            console.shutdown();
            report("toggle_detection", delivery?);
        }
        Commands::Settings { exposure, gain } => {
            let mut console = one_shot_console(config, None).await?;
            let delivery = console.set_camera_settings(exposure, gain).await;
            let settings = console.state().settings;
            console.shutdown();
            report("update_camera_settings", delivery?);
            println!(
                "exposure={} gain={}",
                settings.exposure(),
                settings.gain()
            );
        }
        Commands::Threshold { value } => {
            let mut console = one_shot_console(config, None).await?;
            let delivery = console.set_threshold(value).await;
            let threshold = console.state().threshold;
            console.shutdown();
            report("update_threshold", delivery?);
            println!("threshold={}", threshold.value());
        }
        Commands::Init => {
            let mut console = one_shot_console(config, None).await?;
            let delivery = console.initialize_cameras().await;
            console.shutdown();
            report("initialize_cameras", delivery?);
        }
        Commands::Disconnect => {
            let mut console = one_shot_console(config, None).await?;
            let delivery = console.disconnect_cameras().await;
            console.shutdown();
            report("disconnect_cameras", delivery?);
        }
        Commands::Calibrate { frames } => {
            let frames = read_frames(&frames).await?;
            let outcome = Console::new(config)?.calibrate(&frames).await?;
            if outcome.success {
                let solved = outcome.camera_poses.map_or(0, |poses| poses.len());
                println!("Calibration succeeded: {} camera poses", solved);
            } else {
                println!(
                    "Calibration failed: {}",
                    outcome.message.as_deref().unwrap_or("no message")
                );
            }
        }
        Commands::CalibrationStatus => {
            let status = Console::new(config)?.calibration_status().await?;
            println!("{}", if status.is_calibrated { "calibrated" } else { "not calibrated" });
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
