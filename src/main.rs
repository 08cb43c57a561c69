pub mod bridge;
pub mod config;
pub mod controller;
pub mod device;
pub mod output;

use crate::bridge::BridgeError;
use crate::config::Config;
use crate::controller::ButtonMapVariant;
use crate::device::{SysfsLocator, UdevHider};
use crate::output::{EventSink, VirtualJoystick};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Exposes a Flydigi Vader 4 Pro in DInput mode as a standard Linux joystick.
#[derive(Parser, Debug)]
#[command(name = "flydigi-bridge", version)]
struct Cli {
    /// Config file (default: ~/.config/flydigi-bridge/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the button layout from the config
    #[arg(long, value_enum)]
    variant: Option<ButtonMapVariant>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, Default)]
enum Command {
    /// Bridge controller reports to the virtual joystick
    #[default]
    Run,
    /// Print the hidraw node of the controller
    Locate,
    /// Install the udev rule hiding the physical controller
    Hide,
    /// Remove the udev rule again
    Unhide,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup(cli.verbose)?;

    let mut config = Config::load(cli.config.as_deref()).await?;
    if let Some(variant) = cli.variant {
        info!("Button layout overridden to {}", variant);
        config.device.variant = variant;
    }

    let hider = UdevHider::new(
        &config.hiding.rule_path,
        config.device.vendor_id,
        config.device.product_id,
    );

    match cli.command.unwrap_or_default() {
        Command::Run => run(&config, &hider).await,
        Command::Locate => locate(&config),
        Command::Hide => {
            hider
                .install_hide_rule()
                .await
                .map_err(|e| eyre!("Hiding failed: {}", e))?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Unhide => {
            hider
                .remove_hide_rule()
                .await
                .map_err(|e| eyre!("Unhiding failed: {}", e))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(config: &Config, hider: &UdevHider) -> Result<ExitCode> {
    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone())?;

    let locator = SysfsLocator::new(&config.device.target())?;

    if config.hiding.enabled {
        if let Err(e) = hider.install_hide_rule().await {
            warn!("Continuing without hiding the physical controller: {}", e);
        }
    }

    info!(
        "Bridging {:04x}:{:04x} with the {} layout",
        config.device.vendor_id, config.device.product_id, config.device.variant
    );
    let outcome = bridge::launch(
        config,
        &locator,
        |name, caps| {
            VirtualJoystick::create(name, caps)
                .map(|joystick| Box::new(joystick) as Box<dyn EventSink>)
        },
        cancel,
    )
    .await;

    if config.hiding.enabled {
        if let Err(e) = hider.remove_hide_rule().await {
            warn!(
                "Could not remove hide rule {}: {}",
                hider.rule_path().display(),
                e
            );
        }
    }

    Ok(exit_status(outcome))
}

fn exit_status(outcome: Result<bridge::BridgeStats, BridgeError>) -> ExitCode {
    ExitCode::from(status_code(outcome))
}

fn status_code(outcome: Result<bridge::BridgeStats, BridgeError>) -> u8 {
    match outcome {
        Ok(stats) => {
            info!(
                "Stopped after {} reports ({} short reads)",
                stats.reports, stats.short_reads
            );
            0
        }
        Err(e) => {
            error!("{}", e);
            e.exit_code()
        }
    }
}

fn locate(config: &Config) -> Result<ExitCode> {
    let locator = SysfsLocator::new(&config.device.target())?;
    match locator.locate() {
        Ok(Some(path)) => {
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        Ok(None) => Ok(exit_status(Err(BridgeError::SourceNotFound {
            vendor_id: config.device.vendor_id,
            product_id: config.device.product_id,
        }))),
        Err(e) => Ok(exit_status(Err(e.into()))),
    }
}

/// Cancels `cancel` on SIGINT or SIGTERM.
fn spawn_signal_handler(cancel: CancellationToken) -> Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("SIGINT received, shutting down"),
            _ = terminate.recv() => info!("SIGTERM received, shutting down"),
        }
        cancel.cancel();
    });
    Ok(())
}

fn setup(verbose: bool) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", if verbose { "debug" } else { "info" })
    }
    setup_logging_env(if verbose { Level::DEBUG } else { Level::INFO });
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
