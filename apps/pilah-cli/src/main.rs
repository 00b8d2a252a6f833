use std::{env, sync::mpsc as std_mpsc, time::Duration};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use pilah_camera::camera_from_config;
use pilah_classifier::classifier_from_config;
use pilah_cycle::{CaptureClassifyCycle, CycleConfig, CycleDriver};
use pilah_events::{EventBus, LocalEventBus};
use pilah_ops::{init_tracing, TelemetryStore};
use pilah_types::{
    config::{ClassifierStrategy, PilahConfig},
    PilahError,
};
use tokio::sync::mpsc;
use tracing::{info, warn};

mod ui;

use ui::UiMessage;

const DEFAULT_CONFIG_PATH: &str = "configs/dev.toml";
const UI_LOG_FILE: &str = "logs/pilah.log";

#[derive(Debug, Parser)]
#[command(name = "pilah-cli", about = "Capture a photo of waste and classify it")]
struct Cli {
    /// TOML config; falls back to PILAH_CONFIG, then configs/dev.toml.
    #[arg(long)]
    config: Option<String>,
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,
    /// Remote classification endpoint.
    #[arg(long)]
    endpoint: Option<String>,
    /// ONNX model for the local strategy.
    #[arg(long)]
    model: Option<String>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    Remote,
    Local,
}

#[derive(Debug, Clone, Copy, Subcommand)]
enum Command {
    /// Interactive terminal UI.
    Run,
    /// Single headless capture, printing the classification.
    Snap,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Command::Run);
    let mut config = load_config(cli.config.clone());
    apply_overrides(&mut config, &cli);
    config.validate()?;

    if matches!(command, Command::Run) && config.ops.log_file.is_none() {
        config.ops.log_file = Some(UI_LOG_FILE.into());
    }
    init_tracing(&config.ops)?;
    info!("Starting pilah-cli with {}", config.summary());

    let camera = camera_from_config(&config.camera)?;
    let classifier = classifier_from_config(&config);
    let bus = LocalEventBus::new(256);
    let telemetry = TelemetryStore::new();
    let cycle = CaptureClassifyCycle::new(
        CycleConfig::from(&config),
        camera,
        classifier,
        bus.clone(),
        telemetry.clone(),
    );

    let outcome = match command {
        Command::Run => run_ui(cycle, &bus, config.summary()).await,
        Command::Snap => snap(cycle, Duration::from_millis(config.camera.warmup_ms)).await,
    };

    if let Some(path) = &config.ops.telemetry_file {
        if let Err(err) = telemetry.export_json(path).await {
            warn!("Telemetry export failed: {}", err);
        }
    }
    outcome
}

async fn run_ui<C, K>(
    cycle: CaptureClassifyCycle<C, K, LocalEventBus>,
    bus: &LocalEventBus,
    summary: String,
) -> Result<()>
where
    C: pilah_camera::CameraSource + 'static,
    K: pilah_classifier::Classifier + 'static,
{
    let (ui_tx, ui_rx) = std_mpsc::channel();
    let mut events = bus.subscribe();
    let forwarder = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if ui_tx.send(UiMessage::Event(event)).is_err() {
                break;
            }
        }
    });

    let (command_tx, command_rx) = mpsc::channel(16);
    let driver = tokio::spawn(CycleDriver::new(cycle, command_rx).run());
    let ui_result = tokio::task::spawn_blocking(move || ui::run(ui_rx, command_tx, summary)).await?;

    let driver_result = driver.await?;
    forwarder.abort();
    ui_result?;
    driver_result?;
    Ok(())
}

/// One capture once the feed has had `warmup` to buffer.
async fn snap<C, K>(mut cycle: CaptureClassifyCycle<C, K, LocalEventBus>, warmup: Duration) -> Result<()>
where
    C: pilah_camera::CameraSource,
    K: pilah_classifier::Classifier,
{
    cycle.boot().await?;
    tokio::time::sleep(warmup).await;
    let mut outcome = cycle.capture().await;
    if matches!(outcome, Err(PilahError::FrameNotReady(_))) {
        // capture() already restarted the camera once.
        tokio::time::sleep(warmup).await;
        outcome = cycle.capture().await;
    }
    cycle.shutdown().await?;

    match outcome {
        Ok(result) => {
            println!("{}", result.label_line());
            println!("{}", result.confidence_line());
            Ok(())
        }
        Err(err) => bail!("Classification failed: {}", err.detail()),
    }
}

fn apply_overrides(config: &mut PilahConfig, cli: &Cli) {
    if let Some(strategy) = cli.strategy {
        config.classifier.strategy = match strategy {
            StrategyArg::Remote => ClassifierStrategy::Remote,
            StrategyArg::Local => ClassifierStrategy::Local,
        };
    }
    if let Some(endpoint) = &cli.endpoint {
        config.classifier.remote.endpoint = endpoint.clone();
    }
    if let Some(model) = &cli.model {
        config.classifier.local.model_path = model.clone();
    }
}

fn load_config(from_args: Option<String>) -> PilahConfig {
    let from_env = env::var("PILAH_CONFIG").ok();
    let path = from_args
        .or(from_env)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.into());
    match PilahConfig::from_file(&path) {
        Ok(cfg) => {
            if let Err(err) = cfg.validate() {
                eprintln!(
                    "Invalid config in '{}': {err}. Falling back to internal defaults.",
                    path
                );
                PilahConfig::default()
            } else {
                cfg
            }
        }
        Err(err) => {
            eprintln!("{err}. Falling back to internal defaults.");
            PilahConfig::default()
        }
    }
}
