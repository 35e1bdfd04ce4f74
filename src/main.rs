// src/main.rs - Drive the kettle controller against a simulated kettle
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use kettle_rs::config::{self, PropertyTable};
use kettle_rs::hardware::simulated::{SimulatedKettle, ThermalModel};
use kettle_rs::hardware::Collaborators;
use kettle_rs::notify::TracingNotifier;
use kettle_rs::supervisor::Supervisor;

/// Kettle controller simulation
#[derive(Parser, Debug)]
#[command(name = "kettle-sim", about = "Run the kettle heater and pump controller against a simulated kettle.")]
struct Cli {
    /// Path to a TOML property file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target temperature, in the configured unit
    #[arg(short, long, default_value_t = 66.0)]
    target: f64,

    /// Starting kettle temperature
    #[arg(long, default_value_t = 20.0)]
    initial: f64,

    /// Stop after this many seconds (runs until Ctrl-C when omitted)
    #[arg(short, long)]
    duration: Option<u64>,

    /// Sensor noise amplitude
    #[arg(long, default_value_t = 0.05)]
    noise: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: tracing::Level,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .init();

    let properties = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            config::load_properties(path)?
        }
        None => PropertyTable::default(),
    };

    let model = ThermalModel {
        noise: cli.noise,
        ..Default::default()
    };
    let kettle = Arc::new(SimulatedKettle::with_model("kettle", model));
    kettle.set_temperature(cli.initial);
    kettle.set_target(cli.target);

    let (model_stop, model_rx) = watch::channel(false);
    let model_task = kettle.clone().spawn_model(Duration::from_millis(100), model_rx);

    let collaborators = Collaborators::from_host(
        kettle.clone(),
        Arc::new(properties),
        Arc::new(TracingNotifier),
    );
    let run = Supervisor::start(&kettle.info().id, collaborators).await?;
    tracing::info!("Run {} started, target {:.1}", run.run_id(), cli.target);

    let mut status = tokio::time::interval(Duration::from_secs(10));
    let deadline = async {
        match cli.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                tracing::info!("Duration elapsed");
                break;
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("Ctrl-C received");
                break;
            }
            _ = status.tick() => {
                tracing::info!(
                    "Kettle {:.2} (target {:.1}) heater {} pump {}",
                    kettle.temperature(),
                    cli.target,
                    if kettle.heater_on() { "on" } else { "off" },
                    if kettle.agitator_on() { "on" } else { "off" },
                );
                if !run.is_running() {
                    tracing::warn!("Controller stopped on its own");
                    break;
                }
            }
        }
    }

    let report = run.stop().await?;
    let _ = model_stop.send(true);
    model_task.await?;

    tracing::info!(
        "Run {} finished: heater {:?} after {} windows, pump {:?} after {} cycles",
        report.run_id,
        report.heater,
        report.heater_windows,
        report.pump,
        report.pump_cycles
    );
    Ok(())
}
