//! fttbd - FTTB pipeline fixture daemon
//!
//! Activates the FTTB pipeline against in-memory controller services, keeps
//! it installed until interrupted and removes it on shutdown. SIGHUP reloads
//! the configuration file; the new values apply on the next activation.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fttb_pipeline::sim::{InMemoryApplicationRegistry, InMemoryFlowRuleStore, InMemoryMeterStore};
use fttb_pipeline::{
    ApplicationService, Component, FttbPipeline, MeterFailReason, MeterId, PipelineConfig,
    RuleSetBuilder,
};

/// FTTB OLT pipeline fixture
#[derive(Parser, Debug)]
#[command(name = "fttbd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file (defaults to the built-in FTTB topology)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Print the rule set as JSON and exit
    #[arg(long)]
    dump_rules: bool,

    /// Delay before the simulated meter completion, in milliseconds
    #[arg(long, default_value = "0")]
    meter_delay_ms: u64,

    /// Fail the simulated meter submission with this reason
    #[arg(long, value_name = "REASON")]
    fail_meter: Option<MeterFailReason>,

    /// Deactivate right after activation instead of waiting for Ctrl-C
    #[arg(long)]
    once: bool,
}

/// Initializes tracing/logging subsystem
fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level '{}'", level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn dump_rules(config: &PipelineConfig) -> anyhow::Result<()> {
    let app_id = InMemoryApplicationRegistry::new().get_id(&config.app_name);
    let rules = RuleSetBuilder::new(config, app_id).build(MeterId::new(1));
    println!("{}", serde_json::to_string_pretty(&rules)?);
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown(
    component: &mut dyn Component,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                return Ok(());
            }
            _ = hangup.recv() => {
                let config = match config_path.map(|path| load_config(Some(path))).transpose() {
                    Ok(config) => config,
                    Err(e) => {
                        warn!("Ignoring configuration reload: {:#}", e);
                        continue;
                    }
                };
                if let Err(e) = component.modified(config).await {
                    warn!("Reconfiguration rejected: {}", e);
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(
    _component: &mut dyn Component,
    _config_path: Option<&Path>,
) -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;

    if args.dump_rules {
        return dump_rules(&config);
    }

    let mut meters = InMemoryMeterStore::new().with_delay(Duration::from_millis(args.meter_delay_ms));
    if let Some(reason) = args.fail_meter {
        meters = meters.fail_with(reason);
    }
    let flows = Arc::new(InMemoryFlowRuleStore::new());

    let pipeline = FttbPipeline::new(
        config,
        Arc::new(InMemoryApplicationRegistry::new()),
        flows.clone(),
        Arc::new(meters),
    )?;
    let mut component: Box<dyn Component> = Box::new(pipeline);

    info!("Activating {}", component.name());
    component.activate().await?;
    info!("{} rules installed", flows.len());

    if !args.once {
        info!("Running, press Ctrl-C to stop");
        wait_for_shutdown(component.as_mut(), args.config.as_deref()).await?;
    }

    component.deactivate().await?;
    info!("{} rules left installed", flows.len());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_level) {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    info!("--- Starting fttbd ---");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fttbd failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
