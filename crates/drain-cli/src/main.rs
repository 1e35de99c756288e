//! graceful-drain
//!
//! Drains every managed service container on this host: each container is
//! taken out of routing, given time to finish in-flight requests, killed
//! and put back in routing, with a cooldown between kills of the same
//! service instance.
//!
//! By default a reviewable shell script is printed and nothing is touched.
//! `--execute` runs the plan.

mod config;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use crate::config::{ConfigOverrides, DrainConfig};
use crate::output::OutputFormat;
use drain_lib::emitter::{run_timeline, ActionEmitter, JsonEmitter, LiveEmitter, ScriptEmitter};
use drain_lib::exec::CommandRunner;
use drain_lib::inventory::{ContainerRuntime, DockerCli, InventoryReader, SmartstackRoutes};
use drain_lib::{DrainError, DrainMetrics, DrainScheduler, StructuredLogger};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit code used when the operator interrupts a run
const EXIT_INTERRUPTED: u8 = 130;

/// Gracefully drain service containers out of a load-balanced fleet
#[derive(Parser)]
#[command(name = "graceful-drain")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Execute the plan instead of printing it
    #[arg(long)]
    pub execute: bool,

    /// Plan output format (plan mode only)
    #[arg(
        long,
        short,
        value_enum,
        default_value = "script",
        conflicts_with = "execute"
    )]
    pub format: OutputFormat,

    /// Seed for the drain order (random if not given)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Configuration file (any format supported by the config crate)
    #[arg(long, short, env = "DRAIN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Seconds allowed for in-flight requests after route-out
    #[arg(long)]
    pub smartstack_grace: Option<u64>,

    /// Base pause in seconds between two containers
    #[arg(long)]
    pub between_containers_grace: Option<u64>,

    /// Minimum seconds between kills of the same service instance
    #[arg(long)]
    pub min_kill_interval: Option<u64>,

    /// Seconds before a route-out entry expires on its own
    #[arg(long)]
    pub route_expiry: Option<u64>,

    /// Deadline in seconds for each external command
    #[arg(long)]
    pub command_timeout: Option<u64>,

    /// Do not prefix commands with sudo
    #[arg(long)]
    pub no_sudo: bool,

    /// Container runtime binary
    #[arg(long)]
    pub docker_bin: Option<String>,

    /// Root of the per-service routing configuration
    #[arg(long)]
    pub services_root: Option<PathBuf>,

    /// Write Prometheus metrics to this file when the run ends
    #[arg(long)]
    pub metrics_textfile: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short)]
    pub verbose: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            smartstack_grace_secs: self.smartstack_grace,
            between_containers_grace_secs: self.between_containers_grace,
            min_kill_interval_secs: self.min_kill_interval,
            route_expiry_secs: self.route_expiry,
            command_timeout_secs: self.command_timeout,
            no_sudo: self.no_sudo,
            docker_bin: self.docker_bin.clone(),
            services_root: self.services_root.clone(),
        }
    }

    fn mode(&self) -> &'static str {
        if self.execute {
            "execute"
        } else {
            "plan"
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the plan
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let interrupted = e
                .downcast_ref::<DrainError>()
                .is_some_and(DrainError::is_interrupted);
            if interrupted {
                output::print_error("interrupted, remaining plan not executed");
                ExitCode::from(EXIT_INTERRUPTED)
            } else {
                error!(error = %format!("{:#}", e), "Drain run failed");
                output::print_error(&format!("{:#}", e));
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = DrainConfig::load(cli.config.as_deref(), &cli.overrides())?;
    let scheduler = DrainScheduler::new(config.policy())?;
    info!(host = %config.host_name, policy = ?scheduler.policy(), "Drain configured");

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    let metrics = DrainMetrics::new();
    let logger = StructuredLogger::new(&config.host_name);

    let runner = CommandRunner::new(config.exec_config(), cancel.clone());
    let runtime: Arc<dyn ContainerRuntime> =
        Arc::new(DockerCli::with_binary(runner.clone(), &config.docker_bin));
    let routing = Arc::new(SmartstackRoutes::new(&config.services_root));

    let inventory = InventoryReader::new(runtime.clone(), routing)
        .discover()
        .await
        .context("Inventory discovery failed")?;

    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let timeline = scheduler.plan(inventory.containers, inventory.skipped, &mut rng);
    logger.log_run_started(cli.mode(), timeline.len(), timeline.skipped.len(), cli.seed);

    let mut emitter: Box<dyn ActionEmitter> = if cli.execute {
        Box::new(LiveEmitter::new(runner, runtime).with_routing(config.routing_commands()))
    } else {
        match cli.format {
            OutputFormat::Script => Box::new(
                ScriptEmitter::new(std::io::stdout())
                    .with_sudo(config.use_sudo)
                    .with_docker_bin(&config.docker_bin)
                    .with_routing(config.routing_commands()),
            ),
            OutputFormat::Json => Box::new(JsonEmitter::new(std::io::stdout())),
        }
    };

    let result = run_timeline(&timeline, emitter.as_mut(), &metrics, &logger).await;

    if let Some(path) = &cli.metrics_textfile {
        if let Err(e) = output::write_metrics_textfile(path, &metrics) {
            warn!(path = %path.display(), error = %format!("{:#}", e), "Failed to write metrics");
        }
    }

    let summary = result.context("Drain aborted")?;
    if cli.execute {
        output::print_success(&format!(
            "drained {} containers ({} skipped)",
            summary.drained, summary.skipped
        ));
    }
    Ok(())
}
