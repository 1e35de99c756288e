//! Drain configuration
//!
//! Layered as: built-in defaults, then an optional config file, then
//! `DRAIN_*` environment variables, then command-line flags.

use anyhow::{Context, Result};
use drain_lib::emitter::{RoutingCommands, DEFAULT_HADOWN_BIN, DEFAULT_HAUP_BIN};
use drain_lib::exec::ExecConfig;
use drain_lib::inventory::{DEFAULT_DOCKER_BIN, DEFAULT_SERVICES_ROOT};
use drain_lib::DrainPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Drain configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DrainConfig {
    /// Host name reported in structured logs
    #[serde(default = "default_host_name")]
    pub host_name: String,

    /// Seconds allowed for in-flight requests after route-out
    #[serde(default = "default_smartstack_grace")]
    pub smartstack_grace_secs: u64,

    /// Base pause between two containers
    #[serde(default = "default_between_containers_grace")]
    pub between_containers_grace_secs: u64,

    /// Minimum seconds between kills of the same service instance
    #[serde(default = "default_min_kill_interval")]
    pub min_kill_interval_secs: u64,

    /// Expiry of the route-out entry
    #[serde(default = "default_route_expiry")]
    pub route_expiry_secs: u64,

    /// Deadline for each external command
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,

    /// Prefix external commands with sudo
    #[serde(default = "default_use_sudo")]
    pub use_sudo: bool,

    #[serde(default = "default_docker_bin")]
    pub docker_bin: String,

    #[serde(default = "default_hadown_bin")]
    pub hadown_bin: String,

    #[serde(default = "default_haup_bin")]
    pub haup_bin: String,

    /// Root of the per-service routing configuration
    #[serde(default = "default_services_root")]
    pub services_root: PathBuf,
}

fn default_host_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_smartstack_grace() -> u64 {
    DrainPolicy::default().smartstack_grace_secs
}

fn default_between_containers_grace() -> u64 {
    DrainPolicy::default().between_containers_grace_secs
}

fn default_min_kill_interval() -> u64 {
    DrainPolicy::default().min_kill_interval_secs
}

fn default_route_expiry() -> u64 {
    DrainPolicy::default().route_expiry_secs
}

fn default_command_timeout() -> u64 {
    ExecConfig::default().timeout.as_secs()
}

fn default_use_sudo() -> bool {
    true
}

fn default_docker_bin() -> String {
    DEFAULT_DOCKER_BIN.to_string()
}

fn default_hadown_bin() -> String {
    DEFAULT_HADOWN_BIN.to_string()
}

fn default_haup_bin() -> String {
    DEFAULT_HAUP_BIN.to_string()
}

fn default_services_root() -> PathBuf {
    PathBuf::from(DEFAULT_SERVICES_ROOT)
}

/// Values given on the command line; `None` leaves lower layers in effect
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub smartstack_grace_secs: Option<u64>,
    pub between_containers_grace_secs: Option<u64>,
    pub min_kill_interval_secs: Option<u64>,
    pub route_expiry_secs: Option<u64>,
    pub command_timeout_secs: Option<u64>,
    pub no_sudo: bool,
    pub docker_bin: Option<String>,
    pub services_root: Option<PathBuf>,
}

impl DrainConfig {
    /// Load configuration from file, environment and command-line overrides
    pub fn load(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder
            .add_source(config::Environment::with_prefix("DRAIN").try_parsing(true))
            .set_override_option(
                "smartstack_grace_secs",
                overrides.smartstack_grace_secs.map(secs_value),
            )?
            .set_override_option(
                "between_containers_grace_secs",
                overrides.between_containers_grace_secs.map(secs_value),
            )?
            .set_override_option(
                "min_kill_interval_secs",
                overrides.min_kill_interval_secs.map(secs_value),
            )?
            .set_override_option(
                "route_expiry_secs",
                overrides.route_expiry_secs.map(secs_value),
            )?
            .set_override_option(
                "command_timeout_secs",
                overrides.command_timeout_secs.map(secs_value),
            )?
            .set_override_option("docker_bin", overrides.docker_bin.clone())?
            .set_override_option(
                "services_root",
                overrides
                    .services_root
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
            )?;

        if overrides.no_sudo {
            builder = builder.set_override("use_sudo", false)?;
        }

        let config = builder.build().context("Failed to build configuration")?;
        config
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    pub fn policy(&self) -> DrainPolicy {
        DrainPolicy {
            smartstack_grace_secs: self.smartstack_grace_secs,
            between_containers_grace_secs: self.between_containers_grace_secs,
            min_kill_interval_secs: self.min_kill_interval_secs,
            route_expiry_secs: self.route_expiry_secs,
        }
    }

    pub fn exec_config(&self) -> ExecConfig {
        ExecConfig {
            timeout: Duration::from_secs(self.command_timeout_secs),
            use_sudo: self.use_sudo,
        }
    }

    pub fn routing_commands(&self) -> RoutingCommands {
        RoutingCommands {
            hadown: self.hadown_bin.clone(),
            haup: self.haup_bin.clone(),
        }
    }
}

fn secs_value(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}
