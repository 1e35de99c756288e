//! Docker CLI container runtime

use super::{async_trait, ContainerRuntime};
use crate::error::{DrainError, Result};
use crate::exec::CommandRunner;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Default docker binary
pub const DEFAULT_DOCKER_BIN: &str = "docker";

/// Length of the short ids printed by `docker ps -q`
const SHORT_ID_LEN: usize = 12;

/// Container runtime backed by the `docker` command line
pub struct DockerCli {
    runner: CommandRunner,
    binary: String,
}

impl DockerCli {
    pub fn new(runner: CommandRunner) -> Self {
        Self::with_binary(runner, DEFAULT_DOCKER_BIN)
    }

    pub fn with_binary(runner: CommandRunner, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    async fn docker(&self, args: &[&str]) -> Result<String> {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let output = self.runner.run(&self.binary, &args).await?;
        Ok(output.stdout)
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn list_running(&self) -> Result<Vec<String>> {
        let stdout = self.docker(&["ps", "-q"]).await.map_err(discovery_error)?;

        let ids = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| {
                if is_container_id(line) {
                    Ok(line.to_string())
                } else {
                    Err(DrainError::Discovery(format!(
                        "{} doesn't look like a container ID",
                        line
                    )))
                }
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(count = ids.len(), "Listed running containers");
        Ok(ids)
    }

    async fn inspect_env(&self, container_id: &str) -> Result<BTreeMap<String, String>> {
        let stdout = self
            .docker(&["inspect", container_id])
            .await
            .map_err(discovery_error)?;
        parse_inspect_env(&stdout).map_err(discovery_error)
    }

    async fn kill(&self, container_id: &str) -> Result<()> {
        self.docker(&["kill", container_id]).await?;
        info!(container_id = %container_id, "Killed container");
        Ok(())
    }
}

/// Listing and inspect failures abort discovery, but interrupts stay interrupts
fn discovery_error(err: DrainError) -> DrainError {
    match err {
        DrainError::Interrupted => DrainError::Interrupted,
        other => DrainError::Discovery(other.to_string()),
    }
}

/// Whether a `docker ps -q` line is a short container id
pub fn is_container_id(line: &str) -> bool {
    line.len() == SHORT_ID_LEN && line.chars().all(|c| c.is_ascii_hexdigit())
}

#[derive(Debug, Deserialize)]
struct InspectEntry {
    #[serde(rename = "Config")]
    config: InspectConfig,
}

#[derive(Debug, Deserialize)]
struct InspectConfig {
    #[serde(rename = "Env", default)]
    env: Option<Vec<String>>,
}

/// Extract `Config.Env` from `docker inspect` output into a map
///
/// Entries without `=` are ignored; values may themselves contain `=`.
pub fn parse_inspect_env(inspect_json: &str) -> Result<BTreeMap<String, String>> {
    let entries: Vec<InspectEntry> = serde_json::from_str(inspect_json)?;
    let entry = entries
        .into_iter()
        .next()
        .ok_or_else(|| DrainError::Discovery("docker inspect returned no entries".into()))?;

    Ok(entry
        .config
        .env
        .unwrap_or_default()
        .iter()
        .filter_map(|kv| kv.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect())
}
