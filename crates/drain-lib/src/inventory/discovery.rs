//! Container discovery
//!
//! Lists running containers, inspects each one and keeps the ones that carry
//! a full service identity in their environment.

use super::{ContainerRuntime, RoutingConfig};
use crate::error::{DrainError, Result};
use crate::models::{Container, SkippedContainer, ENV_HOST_PORT, ENV_INSTANCE, ENV_SERVICE};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of one discovery pass
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    /// Managed containers, in listing order
    pub containers: Vec<Container>,
    /// Containers not managed by this tool
    pub skipped: Vec<SkippedContainer>,
}

/// Reads the managed container inventory from the runtime
pub struct InventoryReader {
    runtime: Arc<dyn ContainerRuntime>,
    routing: Arc<dyn RoutingConfig>,
}

impl InventoryReader {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, routing: Arc<dyn RoutingConfig>) -> Self {
        Self { runtime, routing }
    }

    /// Discover all running containers
    ///
    /// Fails if the runtime cannot be listed or inspected, or if nothing is
    /// running. Unmanaged containers are skipped with a warning.
    pub async fn discover(&self) -> Result<Inventory> {
        let ids = self.runtime.list_running().await?;
        if ids.is_empty() {
            return Err(DrainError::Discovery("no containers running".into()));
        }

        let mut inventory = Inventory::default();
        for id in ids {
            let env = self.runtime.inspect_env(&id).await?;
            match identify(&id, env, self.routing.as_ref()) {
                Ok(container) => {
                    debug!(
                        container_id = %container.id,
                        key = %container.key(),
                        host_port = container.host_port,
                        proxy_port = ?container.proxy_port,
                        "Discovered managed container"
                    );
                    inventory.containers.push(container);
                }
                Err(skipped) => {
                    warn!(
                        container_id = %skipped.id,
                        reason = %skipped.reason,
                        "Skipping unmanaged container"
                    );
                    inventory.skipped.push(skipped);
                }
            }
        }

        info!(
            managed = inventory.containers.len(),
            skipped = inventory.skipped.len(),
            "Discovered running containers"
        );
        Ok(inventory)
    }
}

/// Build a [`Container`] from its environment, or explain why it is unmanaged
pub fn identify(
    id: &str,
    env: BTreeMap<String, String>,
    routing: &dyn RoutingConfig,
) -> std::result::Result<Container, SkippedContainer> {
    let skip = |reason: String| SkippedContainer {
        id: id.to_string(),
        reason,
    };

    let missing: Vec<&str> = [ENV_SERVICE, ENV_INSTANCE, ENV_HOST_PORT]
        .into_iter()
        .filter(|k| !env.contains_key(*k))
        .collect();
    if !missing.is_empty() {
        return Err(skip(format!("missing {}", missing.join(", "))));
    }

    let service = env[ENV_SERVICE].clone();
    let instance = env[ENV_INSTANCE].clone();
    let host_port = env[ENV_HOST_PORT]
        .trim()
        .parse::<u16>()
        .map_err(|_| skip(format!("invalid {}: {:?}", ENV_HOST_PORT, env[ENV_HOST_PORT])))?;
    let proxy_port = routing.proxy_port(&service, &instance);

    Ok(Container {
        id: id.to_string(),
        service,
        instance,
        host_port,
        proxy_port,
        env,
    })
}
