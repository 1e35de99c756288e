//! Container inventory
//!
//! This module discovers the running containers a drain run operates on.
//! Discovery is expressed over two collaborators:
//! - a [`ContainerRuntime`] that lists, inspects and kills containers
//!   (the docker CLI in production),
//! - a [`RoutingConfig`] that resolves a service instance's proxy port
//!   (per-service `smartstack.yaml` files in production).

mod discovery;
mod docker;
mod routing;

#[cfg(test)]
mod tests;

pub use discovery::{identify, Inventory, InventoryReader};
pub use docker::{is_container_id, parse_inspect_env, DockerCli, DEFAULT_DOCKER_BIN};
pub use routing::{NoRouting, SmartstackRoutes, DEFAULT_SERVICES_ROOT};

use crate::error::Result;
use std::collections::BTreeMap;

pub use async_trait::async_trait;

/// Capabilities the drain tool needs from the container runtime
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Identifiers of all running containers
    async fn list_running(&self) -> Result<Vec<String>>;

    /// Environment variables of a container as a key/value map
    async fn inspect_env(&self, container_id: &str) -> Result<BTreeMap<String, String>>;

    /// Terminate a container
    async fn kill(&self, container_id: &str) -> Result<()>;
}

/// Read-only lookup of the routing (proxy) port of a service instance
pub trait RoutingConfig: Send + Sync {
    /// `None` when the service instance has no routing entry
    fn proxy_port(&self, service: &str, instance: &str) -> Option<u16>;
}
