//! Core data models for drain runs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Environment variable naming the owning service
pub const ENV_SERVICE: &str = "PAASTA_SERVICE";
/// Environment variable naming the owning instance
pub const ENV_INSTANCE: &str = "PAASTA_INSTANCE";
/// Environment variable holding the host port the routing layer knows the container by
pub const ENV_HOST_PORT: &str = "MARATHON_PORT";

/// Logical unit at which kill cooldown is enforced
///
/// Containers sharing a key are replicas of the same service instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceInstanceKey {
    pub service: String,
    pub instance: String,
}

impl ServiceInstanceKey {
    pub fn new(service: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            instance: instance.into(),
        }
    }
}

impl fmt::Display for ServiceInstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.service, self.instance)
    }
}

/// A running, managed container discovered for this run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub service: String,
    pub instance: String,
    /// Port registered with the routing layer for this container
    pub host_port: u16,
    /// Service proxy port from the routing configuration, if any
    pub proxy_port: Option<u16>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl Container {
    pub fn key(&self) -> ServiceInstanceKey {
        ServiceInstanceKey::new(&self.service, &self.instance)
    }

    /// Whether the container has a routing entry to drain
    pub fn is_routed(&self) -> bool {
        self.proxy_port.is_some()
    }
}

/// A discovered container that is not managed by this tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedContainer {
    pub id: String,
    pub reason: String,
}

/// A single externally visible step of a drain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DrainAction {
    /// Remove the port from routing; the entry self-heals after `expire_secs`
    RouteOut {
        key: ServiceInstanceKey,
        port: u16,
        expire_secs: u64,
    },
    Sleep {
        secs: u64,
    },
    Kill {
        container_id: String,
    },
    /// Restore routing for the port
    RouteIn {
        key: ServiceInstanceKey,
        port: u16,
    },
}

impl DrainAction {
    /// Short label used for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            DrainAction::RouteOut { .. } => "route_out",
            DrainAction::Sleep { .. } => "sleep",
            DrainAction::Kill { .. } => "kill",
            DrainAction::RouteIn { .. } => "route_in",
        }
    }
}

/// An action pinned to the virtual second at which it is issued
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledAction {
    pub at: u64,
    pub container_id: String,
    pub action: DrainAction,
}

/// All actions scheduled for one container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainCycle {
    pub container: Container,
    /// Virtual time of the previous kill of the same key, if any
    pub previous_kill: Option<u64>,
    pub killed_at: u64,
    pub actions: Vec<ScheduledAction>,
}

/// Ordered, append-only drain plan produced once per run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeline {
    pub cycles: Vec<DrainCycle>,
    #[serde(default)]
    pub skipped: Vec<SkippedContainer>,
    /// Virtual clock value after the last scheduled sleep
    pub ends_at: u64,
}

impl Timeline {
    /// All actions in issue order
    pub fn actions(&self) -> impl Iterator<Item = &ScheduledAction> {
        self.cycles.iter().flat_map(|c| c.actions.iter())
    }

    /// Kill times in issue order
    pub fn kills(&self) -> impl Iterator<Item = (ServiceInstanceKey, u64)> + '_ {
        self.cycles.iter().map(|c| (c.container.key(), c.killed_at))
    }

    pub fn len(&self) -> usize {
        self.cycles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cycles.is_empty()
    }
}
