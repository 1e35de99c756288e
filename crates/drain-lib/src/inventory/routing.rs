//! Routing configuration lookup

use super::RoutingConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default root of per-service configuration directories
pub const DEFAULT_SERVICES_ROOT: &str = "/nail/etc/services";

#[derive(Debug, Deserialize)]
struct SmartstackEntry {
    #[serde(default)]
    proxy_port: Option<u16>,
}

/// Proxy ports read from `<root>/<service>/smartstack.yaml`
///
/// The file maps instance names to their routing settings. A missing file,
/// a missing instance or an unreadable file all mean "no routing entry".
#[derive(Debug, Clone)]
pub struct SmartstackRoutes {
    root: PathBuf,
}

impl SmartstackRoutes {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, service: &str) -> PathBuf {
        self.root.join(service).join("smartstack.yaml")
    }

    fn read(path: &Path) -> Option<HashMap<String, SmartstackEntry>> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read routing config");
                return None;
            }
        };

        match serde_yaml::from_str(&content) {
            Ok(entries) => Some(entries),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse routing config");
                None
            }
        }
    }
}

impl Default for SmartstackRoutes {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICES_ROOT)
    }
}

impl RoutingConfig for SmartstackRoutes {
    fn proxy_port(&self, service: &str, instance: &str) -> Option<u16> {
        let path = self.path_for(service);
        let port = Self::read(&path)?.remove(instance)?.proxy_port;
        debug!(service, instance, proxy_port = ?port, "Resolved proxy port");
        port
    }
}

/// Routing config with no entries, for hosts without a routing layer
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRouting;

impl RoutingConfig for NoRouting {
    fn proxy_port(&self, _service: &str, _instance: &str) -> Option<u16> {
        None
    }
}
