//! Live execution of drain actions

use super::{async_trait, ActionEmitter, RoutingCommands};
use crate::error::{DrainError, Result};
use crate::exec::CommandRunner;
use crate::inventory::ContainerRuntime;
use crate::models::{DrainAction, ScheduledAction};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Executes drain actions against the routing layer and the container runtime
///
/// Sleeps are real and end early with [`DrainError::Interrupted`] when the
/// run is cancelled.
pub struct LiveEmitter {
    runner: CommandRunner,
    runtime: Arc<dyn ContainerRuntime>,
    routing: RoutingCommands,
}

impl LiveEmitter {
    pub fn new(runner: CommandRunner, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runner,
            runtime,
            routing: RoutingCommands::default(),
        }
    }

    pub fn with_routing(mut self, routing: RoutingCommands) -> Self {
        self.routing = routing;
        self
    }

    async fn sleep(&self, secs: u64) -> Result<()> {
        debug!(secs, "Sleeping");
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(secs)) => Ok(()),
            _ = self.runner.cancel_token().cancelled() => Err(DrainError::Interrupted),
        }
    }
}

/// Epoch second at which a route-out entry expires
fn route_out_expiry(now: i64, expire_secs: u64) -> Result<i64> {
    i64::try_from(expire_secs)
        .ok()
        .and_then(|secs| now.checked_add(secs))
        .ok_or_else(|| {
            DrainError::InvalidPolicy(format!("route expiry of {}s is out of range", expire_secs))
        })
}

#[async_trait]
impl ActionEmitter for LiveEmitter {
    async fn emit(&mut self, action: &ScheduledAction) -> Result<()> {
        match &action.action {
            DrainAction::RouteOut {
                key,
                port,
                expire_secs,
            } => {
                let expires = route_out_expiry(chrono::Utc::now().timestamp(), *expire_secs)?;
                let args = self
                    .routing
                    .route_out_args(key, *port, &expires.to_string());
                self.runner.run(&self.routing.hadown, &args).await?;
                info!(key = %key, port, expires, "Routed out");
            }
            DrainAction::Sleep { secs } => self.sleep(*secs).await?,
            DrainAction::Kill { container_id } => {
                if self.runner.cancel_token().is_cancelled() {
                    return Err(DrainError::Interrupted);
                }
                self.runtime.kill(container_id).await?;
            }
            DrainAction::RouteIn { key, port } => {
                let args = self.routing.route_in_args(key, *port);
                self.runner.run(&self.routing.haup, &args).await?;
                info!(key = %key, port, "Routed in");
            }
        }
        Ok(())
    }
}
