//! Action emission
//!
//! A [`Timeline`](crate::models::Timeline) is replayed through an
//! [`ActionEmitter`], chosen when the run starts:
//! - [`ScriptEmitter`] writes a reviewable shell script and runs nothing,
//! - [`JsonEmitter`] writes the whole plan as JSON,
//! - [`LiveEmitter`] calls the routing layer and the container runtime.
//!
//! All side effects of a drain run happen behind this trait.

mod json;
mod live;
mod runner;
mod script;


pub use json::JsonEmitter;
pub use live::LiveEmitter;
pub use runner::{run_timeline, RunSummary};
pub use script::ScriptEmitter;

use crate::error::Result;
use crate::models::{DrainCycle, ScheduledAction, ServiceInstanceKey, SkippedContainer, Timeline};

pub use async_trait::async_trait;

/// Default routing-layer command that takes a port out of rotation
pub const DEFAULT_HADOWN_BIN: &str = "hadown";
/// Default routing-layer command that puts a port back in rotation
pub const DEFAULT_HAUP_BIN: &str = "haup";

/// Sink for a drain plan
///
/// Hooks are called in timeline order; an error stops the replay.
#[async_trait]
pub trait ActionEmitter: Send {
    /// Called once before anything else
    async fn begin(&mut self, _timeline: &Timeline) -> Result<()> {
        Ok(())
    }

    /// Called for every unmanaged container, before the first cycle
    async fn skipped(&mut self, _skipped: &SkippedContainer) -> Result<()> {
        Ok(())
    }

    async fn begin_cycle(&mut self, _cycle: &DrainCycle) -> Result<()> {
        Ok(())
    }

    /// Emit a single action
    async fn emit(&mut self, action: &ScheduledAction) -> Result<()>;

    async fn end_cycle(&mut self, _cycle: &DrainCycle) -> Result<()> {
        Ok(())
    }

    /// Called once after the last cycle
    async fn finish(&mut self, _timeline: &Timeline) -> Result<()> {
        Ok(())
    }
}

/// Names and arguments of the routing-layer commands
#[derive(Debug, Clone)]
pub struct RoutingCommands {
    pub hadown: String,
    pub haup: String,
}

impl Default for RoutingCommands {
    fn default() -> Self {
        Self {
            hadown: DEFAULT_HADOWN_BIN.to_string(),
            haup: DEFAULT_HAUP_BIN.to_string(),
        }
    }
}

impl RoutingCommands {
    /// Arguments for route-out; `expires` is an epoch timestamp or a shell expression
    pub fn route_out_args(
        &self,
        key: &ServiceInstanceKey,
        port: u16,
        expires: &str,
    ) -> Vec<String> {
        vec![
            "-P".to_string(),
            port.to_string(),
            "-e".to_string(),
            expires.to_string(),
            key.to_string(),
        ]
    }

    pub fn route_in_args(&self, key: &ServiceInstanceKey, port: u16) -> Vec<String> {
        vec!["-P".to_string(), port.to_string(), key.to_string()]
    }
}
