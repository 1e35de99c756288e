//! Shell script plan output

use super::{async_trait, ActionEmitter, RoutingCommands};
use crate::error::Result;
use crate::exec::command_argv;
use crate::inventory::DEFAULT_DOCKER_BIN;
use crate::models::{DrainAction, DrainCycle, ScheduledAction, SkippedContainer, Timeline};
use std::io::Write;

/// Writes the drain plan as a shell script, one action per line
///
/// Nothing is executed. The output can be reviewed and then piped to `sh`.
pub struct ScriptEmitter<W> {
    out: W,
    use_sudo: bool,
    docker_bin: String,
    routing: RoutingCommands,
}

impl<W: Write + Send> ScriptEmitter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            use_sudo: true,
            docker_bin: DEFAULT_DOCKER_BIN.to_string(),
            routing: RoutingCommands::default(),
        }
    }

    pub fn with_sudo(mut self, use_sudo: bool) -> Self {
        self.use_sudo = use_sudo;
        self
    }

    pub fn with_docker_bin(mut self, docker_bin: impl Into<String>) -> Self {
        self.docker_bin = docker_bin.into();
        self
    }

    pub fn with_routing(mut self, routing: RoutingCommands) -> Self {
        self.routing = routing;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn command(&self, program: &str, args: &[String]) -> String {
        command_argv(self.use_sudo, program, args).join(" ")
    }

    fn line(&mut self, line: &str) -> Result<()> {
        writeln!(self.out, "{}", line)?;
        Ok(())
    }
}

#[async_trait]
impl<W: Write + Send> ActionEmitter for ScriptEmitter<W> {
    async fn begin(&mut self, timeline: &Timeline) -> Result<()> {
        self.line("#!/bin/sh")?;
        self.line("set -e")?;
        self.line(&format!(
            "# drain plan: {} containers, {} skipped, {}s",
            timeline.len(),
            timeline.skipped.len(),
            timeline.ends_at
        ))
    }

    async fn skipped(&mut self, skipped: &SkippedContainer) -> Result<()> {
        self.line(&format!(
            "# WARNING: {} is not a paasta container, skipping ({})",
            skipped.id, skipped.reason
        ))
    }

    async fn begin_cycle(&mut self, cycle: &DrainCycle) -> Result<()> {
        let c = &cycle.container;
        let proxy_port = c
            .proxy_port
            .map(|p| p.to_string())
            .unwrap_or_else(|| "None".to_string());

        self.line("")?;
        self.line(&format!("# {}", c.key()))?;
        self.line(&format!(
            "# {},{},{},{},{}",
            c.id, c.service, c.instance, proxy_port, c.host_port
        ))?;
        if !c.is_routed() {
            self.line(&format!(
                "# no routing entry for {}, route-out/route-in omitted",
                c.key()
            ))?;
        }
        Ok(())
    }

    async fn emit(&mut self, action: &ScheduledAction) -> Result<()> {
        let line = match &action.action {
            DrainAction::RouteOut {
                key,
                port,
                expire_secs,
            } => {
                let expires = format!("$((`date +'%s'`+{}))", expire_secs);
                let args = self.routing.route_out_args(key, *port, &expires);
                self.command(&self.routing.hadown, &args)
            }
            DrainAction::Sleep { secs } => format!("sleep {}", secs),
            DrainAction::Kill { container_id } => {
                let args = vec!["kill".to_string(), container_id.clone()];
                self.command(&self.docker_bin, &args)
            }
            DrainAction::RouteIn { key, port } => {
                let args = self.routing.route_in_args(key, *port);
                self.command(&self.routing.haup, &args)
            }
        };
        self.line(&line)
    }

    async fn finish(&mut self, _timeline: &Timeline) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}
