//! External command execution
//!
//! Every command the drain tool runs goes through [`CommandRunner`]. Each
//! invocation races three things:
//! - the child exiting (stdout and stderr are captured),
//! - a per-command deadline, after which the child is SIGKILLed,
//! - the run's cancellation token, after which the child is SIGKILLed and
//!   [`DrainError::Interrupted`] is returned.
//!
//! The child is spawned with `kill_on_drop`, so dropping the pending wait on
//! either the deadline or the cancellation path tears the process down.

use crate::error::{DrainError, Result};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Default deadline for a single external command
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for external command execution
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Deadline per command (default: 60 seconds)
    pub timeout: Duration,
    /// Prefix every command with `sudo`
    pub use_sudo: bool,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
            use_sudo: true,
        }
    }
}

/// Captured result of a successful command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl CommandOutput {
    /// Stdout and stderr joined, as an operator would see them on a terminal
    pub fn combined(&self) -> String {
        match (self.stdout.trim_end(), self.stderr.trim_end()) {
            (out, "") => out.to_string(),
            ("", err) => err.to_string(),
            (out, err) => format!("{}\n{}", out, err),
        }
    }
}

/// Assemble an argv, optionally prefixed with `sudo`
pub fn command_argv(use_sudo: bool, program: &str, args: &[String]) -> Vec<String> {
    let mut argv = Vec::with_capacity(args.len() + 2);
    if use_sudo {
        argv.push("sudo".to_string());
    }
    argv.push(program.to_string());
    argv.extend(args.iter().cloned());
    argv
}

/// Runs external commands with a deadline and cooperative cancellation
#[derive(Debug, Clone)]
pub struct CommandRunner {
    config: ExecConfig,
    cancel: CancellationToken,
}

impl CommandRunner {
    pub fn new(config: ExecConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Build the argv for a command, applying the sudo prefix
    pub fn argv(&self, program: &str, args: &[String]) -> Vec<String> {
        command_argv(self.config.use_sudo, program, args)
    }

    /// Render a command the way it would be typed in a shell
    pub fn render(&self, program: &str, args: &[String]) -> String {
        self.argv(program, args).join(" ")
    }

    /// Run a command to completion, failing on non-zero exit
    pub async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        let argv = self.argv(program, args);
        self.run_argv(&argv).await
    }

    /// Run an already assembled argv (no sudo prefix applied)
    pub async fn run_argv(&self, argv: &[String]) -> Result<CommandOutput> {
        let rendered = argv.join(" ");
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| DrainError::Spawn {
                command: rendered.clone(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            })?;

        if self.cancel.is_cancelled() {
            return Err(DrainError::Interrupted);
        }

        trace!(command = %rendered, "Spawning command");
        let start = Instant::now();

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DrainError::Spawn {
                command: rendered.clone(),
                source: e,
            })?;

        let output = tokio::select! {
            res = tokio::time::timeout(self.config.timeout, child.wait_with_output()) => match res {
                Ok(output) => output?,
                Err(_) => {
                    warn!(
                        command = %rendered,
                        timeout_secs = self.config.timeout.as_secs(),
                        "Command timed out, killed"
                    );
                    return Err(DrainError::Timeout {
                        command: rendered,
                        timeout: self.config.timeout,
                    });
                }
            },
            _ = self.cancel.cancelled() => {
                debug!(command = %rendered, "Cancellation requested, killing command");
                return Err(DrainError::Interrupted);
            }
        };

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed: start.elapsed(),
        };

        if !output.status.success() {
            let status = match output.status.code() {
                Some(code) => format!("exit code {}", code),
                None => "termination by signal".to_string(),
            };
            return Err(DrainError::ActionFailed {
                command: rendered,
                status,
                output: result.combined(),
            });
        }

        debug!(
            command = %rendered,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Command succeeded"
        );
        Ok(result)
    }
}
