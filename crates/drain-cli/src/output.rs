//! Output formatting utilities

use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use drain_lib::DrainMetrics;
use std::path::Path;

/// Output format for the drain plan
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Shell script (default)
    #[default]
    Script,
    /// JSON timeline
    Json,
}

/// Print a success message
pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Write metrics in the text exposition format, replacing the file atomically
///
/// The file is written next to its destination and renamed, so a textfile
/// collector never reads a partial file.
pub fn write_metrics_textfile(path: &Path, metrics: &DrainMetrics) -> Result<()> {
    let text = metrics.render_text().context("Failed to render metrics")?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, text)
        .with_context(|| format!("Failed to write {}", Path::new(&tmp).display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move metrics into {}", path.display()))?;
    Ok(())
}
