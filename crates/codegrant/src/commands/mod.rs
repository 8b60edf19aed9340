//! CLI command handlers.

pub mod check;
pub mod serve;
pub mod token;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use codegrant_config::LoadedConfig;
use console::style;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Overrides the user config directory.
    pub config_dir: Option<PathBuf>,
}

impl Context {
    /// Load the layered configuration, reporting warnings on stderr.
    pub fn load_config(&self) -> Result<LoadedConfig> {
        let project_dir = std::env::current_dir().ok();
        let loaded = codegrant_config::load_config_with_options(
            project_dir.as_deref(),
            self.config_dir.as_deref(),
        )
        .context("Failed to load configuration")?;

        for warning in &loaded.warnings {
            eprintln!("{} {}", style("warning:").yellow().bold(), warning);
        }
        if self.verbose {
            for path in loaded.loaded_from() {
                eprintln!("{} {}", style("loaded:").dim(), path.display());
            }
        }
        Ok(loaded)
    }
}

/// Shorten a token for display: first and last four characters.
pub fn mask_token(token: &str) -> String {
    let count = token.chars().count();
    if count <= 12 {
        return "*".repeat(count);
    }
    let head: String = token.chars().take(4).collect();
    let tail: String = token.chars().skip(count - 4).collect();
    format!("{}...{}", head, tail)
}
