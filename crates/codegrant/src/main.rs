//! codegrant - OAuth 2.0 authorization code grant client and mock server
//!
//! Main entry point for the codegrant CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{check, serve, token};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// codegrant - OAuth 2.0 authorization code grant client and mock server
#[derive(Parser)]
#[command(name = "codegrant")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration directory (default: the user config dir)
    #[arg(long, global = true, env = "CODEGRANT_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the mock authorization server
    Serve(serve::ServeArgs),

    /// Obtain an access token for a grant profile
    Token(token::TokenArgs),

    /// Validate the configured grant profiles and server section
    Check(check::CheckArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "codegrant=debug,codegrant_client=debug,codegrant_server=debug,codegrant_config=debug,tower_http=debug,info"
    } else {
        "codegrant=info,codegrant_client=info,codegrant_server=info,warn"
    };

    let log_dir = cli
        .config_dir
        .clone()
        .or_else(codegrant_config::xdg_config_dir)
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "codegrant.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "codegrant=trace,codegrant_client=trace,codegrant_server=trace,codegrant_config=trace,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        config_dir: cli.config_dir,
    };

    match cli.command {
        Commands::Serve(args) => serve::run(args, &ctx).await,
        Commands::Token(args) => token::run(args, &ctx).await,
        Commands::Check(args) => check::run(args, &ctx).await,
    }
}
