//! Serve command - runs the mock authorization server.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use codegrant_server::{AuthorizationServer, ServerConfig};
use console::style;
use tokio_util::sync::CancellationToken;

use super::Context;

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind (overrides `[server].bind_address`)
    #[arg(short, long)]
    pub bind: Option<SocketAddr>,

    /// Sweep expired codes and tokens every N seconds
    #[arg(long, value_name = "SECS")]
    pub sweep_interval: Option<u64>,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let section = loaded.config.server()?;

    let mut config = ServerConfig::from_section(section)?;
    if let Some(bind) = args.bind {
        config = config.with_bind_address(bind);
    }
    if let Some(secs) = args.sweep_interval.filter(|secs| *secs > 0) {
        config = config.with_sweep_interval(Duration::from_secs(secs));
    }

    if !ctx.json_output {
        println!(
            "{} http://{} ({} client{})",
            style("Authorization server").bold(),
            config.bind_address,
            config.clients.len(),
            if config.clients.len() == 1 { "" } else { "s" }
        );
    }

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                signal.cancel();
            }
            Err(e) => tracing::warn!("Failed to listen for ctrl-c: {}", e),
        }
    });

    AuthorizationServer::new(config)
        .run(shutdown)
        .await
        .context("Authorization server failed")?;
    Ok(())
}
