//! Token command - obtains an access token for a grant profile.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;
use codegrant_client::{
    AuthCodeGrantManager, CredentialsManager, GrantSettings, ReqwestTransport, SharedTransport,
};
use codegrant_config::{ConfigError, DEFAULT_GRANT, client_secret_env_var, resolve_client_secret};
use console::{Style, style};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{Context, mask_token};

/// Arguments for the token command.
#[derive(Args, Debug)]
pub struct TokenArgs {
    /// Grant profile name (`[grants.<name>]`)
    #[arg(default_value = DEFAULT_GRANT)]
    pub grant: String,

    /// Print the full access token instead of a masked one
    #[arg(long)]
    pub show: bool,
}

/// Token output for JSON.
#[derive(Debug, Serialize)]
struct TokenOutput {
    grant: String,
    access_token: String,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
    expires_in_secs: u64,
    has_refresh_token: bool,
    scope: String,
}

/// Run the token command.
pub async fn run(args: TokenArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let profile = loaded.config.grant(&args.grant)?;

    let secret = resolve_client_secret(&args.grant, profile.client_secret.as_deref()).ok_or_else(
        || ConfigError::SecretNotFound {
            grant: args.grant.clone(),
            env_var: client_secret_env_var(&args.grant),
        },
    )?;
    tracing::debug!(grant = %args.grant, source = %secret.source, "Client secret resolved");

    let settings = GrantSettings::from_profile(profile, secret.value);
    let transport: SharedTransport = Arc::new(ReqwestTransport::new()?);

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal.cancel();
        }
    });

    let manager = AuthCodeGrantManager::from_settings(
        args.grant.clone(),
        settings,
        CredentialsManager::shared(),
        transport,
    )
    .with_context(|| format!("Invalid grant profile '{}'", args.grant))?
    .with_cancellation(cancel);

    let token = manager
        .get_access_token()
        .await
        .with_context(|| format!("Failed to obtain an access token for '{}'", args.grant))?;
    let info = manager.token_info()?;
    let shown = if args.show {
        token.clone()
    } else {
        mask_token(&token)
    };

    if ctx.json_output {
        let output = TokenOutput {
            grant: args.grant,
            access_token: shown,
            expires_at: info.expires_at,
            expires_in_secs: info.expires_in_secs,
            has_refresh_token: info.has_refresh_token,
            scope: info.scope,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let dim = Style::new().dim();
        println!();
        println!("{} {}", style("Access token for").bold(), style(&args.grant).cyan());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!("  {} {}", dim.apply_to("Token:"), shown);
        println!("  {} {}", dim.apply_to("Expires:"), info.expires_in_display());
        println!("  {} {}", dim.apply_to("Scope:"), info.scope);
        println!(
            "  {} {}",
            dim.apply_to("Refresh:"),
            if info.has_refresh_token { "yes" } else { "no" }
        );
        println!();
    }
    Ok(())
}
