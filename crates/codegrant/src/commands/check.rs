//! Check command - validates grant profiles and the server section.

use anyhow::{Result, bail};
use clap::Args;
use codegrant_client::{GrantConfig, GrantSettings};
use codegrant_config::{CodegrantConfig, client_secret_env_var, resolve_client_secret};
use codegrant_server::ServerConfig;
use console::{Style, style};
use serde::Serialize;

use super::Context;

/// Arguments for the check command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Only check this grant profile
    pub grant: Option<String>,
}

/// Outcome of one checked section.
#[derive(Debug, Serialize)]
struct CheckResult {
    section: String,
    ok: bool,
    detail: String,
}

/// Run the check command.
pub async fn run(args: CheckArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let results = check_config(&loaded.config, args.grant.as_deref())?;
    let failed = results.iter().filter(|r| !r.ok).count();

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        let green = Style::new().green();
        let red = Style::new().red();
        let dim = Style::new().dim();

        println!();
        println!("{}", style("Configuration check").bold());
        println!("{}", dim.apply_to("─".repeat(40)));
        if results.is_empty() {
            println!("  {}", dim.apply_to("nothing configured"));
        }
        for result in &results {
            if result.ok {
                println!("  {} {} {}", green.apply_to("✓"), result.section, dim.apply_to(&result.detail));
            } else {
                println!("  {} {} {}", red.apply_to("✗"), result.section, result.detail);
            }
        }
        println!();
    }

    if failed > 0 {
        bail!("{} section(s) failed validation", failed);
    }
    Ok(())
}

fn check_config(config: &CodegrantConfig, only: Option<&str>) -> Result<Vec<CheckResult>> {
    let mut results = Vec::new();

    let names: Vec<&str> = match only {
        Some(name) => {
            config.grant(name)?;
            vec![name]
        }
        None => config.grants.keys().map(String::as_str).collect(),
    };

    for name in names {
        let section = format!("grants.{}", name);
        let profile = config.grant(name)?;
        let Some(secret) = resolve_client_secret(name, profile.client_secret.as_deref()) else {
            results.push(CheckResult {
                section,
                ok: false,
                detail: format!("no client secret (set {})", client_secret_env_var(name)),
            });
            continue;
        };

        let result = match GrantConfig::new(GrantSettings::from_profile(profile, secret.value)) {
            Ok(grant) => CheckResult {
                section,
                ok: true,
                detail: format!(
                    "{} consent, secret from {}, redirect {}",
                    grant.consent_prompt_mode(),
                    secret.source,
                    grant.redirect_uri()
                ),
            },
            Err(e) => CheckResult {
                section,
                ok: false,
                detail: e.to_string(),
            },
        };
        results.push(result);
    }

    if only.is_none()
        && let Some(server) = &config.server
    {
        let result = match ServerConfig::from_section(server) {
            Ok(server) => CheckResult {
                section: "server".to_string(),
                ok: true,
                detail: format!(
                    "{} with {} client(s)",
                    server.bind_address,
                    server.clients.len()
                ),
            },
            Err(e) => CheckResult {
                section: "server".to_string(),
                ok: false,
                detail: e.to_string(),
            },
        };
        results.push(result);
    }

    Ok(results)
}
