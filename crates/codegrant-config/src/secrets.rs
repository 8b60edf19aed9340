//! Secrets management: client secret retrieval.
//!
//! Resolution order:
//! 1. Environment variable (`CODEGRANT_<GRANT>_CLIENT_SECRET`)
//! 2. Config file (with warning)

/// Result of client secret resolution with provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    /// The secret value.
    pub value: String,
    /// Where the secret was found.
    pub source: SecretSource,
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Environment variable.
    EnvVar(String),
    /// Config file (plaintext, not recommended).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// Environment variable holding the client secret for a grant profile.
///
/// The grant name is upper-cased and every non-alphanumeric character becomes
/// an underscore, so `reporting-eu` reads `CODEGRANT_REPORTING_EU_CLIENT_SECRET`.
pub fn client_secret_env_var(grant: &str) -> String {
    let name: String = grant
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("CODEGRANT_{}_CLIENT_SECRET", name)
}

/// Resolve the client secret for a grant profile.
///
/// Checks the grant's environment variable first, then the config file value.
pub fn resolve_client_secret(grant: &str, config_value: Option<&str>) -> Option<ResolvedSecret> {
    let env_var = client_secret_env_var(grant);
    if let Ok(value) = std::env::var(&env_var)
        && !value.is_empty()
    {
        return Some(ResolvedSecret {
            value,
            source: SecretSource::EnvVar(env_var),
        });
    }

    config_value
        .filter(|v| !v.is_empty())
        .map(|v| ResolvedSecret {
            value: v.to_string(),
            source: SecretSource::ConfigFile,
        })
}
