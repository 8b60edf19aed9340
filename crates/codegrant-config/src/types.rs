//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [server]                  # authorization server settings
//! [[server.clients]]        # clients registered with the server
//! [grants.default]          # default grant profile
//! [grants.reporting]        # named grant profiles
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bind address for the authorization server.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:9000";

/// Default lifetime of an authorization code (10 minutes).
pub const DEFAULT_CODE_TTL_SECS: u64 = 600;

/// Default lifetime of an access token (1 hour).
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

/// Default path on the client server that receives the authorization redirect.
pub const DEFAULT_REDIRECT_ENDPOINT: &str = "/callback";

/// Default time a browser consent may take before the flow gives up.
pub const DEFAULT_CONSENT_TIMEOUT_SECS: u64 = 300;

/// Default user that consents on the authorization server.
pub const DEFAULT_USER_ID: &str = "local-user";

/// Name of the grant profile used when none is given.
pub const DEFAULT_GRANT: &str = "default";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegrantConfig {
    /// Authorization server configuration.
    pub server: Option<ServerSection>,

    /// Named grant profiles (`[grants.<name>]`).
    pub grants: BTreeMap<String, GrantProfile>,
}

impl CodegrantConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> crate::Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: CodegrantConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }

        for (name, profile) in other.grants {
            self.grants.insert(name, profile);
        }
    }

    /// Look up a grant profile by name.
    pub fn grant(&self, name: &str) -> crate::Result<&GrantProfile> {
        self.grants
            .get(name)
            .ok_or_else(|| crate::ConfigError::GrantNotFound(name.to_string()))
    }

    /// The `[server]` section, or an error if it is missing.
    pub fn server(&self) -> crate::Result<&ServerSection> {
        self.server.as_ref().ok_or(crate::ConfigError::NoServer)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// Authorization server configuration (`[server]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address to bind, e.g. `127.0.0.1:9000`.
    pub bind_address: Option<String>,

    /// Authorization code lifetime in seconds.
    pub code_ttl_secs: Option<u64>,

    /// Access token lifetime in seconds.
    pub token_ttl_secs: Option<u64>,

    /// Interval of the expired-entry sweep in seconds. Unset disables the sweep;
    /// expiry is still enforced on every lookup.
    pub sweep_interval_secs: Option<u64>,

    /// User recorded as having consented to every authorization request.
    pub default_user_id: Option<String>,

    /// Registered clients.
    pub clients: Vec<ClientRegistration>,
}

impl ServerSection {
    /// Effective bind address.
    pub fn bind_address(&self) -> &str {
        self.bind_address.as_deref().unwrap_or(DEFAULT_BIND_ADDRESS)
    }

    /// Effective authorization code lifetime.
    pub fn code_ttl(&self) -> Duration {
        Duration::from_secs(self.code_ttl_secs.unwrap_or(DEFAULT_CODE_TTL_SECS))
    }

    /// Effective access token lifetime.
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs.unwrap_or(DEFAULT_TOKEN_TTL_SECS))
    }

    /// Sweep interval, if the periodic sweep is enabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Effective consenting user.
    pub fn default_user_id(&self) -> &str {
        self.default_user_id.as_deref().unwrap_or(DEFAULT_USER_ID)
    }
}

/// A client registered with the authorization server (`[[server.clients]]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: String,
    /// The only redirect URI accepted for this client (exact match).
    pub redirect_uri: String,
    /// Response types the client may request at `/oauth/authorize`.
    #[serde(default = "default_response_types")]
    pub response_types: Vec<String>,
}

fn default_response_types() -> Vec<String> {
    vec!["code".to_string()]
}

// ─────────────────────────────────────────────────────────────────────────────
// Grant profiles
// ─────────────────────────────────────────────────────────────────────────────

/// How the user consent step is driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentPromptMode {
    /// Open the system browser and wait for the redirect on the local callback.
    #[default]
    #[serde(alias = "BROWSER")]
    Browser,
    /// Read the code directly from the authorization server's response.
    #[serde(alias = "API")]
    Api,
}

impl fmt::Display for ConsentPromptMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsentPromptMode::Browser => write!(f, "browser"),
            ConsentPromptMode::Api => write!(f, "api"),
        }
    }
}

/// Raw grant profile as written in the config file (`[grants.<name>]`).
///
/// Values are not validated here; the grant client validates them once when
/// it builds its typed configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrantProfile {
    pub client_id: String,
    /// Client secret. Prefer the `CODEGRANT_<NAME>_CLIENT_SECRET` env var.
    pub client_secret: Option<String>,
    pub audience: String,
    pub scope: Vec<String>,
    pub authorization_url: String,
    pub authorization_token_url: String,
    pub client_server_url: String,
    /// Path on `client_server_url` receiving the redirect.
    pub redirect_endpoint: Option<String>,
    pub consent_prompt_key: String,
    pub consent_prompt_mode: ConsentPromptMode,
    /// Seconds to wait for browser consent.
    pub consent_timeout_secs: Option<u64>,
}

impl GrantProfile {
    /// Effective redirect endpoint.
    pub fn redirect_endpoint(&self) -> &str {
        self.redirect_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_REDIRECT_ENDPOINT)
    }

    /// Effective consent timeout.
    pub fn consent_timeout(&self) -> Duration {
        Duration::from_secs(
            self.consent_timeout_secs
                .unwrap_or(DEFAULT_CONSENT_TIMEOUT_SECS),
        )
    }

    /// Whether the profile carries its secret in plaintext.
    pub fn has_plaintext_secret(&self) -> bool {
        self.client_secret.as_deref().is_some_and(|s| !s.is_empty())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
