//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use codegrant_config::{
    ClientRegistration, DEFAULT_CODE_TTL_SECS, DEFAULT_TOKEN_TTL_SECS, DEFAULT_USER_ID,
    ServerSection,
};

use crate::error::{Result, ServerError};
use crate::store::RegisteredClient;

/// Default authorization code lifetime (10 minutes).
pub const DEFAULT_CODE_TTL: Duration = Duration::from_secs(DEFAULT_CODE_TTL_SECS);

/// Default access token lifetime (1 hour).
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(DEFAULT_TOKEN_TTL_SECS);

/// Authorization server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_address: SocketAddr,

    /// Lifetime of issued authorization codes.
    pub code_ttl: Duration,

    /// Lifetime of issued access tokens.
    pub token_ttl: Duration,

    /// Interval of the expired entry sweep. `None` disables the sweep task;
    /// expiry is still enforced on every lookup.
    pub sweep_interval: Option<Duration>,

    /// User recorded as having consented to every authorization request.
    pub default_user_id: String,

    /// Clients registered at startup.
    pub clients: Vec<RegisteredClient>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 9000)),
            code_ttl: DEFAULT_CODE_TTL,
            token_ttl: DEFAULT_TOKEN_TTL,
            sweep_interval: None,
            default_user_id: DEFAULT_USER_ID.to_string(),
            clients: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `[server]` section of the config file.
    pub fn from_section(section: &ServerSection) -> Result<Self> {
        let bind_address = section.bind_address().parse().map_err(|e| {
            ServerError::Config(format!(
                "invalid bind address '{}': {}",
                section.bind_address(),
                e
            ))
        })?;

        Ok(Self {
            bind_address,
            code_ttl: section.code_ttl(),
            token_ttl: section.token_ttl(),
            sweep_interval: section.sweep_interval(),
            default_user_id: section.default_user_id().to_string(),
            clients: section.clients.iter().map(RegisteredClient::from).collect(),
        })
    }

    /// Set the bind address.
    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Set the authorization code lifetime.
    pub fn with_code_ttl(mut self, ttl: Duration) -> Self {
        self.code_ttl = ttl;
        self
    }

    /// Set the access token lifetime.
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Enable the periodic sweep of expired codes and tokens.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Set the consenting user.
    pub fn with_default_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.default_user_id = user_id.into();
        self
    }

    /// Register a client at startup.
    pub fn with_client(mut self, client: RegisteredClient) -> Self {
        self.clients.push(client);
        self
    }
}

impl From<&ClientRegistration> for RegisteredClient {
    fn from(registration: &ClientRegistration) -> Self {
        RegisteredClient {
            client_id: registration.client_id.clone(),
            client_secret: registration.client_secret.clone(),
            redirect_uri: registration.redirect_uri.clone(),
            response_types: registration.response_types.clone(),
        }
    }
}
