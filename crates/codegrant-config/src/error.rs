//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading and resolution.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Referenced grant profile not found.
    #[error("grant profile '{0}' not found; add a [grants.{0}] section to your config")]
    GrantNotFound(String),

    /// No `[server]` section configured.
    #[error("no authorization server configured; add a [server] section to your config")]
    NoServer,

    /// Client secret not found through any resolution method.
    #[error(
        "client secret not found for grant '{grant}'. Set it via env var ({env_var}) or the config file"
    )]
    SecretNotFound { grant: String, env_var: String },
}
