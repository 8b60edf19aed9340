//! Configuration system for codegrant.
//!
//! Provides TOML-based configuration with:
//! - An optional `[server]` section describing the authorization server and
//!   the clients registered with it
//! - Named grant profiles (`[grants.default]`, `[grants.reporting]`, ...)
//!   consumed by the authorization code grant client
//! - Config file layering (user config dir + project-local overrides)
//! - Client secret resolution (env var → config file)

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, xdg_config_dir,
    xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use secrets::{ResolvedSecret, SecretSource, client_secret_env_var, resolve_client_secret};
pub use types::*;
