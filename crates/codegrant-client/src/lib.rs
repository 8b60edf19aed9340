//! OAuth 2.0 authorization code grant client.
//!
//! Obtains, caches and renews access tokens for named grant configurations.
//! Secrets are sealed with AES-256-GCM while stored and only decrypted for
//! the request that needs them.
//!
//! # Components
//!
//! - [`config`]: validated grant configuration and field validators
//! - [`credentials`]: encrypted registry of configurations and tokens
//! - [`request`]: authorization, token and refresh requests
//! - [`response`]: status handling, code extraction and token storage
//! - [`consent`]: local callback listener and browser launcher
//! - [`manager`]: [`AuthCodeGrantManager`], the entry point

pub mod config;
pub mod consent;
pub mod credentials;
pub mod error;
pub mod manager;
pub mod request;
pub mod response;
pub mod transport;

pub use config::{ConfigFieldError, GrantConfig, GrantSettings, SecretValue, generate_state};
pub use consent::{
    BrowserLauncher, CallbackParams, ConsentListener, ConsentListeners, PendingConsent,
    SharedConsentListeners, SystemBrowser,
};
pub use credentials::{
    AesGcmCipher, CredentialEntry, CredentialsManager, SecretCipher, SharedCredentials, TokenUpdate,
};
pub use error::{AuthCodeGrantFlowError, CredentialsError, GrantError, Result};
pub use manager::{AuthCodeGrantManager, RESPONSE_TYPE_CODE, TokenInfo};
pub use request::{AuthorizationQuery, RequestManager, redirect_uri};
pub use response::{FlowState, ResponseManager, TokenResponse};
pub use transport::{HttpReply, HttpTransport, ReqwestTransport, SharedTransport};

pub use codegrant_config::ConsentPromptMode;
