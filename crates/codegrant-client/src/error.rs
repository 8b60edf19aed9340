//! Error types for the grant client.

use crate::config::ConfigFieldError;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, GrantError>;

/// Errors that can occur while configuring or running a grant.
#[derive(Debug, thiserror::Error)]
pub enum GrantError {
    /// A configuration field failed validation.
    #[error(transparent)]
    Config(#[from] ConfigFieldError),

    /// The authorization code flow failed for this attempt.
    #[error(transparent)]
    Flow(#[from] AuthCodeGrantFlowError),

    /// Credential store error.
    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for GrantError {
    fn from(e: reqwest::Error) -> Self {
        GrantError::Network(e.to_string())
    }
}

/// Terminal failures of a single authorization code flow attempt.
///
/// None of these are retried automatically: the code (or the authorization
/// attempt that produced it) is spent, so a retry has to start over at
/// `/authorize`.
#[derive(Debug, thiserror::Error)]
pub enum AuthCodeGrantFlowError {
    /// A 302 arrived without a `Location` header.
    #[error("authorization server redirected without a Location header")]
    MissingLocation,

    /// The server rejected the request (4xx).
    #[error("authorization request rejected ({status}): {}", .error.as_deref().unwrap_or("no error code"))]
    Rejected { status: u16, error: Option<String> },

    /// 5xx or an unrecognized status.
    #[error("unexpected response status {status} from authorization server")]
    UnexpectedStatus { status: u16 },

    /// The redirect did not carry an authorization code.
    #[error("authorization response did not contain a code")]
    MissingCode,

    /// The echoed `state` does not match the one sent.
    #[error("state mismatch in authorization response, possible CSRF")]
    StateMismatch,

    /// The user or server denied the authorization request.
    #[error("authorization denied: {error}")]
    Denied { error: String },

    /// The system browser could not be launched.
    #[error("failed to launch browser: {0}")]
    BrowserLaunch(#[source] std::io::Error),

    /// The local callback listener could not be started.
    #[error("failed to start callback listener on {addr}: {source}")]
    CallbackListener {
        addr: String,
        source: std::io::Error,
    },

    /// Consent was not completed before the timeout elapsed.
    #[error("consent not completed within {0:?}")]
    ConsentTimeout(std::time::Duration),

    /// Another flow is already waiting for a callback with this `state`.
    #[error("a consent for this authorization request is already pending")]
    ConsentPending,

    /// The flow was cancelled while waiting for consent.
    #[error("consent cancelled")]
    ConsentCancelled,

    /// The token endpoint rejected the exchange.
    #[error("token request rejected ({status}): {}", .error.as_deref().unwrap_or("no error code"))]
    TokenRejected { status: u16, error: Option<String> },

    /// The token endpoint answered 200 with an unusable body.
    #[error("malformed token response: {0}")]
    MalformedTokenResponse(String),

    /// Authorization query parameters do not belong to the owning config.
    #[error("authorization query field '{0}' does not match the grant configuration")]
    QueryMismatch(&'static str),

    /// A flow state transition that the state machine does not allow.
    #[error("invalid flow transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

/// Errors raised by the credential store.
#[derive(Debug, thiserror::Error)]
pub enum CredentialsError {
    /// No encryption key has been generated yet.
    #[error("credentials encryption key has not been generated")]
    KeyMissing,

    /// A key already exists; generating another would orphan existing ciphertext.
    #[error("credentials encryption key already generated")]
    KeyAlreadyGenerated,

    /// No configuration registered under this name.
    #[error("no authentication config registered as '{0}'")]
    NotRegistered(String),

    /// Encryption failed.
    #[error("failed to encrypt secret: {0}")]
    Encrypt(String),

    /// Decryption failed (bad encoding, wrong key, or tampering).
    #[error("failed to decrypt secret: {0}")]
    Decrypt(String),
}
