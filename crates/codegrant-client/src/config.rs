//! Validated grant configuration.
//!
//! [`GrantConfig`] can only be obtained through [`GrantConfig::new`], which
//! runs every field validator exactly once. A config that fails validation is
//! never constructed.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use rand::RngCore;
use url::{Host, Url};

use codegrant_config::{ConsentPromptMode, GrantProfile};

/// Minimum client secret length (RFC 6819 §5.1.4.2.2 high-entropy secrets).
pub const MIN_CLIENT_SECRET_LEN: usize = 16;

/// Minimum length of the CSRF `state` value.
pub const MIN_STATE_LEN: usize = 16;

/// Minimum length of the consent prompt key.
pub const MIN_CONSENT_PROMPT_KEY_LEN: usize = 8;

/// Maximum number of scopes a grant may request.
pub const MAX_SCOPES: usize = 10;

/// Scopes that grant blanket privileges and are never requested.
pub const DANGEROUS_SCOPES: [&str; 5] = ["*", "all", "root", "admin", "superuser"];

/// Field validation failures, one variant per field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigFieldError {
    #[error("invalid client_server_url: {0}")]
    ClientServerUrl(String),

    /// Covers both `authorization_url` and `authorization_token_url`.
    #[error("invalid {field}: {reason}")]
    AuthorizationUrl { field: &'static str, reason: String },

    #[error("invalid consent_prompt_key: {0}")]
    ConsentPromptKey(String),

    #[error("invalid client_secret: {0}")]
    ClientSecret(String),

    #[error("invalid client_id: {0}")]
    ClientId(String),

    #[error("invalid scope: {0}")]
    Scope(String),

    #[error("invalid audience: {0}")]
    Audience(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// SecretValue
// ─────────────────────────────────────────────────────────────────────────────

/// A secret field, either still in plaintext or sealed by the credential store.
#[derive(Clone, PartialEq, Eq)]
pub enum SecretValue {
    /// Not yet encrypted. Only exists between construction and first sealing.
    Plain(String),
    /// Ciphertext produced by the credential store's cipher.
    Sealed(String),
}

impl SecretValue {
    pub fn is_sealed(&self) -> bool {
        matches!(self, SecretValue::Sealed(_))
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecretValue::Plain(_) => write!(f, "Plain(***)"),
            SecretValue::Sealed(_) => write!(f, "Sealed(***)"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GrantSettings
// ─────────────────────────────────────────────────────────────────────────────

/// Raw, unvalidated grant configuration values.
#[derive(Debug, Clone)]
pub struct GrantSettings {
    pub client_id: String,
    pub client_secret: String,
    pub audience: String,
    pub scope: Vec<String>,
    pub authorization_url: String,
    pub authorization_token_url: String,
    pub client_server_url: String,
    pub redirect_endpoint: String,
    pub consent_prompt_key: String,
    pub consent_prompt_mode: ConsentPromptMode,
    pub consent_timeout: Duration,
}

impl GrantSettings {
    /// Build settings from a config file profile and its resolved secret.
    pub fn from_profile(profile: &GrantProfile, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: profile.client_id.clone(),
            client_secret: client_secret.into(),
            audience: profile.audience.clone(),
            scope: profile.scope.clone(),
            authorization_url: profile.authorization_url.clone(),
            authorization_token_url: profile.authorization_token_url.clone(),
            client_server_url: profile.client_server_url.clone(),
            redirect_endpoint: profile.redirect_endpoint().to_string(),
            consent_prompt_key: profile.consent_prompt_key.clone(),
            consent_prompt_mode: profile.consent_prompt_mode,
            consent_timeout: profile.consent_timeout(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GrantConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Validated configuration of one authorization code grant.
#[derive(Debug, Clone)]
pub struct GrantConfig {
    client_id: String,
    client_secret: SecretValue,
    audience: String,
    scope: Vec<String>,
    state: String,
    authorization_url: Url,
    authorization_token_url: Url,
    client_server_url: Url,
    redirect_endpoint: String,
    consent_prompt_key: String,
    consent_prompt_mode: ConsentPromptMode,
    consent_timeout: Duration,
    access_token: Option<SecretValue>,
    access_token_expires_in: Option<DateTime<Utc>>,
    refresh_token: Option<SecretValue>,
}

impl GrantConfig {
    /// Validate `settings` and build the config with a fresh `state`.
    pub fn new(settings: GrantSettings) -> Result<Self, ConfigFieldError> {
        let client_server_url = validate_client_server_url(&settings.client_server_url)?;
        let redirect_endpoint = validate_redirect_endpoint(&settings.redirect_endpoint)?;
        let authorization_url =
            validate_authorization_url("authorization_url", &settings.authorization_url)?;
        let authorization_token_url = validate_authorization_url(
            "authorization_token_url",
            &settings.authorization_token_url,
        )?;
        validate_consent_prompt_key(&settings.consent_prompt_key)?;
        validate_client_secret(&settings.client_secret)?;
        validate_client_id(&settings.client_id)?;
        validate_scope(&settings.scope)?;
        validate_audience(&settings.audience)?;

        let state = generate_state();
        debug_assert!(state.len() >= MIN_STATE_LEN);

        Ok(Self {
            client_id: settings.client_id,
            client_secret: SecretValue::Plain(settings.client_secret),
            audience: settings.audience,
            scope: settings.scope,
            state,
            authorization_url,
            authorization_token_url,
            client_server_url,
            redirect_endpoint,
            consent_prompt_key: settings.consent_prompt_key,
            consent_prompt_mode: settings.consent_prompt_mode,
            consent_timeout: settings.consent_timeout,
            access_token: None,
            access_token_expires_in: None,
            refresh_token: None,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &SecretValue {
        &self.client_secret
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn scope(&self) -> &[String] {
        &self.scope
    }

    /// Scopes joined with single spaces, as sent on the wire.
    pub fn scope_string(&self) -> String {
        self.scope.join(" ")
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn authorization_url(&self) -> &Url {
        &self.authorization_url
    }

    pub fn authorization_token_url(&self) -> &Url {
        &self.authorization_token_url
    }

    pub fn client_server_url(&self) -> &Url {
        &self.client_server_url
    }

    pub fn redirect_endpoint(&self) -> &str {
        &self.redirect_endpoint
    }

    /// Full redirect URI: `client_server_url` + `redirect_endpoint`.
    pub fn redirect_uri(&self) -> String {
        crate::request::redirect_uri(self.client_server_url.as_str(), &self.redirect_endpoint)
    }

    pub fn consent_prompt_key(&self) -> &str {
        &self.consent_prompt_key
    }

    pub fn consent_prompt_mode(&self) -> ConsentPromptMode {
        self.consent_prompt_mode
    }

    pub fn consent_timeout(&self) -> Duration {
        self.consent_timeout
    }

    pub fn access_token(&self) -> Option<&SecretValue> {
        self.access_token.as_ref()
    }

    pub fn access_token_expires_in(&self) -> Option<DateTime<Utc>> {
        self.access_token_expires_in
    }

    pub fn refresh_token(&self) -> Option<&SecretValue> {
        self.refresh_token.as_ref()
    }

    /// Whether an access token is present and strictly unexpired at `now`.
    pub fn credentials_valid_at(&self, now: DateTime<Utc>) -> bool {
        match (&self.access_token, self.access_token_expires_in) {
            (Some(_), Some(expires_at)) => expires_at > now,
            _ => false,
        }
    }

    /// Every secret slot, for sealing in place.
    pub(crate) fn secret_slots_mut(&mut self) -> impl Iterator<Item = &mut SecretValue> {
        std::iter::once(&mut self.client_secret)
            .chain(self.access_token.as_mut())
            .chain(self.refresh_token.as_mut())
    }

    pub(crate) fn set_tokens(
        &mut self,
        access_token: SecretValue,
        expires_at: DateTime<Utc>,
        refresh_token: Option<SecretValue>,
    ) {
        self.access_token = Some(access_token);
        self.access_token_expires_in = Some(expires_at);
        if refresh_token.is_some() {
            self.refresh_token = refresh_token;
        }
    }

    pub(crate) fn clear_tokens(&mut self) {
        self.access_token = None;
        self.access_token_expires_in = None;
        self.refresh_token = None;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Field validators
// ─────────────────────────────────────────────────────────────────────────────

/// Generate a random state string for CSRF protection.
pub fn generate_state() -> String {
    let mut state_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut state_bytes);
    URL_SAFE_NO_PAD.encode(state_bytes)
}

pub fn validate_client_id(client_id: &str) -> Result<(), ConfigFieldError> {
    if client_id.is_empty() {
        return Err(ConfigFieldError::ClientId("must not be empty".to_string()));
    }
    if client_id.trim() != client_id {
        return Err(ConfigFieldError::ClientId(
            "must not have leading or trailing whitespace".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_client_secret(client_secret: &str) -> Result<(), ConfigFieldError> {
    let len = client_secret.chars().count();
    if len < MIN_CLIENT_SECRET_LEN {
        return Err(ConfigFieldError::ClientSecret(format!(
            "must be at least {} characters (got {})",
            MIN_CLIENT_SECRET_LEN, len
        )));
    }
    Ok(())
}

pub fn validate_audience(audience: &str) -> Result<(), ConfigFieldError> {
    if audience.is_empty() {
        return Err(ConfigFieldError::Audience("must not be empty".to_string()));
    }
    if audience.chars().any(char::is_whitespace) {
        return Err(ConfigFieldError::Audience(
            "must not contain whitespace".to_string(),
        ));
    }
    if audience.contains('*') {
        return Err(ConfigFieldError::Audience(
            "wildcards are not allowed".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_scope(scope: &[String]) -> Result<(), ConfigFieldError> {
    if scope.is_empty() {
        return Err(ConfigFieldError::Scope(
            "at least one scope is required".to_string(),
        ));
    }
    if scope.len() > MAX_SCOPES {
        return Err(ConfigFieldError::Scope(format!(
            "at most {} scopes are allowed (got {})",
            MAX_SCOPES,
            scope.len()
        )));
    }

    let mut seen = HashSet::with_capacity(scope.len());
    for s in scope {
        if s.trim().is_empty() {
            return Err(ConfigFieldError::Scope(
                "scopes must not be empty or whitespace".to_string(),
            ));
        }
        // Scopes travel space-separated.
        if s.chars().any(char::is_whitespace) {
            return Err(ConfigFieldError::Scope(format!(
                "scope '{}' contains whitespace",
                s
            )));
        }
        if DANGEROUS_SCOPES.contains(&s.to_ascii_lowercase().as_str()) {
            return Err(ConfigFieldError::Scope(format!(
                "scope '{}' is too broad to request",
                s
            )));
        }
        if !seen.insert(s.as_str()) {
            return Err(ConfigFieldError::Scope(format!("duplicate scope '{}'", s)));
        }
    }
    Ok(())
}

pub fn validate_authorization_url(field: &'static str, value: &str) -> Result<Url, ConfigFieldError> {
    let fail = |reason: String| ConfigFieldError::AuthorizationUrl { field, reason };

    let url = Url::parse(value).map_err(|e| fail(e.to_string()))?;
    if url.scheme() != "https" {
        return Err(fail(format!("scheme must be https (got {})", url.scheme())));
    }
    if url.host().is_none() {
        return Err(fail("missing host".to_string()));
    }
    if url.path().is_empty() || url.path() == "/" {
        return Err(fail("must include an endpoint path".to_string()));
    }
    Ok(url)
}

pub fn validate_client_server_url(value: &str) -> Result<Url, ConfigFieldError> {
    let url = Url::parse(value).map_err(|e| ConfigFieldError::ClientServerUrl(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigFieldError::ClientServerUrl(format!(
            "scheme must be http or https (got {})",
            url.scheme()
        )));
    }
    match url.host() {
        None => Err(ConfigFieldError::ClientServerUrl("missing host".to_string())),
        Some(Host::Domain(domain)) if !is_valid_hostname(domain) => Err(
            ConfigFieldError::ClientServerUrl(format!("invalid hostname '{}'", domain)),
        ),
        Some(_) => Ok(url),
    }
}

fn validate_redirect_endpoint(endpoint: &str) -> Result<String, ConfigFieldError> {
    if !endpoint.starts_with('/') || endpoint.chars().any(char::is_whitespace) {
        return Err(ConfigFieldError::ClientServerUrl(format!(
            "redirect endpoint '{}' must be an absolute path",
            endpoint
        )));
    }
    Ok(endpoint.to_string())
}

pub fn validate_consent_prompt_key(key: &str) -> Result<(), ConfigFieldError> {
    if key.chars().any(char::is_whitespace) {
        return Err(ConfigFieldError::ConsentPromptKey(
            "must not contain whitespace".to_string(),
        ));
    }
    if key.chars().count() < MIN_CONSENT_PROMPT_KEY_LEN {
        return Err(ConfigFieldError::ConsentPromptKey(format!(
            "must be at least {} characters",
            MIN_CONSENT_PROMPT_KEY_LEN
        )));
    }
    Ok(())
}

fn is_valid_hostname(host: &str) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);
    !host.is_empty()
        && host.len() <= 253
        && host.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn settings() -> GrantSettings {
        GrantSettings {
            client_id: "c1".to_string(),
            client_secret: "S0123456789abcdef".to_string(),
            audience: "https://api.example.com".to_string(),
            scope: vec!["read".to_string(), "write".to_string()],
            authorization_url: "https://auth.example.com/oauth/authorize".to_string(),
            authorization_token_url: "https://auth.example.com/oauth/token".to_string(),
            client_server_url: "http://localhost:8765".to_string(),
            redirect_endpoint: "/callback".to_string(),
            consent_prompt_key: "consent-key".to_string(),
            consent_prompt_mode: ConsentPromptMode::Api,
            consent_timeout: Duration::from_secs(30),
        }
    }

    fn scopes(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_valid_config_round_trips() {
        let config = GrantConfig::new(settings()).unwrap();
        assert_eq!(config.client_id(), "c1");
        assert_eq!(config.audience(), "https://api.example.com");
        assert_eq!(config.scope(), ["read", "write"]);
        assert_eq!(config.scope_string(), "read write");
        assert_eq!(config.authorization_url().path(), "/oauth/authorize");
        assert_eq!(config.authorization_token_url().path(), "/oauth/token");
        assert_eq!(config.consent_prompt_key(), "consent-key");
        assert_eq!(config.consent_prompt_mode(), ConsentPromptMode::Api);
        assert_eq!(config.redirect_uri(), "http://localhost:8765/callback");
        assert_eq!(
            config.client_secret(),
            &SecretValue::Plain("S0123456789abcdef".to_string())
        );
        assert!(config.access_token().is_none());
        assert!(config.refresh_token().is_none());
    }

    #[test]
    fn test_state_is_random_and_long_enough() {
        let a = GrantConfig::new(settings()).unwrap();
        let b = GrantConfig::new(settings()).unwrap();
        assert!(a.state().len() >= MIN_STATE_LEN);
        assert_ne!(a.state(), b.state());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = GrantConfig::new(settings()).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("S0123456789abcdef"));
        assert!(debug.contains("Plain(***)"));
    }

    #[test]
    fn test_client_id() {
        assert!(validate_client_id("c1").is_ok());
        assert!(validate_client_id("my-client.id").is_ok());
        for bad in ["", " c1", "c1 ", "\tc1"] {
            assert!(
                matches!(validate_client_id(bad), Err(ConfigFieldError::ClientId(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_client_secret() {
        assert!(validate_client_secret("0123456789abcdef").is_ok());
        assert!(matches!(
            validate_client_secret("0123456789abcde"),
            Err(ConfigFieldError::ClientSecret(_))
        ));
        assert!(matches!(
            validate_client_secret(""),
            Err(ConfigFieldError::ClientSecret(_))
        ));
    }

    #[test]
    fn test_audience() {
        assert!(validate_audience("https://api.example.com").is_ok());
        assert!(validate_audience("billing-api").is_ok());
        for bad in ["", "billing api", "https://*.example.com", "*"] {
            assert!(
                matches!(validate_audience(bad), Err(ConfigFieldError::Audience(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_scope_valid() {
        assert!(validate_scope(&scopes(&["read"])).is_ok());
        assert!(validate_scope(&scopes(&["read", "write", "openid"])).is_ok());
        let ten: Vec<String> = (0..10).map(|i| format!("s{}", i)).collect();
        assert!(validate_scope(&ten).is_ok());
    }

    #[test]
    fn test_scope_invalid() {
        let eleven: Vec<String> = (0..11).map(|i| format!("s{}", i)).collect();
        let cases = vec![
            scopes(&[]),
            scopes(&["read", "read"]),
            scopes(&["*"]),
            scopes(&["read", "all"]),
            scopes(&["root"]),
            scopes(&["Admin"]),
            scopes(&["superuser"]),
            scopes(&[""]),
            scopes(&["   "]),
            scopes(&["read write"]),
            eleven,
        ];
        for case in cases {
            assert!(
                matches!(validate_scope(&case), Err(ConfigFieldError::Scope(_))),
                "{case:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_authorization_urls() {
        assert!(validate_authorization_url("authorization_url", "https://a.example/authorize").is_ok());
        for bad in [
            "http://a.example/authorize",
            "https://a.example",
            "https://a.example/",
            "not a url",
        ] {
            assert!(
                matches!(
                    validate_authorization_url("authorization_url", bad),
                    Err(ConfigFieldError::AuthorizationUrl { field: "authorization_url", .. })
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_token_url_error_names_field() {
        let mut s = settings();
        s.authorization_token_url = "http://auth.example.com/oauth/token".to_string();
        let err = GrantConfig::new(s).unwrap_err();
        assert_eq!(
            err,
            ConfigFieldError::AuthorizationUrl {
                field: "authorization_token_url",
                reason: "scheme must be https (got http)".to_string(),
            }
        );
    }

    #[test]
    fn test_client_server_url() {
        for good in [
            "http://localhost:8765",
            "https://app.example.com",
            "http://127.0.0.1:9000",
            "http://[::1]:9000",
        ] {
            assert!(validate_client_server_url(good).is_ok(), "{good:?} should pass");
        }
        for bad in [
            "ftp://app.example.com",
            "app.example.com",
            "http://-bad-.example.com",
            "http://under_score.example.com",
            "file:///tmp/x",
        ] {
            assert!(
                matches!(
                    validate_client_server_url(bad),
                    Err(ConfigFieldError::ClientServerUrl(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_consent_prompt_key() {
        assert!(validate_consent_prompt_key("consent-key").is_ok());
        for bad in ["short", "consent key", " consentkey", "consentkey\n", ""] {
            assert!(
                matches!(
                    validate_consent_prompt_key(bad),
                    Err(ConfigFieldError::ConsentPromptKey(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_redirect_endpoint_must_be_absolute() {
        let mut s = settings();
        s.redirect_endpoint = "callback".to_string();
        assert!(matches!(
            GrantConfig::new(s),
            Err(ConfigFieldError::ClientServerUrl(_))
        ));
    }

    #[test]
    fn test_construction_fails_on_any_bad_field() {
        let mut s = settings();
        s.scope = scopes(&["admin"]);
        assert!(matches!(GrantConfig::new(s), Err(ConfigFieldError::Scope(_))));

        let mut s = settings();
        s.client_secret = "short".to_string();
        assert!(matches!(
            GrantConfig::new(s),
            Err(ConfigFieldError::ClientSecret(_))
        ));
    }

    #[test]
    fn test_credentials_valid_strictly_before_expiry() {
        let mut config = GrantConfig::new(settings()).unwrap();
        let now = Utc::now();
        assert!(!config.credentials_valid_at(now));

        config.set_tokens(
            SecretValue::Plain("t".to_string()),
            now,
            None,
        );
        assert!(config.credentials_valid_at(now - chrono::Duration::seconds(1)));
        assert!(!config.credentials_valid_at(now));
        assert!(!config.credentials_valid_at(now + chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_set_tokens_keeps_refresh_when_absent() {
        let mut config = GrantConfig::new(settings()).unwrap();
        let now = Utc::now();
        config.set_tokens(
            SecretValue::Plain("a1".to_string()),
            now,
            Some(SecretValue::Plain("r1".to_string())),
        );
        config.set_tokens(SecretValue::Plain("a2".to_string()), now, None);
        assert_eq!(
            config.refresh_token(),
            Some(&SecretValue::Plain("r1".to_string()))
        );

        config.clear_tokens();
        assert!(config.access_token().is_none());
        assert!(config.refresh_token().is_none());
        assert!(config.access_token_expires_in().is_none());
    }
}
