//! Orchestration of the authorization code grant.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::{GrantConfig, GrantSettings};
use crate::consent::{BrowserLauncher, SharedConsentListeners};
use crate::credentials::SharedCredentials;
use crate::error::{AuthCodeGrantFlowError, Result};
use crate::request::RequestManager;
use crate::response::{FlowState, ResponseManager};
use crate::transport::SharedTransport;

/// `response_type` of the authorization code grant.
pub const RESPONSE_TYPE_CODE: &str = "code";

/// Token status for display.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub expires_at: Option<DateTime<Utc>>,
    pub expires_in_secs: u64,
    pub is_expired: bool,
    pub has_refresh_token: bool,
    pub scope: String,
}

impl TokenInfo {
    pub fn expires_in_display(&self) -> String {
        if self.expires_at.is_none() {
            "No token (will authorize on next use)".to_string()
        } else if self.is_expired {
            "Expired (will refresh on next use)".to_string()
        } else {
            let hours = self.expires_in_secs / 3600;
            let minutes = (self.expires_in_secs % 3600) / 60;
            format!("{}h {}m", hours, minutes)
        }
    }
}

/// Obtains access tokens for one registered grant configuration.
///
/// Tokens are served from the credential store while valid, renewed with the
/// refresh token when possible, and otherwise obtained through a full
/// authorization code flow. Refreshes of the same configuration are
/// serialized; a caller that waited for another's refresh reuses its result.
#[derive(Debug)]
pub struct AuthCodeGrantManager {
    name: String,
    credentials: SharedCredentials,
    requests: RequestManager,
    responses: ResponseManager,
    last_flow_state: Mutex<FlowState>,
}

impl AuthCodeGrantManager {
    /// Register `config` under `name` and seal its secrets.
    ///
    /// The store's encryption key is generated if it does not exist yet.
    pub fn new(
        name: impl Into<String>,
        config: GrantConfig,
        credentials: SharedCredentials,
        transport: SharedTransport,
    ) -> Result<Self> {
        let name = name.into();
        credentials.ensure_encryption_key();
        credentials.register(name.clone(), config);
        credentials.encrypt_authentication_configs()?;

        tracing::debug!(config = %name, "Authorization code grant manager created");
        Ok(Self {
            name,
            responses: ResponseManager::new(credentials.clone()),
            credentials,
            requests: RequestManager::new(transport),
            last_flow_state: Mutex::new(FlowState::Idle),
        })
    }

    /// Validate `settings` and create a manager for them.
    pub fn from_settings(
        name: impl Into<String>,
        settings: GrantSettings,
        credentials: SharedCredentials,
        transport: SharedTransport,
    ) -> Result<Self> {
        let config = GrantConfig::new(settings)?;
        Self::new(name, config, credentials, transport)
    }

    /// Use `browser` for browser-mode consent.
    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.responses = self.responses.with_browser(browser);
        self
    }

    /// Share callback listeners with other managers redirecting to the same address.
    pub fn with_consent_listeners(mut self, listeners: SharedConsentListeners) -> Self {
        self.responses = self.responses.with_consent_listeners(listeners);
        self
    }

    /// Cancel pending consent waits when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.responses = self.responses.with_cancellation(cancel);
        self
    }

    /// Name the configuration is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// State reached by the most recent full authorization flow.
    pub fn flow_state(&self) -> FlowState {
        *self.last_flow_state.lock()
    }

    /// Current configuration snapshot, secrets sealed.
    pub fn config(&self) -> Result<GrantConfig> {
        Ok(self.credentials.get_authentication_config(&self.name)?)
    }

    /// Whether an access token is stored and has not expired.
    pub fn validate_authentication_credentials(&self) -> bool {
        self.credentials
            .get_authentication_config(&self.name)
            .map(|config| config.credentials_valid_at(Utc::now()))
            .unwrap_or(false)
    }

    /// Return a valid access token, refreshing or authorizing as needed.
    pub async fn get_access_token(&self) -> Result<String> {
        let config = self.config()?;
        if config.credentials_valid_at(Utc::now())
            && let Some(token) = config.access_token()
        {
            tracing::debug!(config = %self.name, "Using cached access token");
            return Ok(self.credentials.decrypt_value(token)?);
        }

        if config.refresh_token().is_some() {
            match self.get_access_token_with_refresh_token().await {
                Ok(Some(token)) => return Ok(token),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        config = %self.name,
                        error = %e,
                        "Token refresh failed, starting a new authorization"
                    );
                }
            }
        }

        self.run_authorization_code_flow().await
    }

    /// Renew the access token with the stored refresh token.
    ///
    /// Returns `Ok(None)` when no refresh token is stored. Only one refresh
    /// per configuration runs at a time; a caller that waited finds the
    /// renewed token and returns it without another round trip.
    pub async fn get_access_token_with_refresh_token(&self) -> Result<Option<String>> {
        let entry = self.credentials.entry(&self.name)?;
        let _gate = entry.refresh_gate().lock().await;

        let config = entry.snapshot();
        if config.credentials_valid_at(Utc::now())
            && let Some(token) = config.access_token()
        {
            tracing::debug!(config = %self.name, "Token refreshed by a concurrent caller");
            return Ok(Some(self.credentials.decrypt_value(token)?));
        }
        let Some(refresh_token) = config.refresh_token() else {
            return Ok(None);
        };

        tracing::info!(config = %self.name, "Access token expired, refreshing");
        let refresh_token = self.credentials.decrypt_value(refresh_token)?;
        let client_secret = self.credentials.decrypt_value(config.client_secret())?;
        let reply = self
            .requests
            .send_refresh_request(&config, &client_secret, &refresh_token)
            .await?;
        self.responses.process_token_response(&reply, &self.name)?;

        if !self.validate_authentication_credentials() {
            return Err(AuthCodeGrantFlowError::MalformedTokenResponse(
                "refreshed access token is already expired".to_string(),
            )
            .into());
        }
        tracing::info!(config = %self.name, "Access token refreshed");
        self.stored_access_token().map(Some)
    }

    /// Run the full flow: authorize, obtain the code, exchange it.
    ///
    /// One flow per configuration runs at a time; a caller that waited
    /// returns the token the finished flow stored.
    async fn run_authorization_code_flow(&self) -> Result<String> {
        let entry = self.credentials.entry(&self.name)?;
        let _gate = entry.flow_gate().lock().await;
        if self.validate_authentication_credentials() {
            tracing::debug!(config = %self.name, "Authorized by a concurrent caller");
            return self.stored_access_token();
        }

        *self.last_flow_state.lock() = FlowState::Idle;
        let mut state = FlowState::Idle;

        let outcome = self.authorize_and_exchange(&mut state).await;
        if let Err(e) = &outcome {
            state = state.advance(FlowState::Failed).unwrap_or(FlowState::Failed);
            self.publish(state);
            tracing::warn!(config = %self.name, error = %e, "Authorization code flow failed");
        }
        outcome
    }

    async fn authorize_and_exchange(&self, state: &mut FlowState) -> Result<String> {
        let config = self.config()?;
        tracing::info!(
            config = %self.name,
            mode = %config.consent_prompt_mode(),
            "Starting authorization code flow"
        );

        let query = RequestManager::construct_authorization_query_params(
            &config,
            RESPONSE_TYPE_CODE,
            config.consent_prompt_key(),
        )?;
        let reply = self
            .requests
            .send_authorization_request(config.authorization_url(), &query)
            .await?;
        self.step(state, FlowState::Redirected)?;

        let code = self
            .responses
            .handle_auth_code_grant_response_codes(&reply, &config)
            .await?;
        self.step(state, FlowState::CodeExtracted)?;

        let client_secret = self.credentials.decrypt_value(config.client_secret())?;
        let reply = self
            .requests
            .send_token_request(
                &config,
                &client_secret,
                config.client_server_url().as_str(),
                config.redirect_endpoint(),
                &code,
            )
            .await?;
        self.responses.process_token_response(&reply, &self.name)?;
        self.step(state, FlowState::TokenExchanged)?;

        tracing::info!(config = %self.name, "Authorization code flow completed");
        self.stored_access_token()
    }

    fn step(&self, state: &mut FlowState, next: FlowState) -> Result<()> {
        *state = state.advance(next)?;
        self.publish(*state);
        Ok(())
    }

    fn publish(&self, state: FlowState) {
        *self.last_flow_state.lock() = state;
    }

    fn stored_access_token(&self) -> Result<String> {
        let config = self.config()?;
        let token = config.access_token().ok_or_else(|| {
            AuthCodeGrantFlowError::MalformedTokenResponse("no access token stored".to_string())
        })?;
        Ok(self.credentials.decrypt_value(token)?)
    }

    /// Forget the stored tokens; the next call authorizes again.
    pub fn logout(&self) -> Result<()> {
        self.credentials.clear_tokens(&self.name)?;
        tracing::info!(config = %self.name, "Tokens cleared");
        Ok(())
    }

    /// Expiry information about the stored token.
    pub fn token_info(&self) -> Result<TokenInfo> {
        let config = self.config()?;
        let now = Utc::now();
        let expires_at = config.access_token_expires_in();
        let expires_in_secs = expires_at
            .map(|at| (at - now).num_seconds().max(0) as u64)
            .unwrap_or(0);

        Ok(TokenInfo {
            expires_at,
            expires_in_secs,
            is_expired: !config.credentials_valid_at(now),
            has_refresh_token: config.refresh_token().is_some(),
            scope: config.scope_string(),
        })
    }
}
