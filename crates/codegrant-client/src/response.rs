//! Interpreting authorization and token responses.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use codegrant_config::ConsentPromptMode;

use crate::config::GrantConfig;
use crate::consent::{
    BrowserLauncher, CallbackParams, ConsentListeners, SharedConsentListeners, SystemBrowser,
};
use crate::credentials::{SharedCredentials, TokenUpdate};
use crate::error::{AuthCodeGrantFlowError, Result};
use crate::transport::HttpReply;

/// 4xx statuses the authorization endpoint uses to reject a request.
const REJECTED_STATUSES: [u16; 7] = [400, 401, 403, 404, 405, 422, 429];

// ============================================================================
// Flow state
// ============================================================================

/// Progress of a single authorization code flow attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowState {
    #[default]
    Idle,
    Redirected,
    CodeExtracted,
    TokenExchanged,
    Failed,
}

impl FlowState {
    pub fn name(&self) -> &'static str {
        match self {
            FlowState::Idle => "idle",
            FlowState::Redirected => "redirected",
            FlowState::CodeExtracted => "code_extracted",
            FlowState::TokenExchanged => "token_exchanged",
            FlowState::Failed => "failed",
        }
    }

    /// `TokenExchanged` and `Failed` end the attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowState::TokenExchanged | FlowState::Failed)
    }

    /// Move to `next`, rejecting transitions that skip or repeat a step.
    pub fn advance(self, next: FlowState) -> std::result::Result<FlowState, AuthCodeGrantFlowError> {
        let allowed = matches!(
            (self, next),
            (FlowState::Idle, FlowState::Redirected)
                | (FlowState::Redirected, FlowState::CodeExtracted)
                | (FlowState::CodeExtracted, FlowState::TokenExchanged)
                | (
                    FlowState::Idle | FlowState::Redirected | FlowState::CodeExtracted,
                    FlowState::Failed
                )
        );
        if allowed {
            Ok(next)
        } else {
            Err(AuthCodeGrantFlowError::InvalidTransition {
                from: self.name(),
                to: next.name(),
            })
        }
    }
}

impl std::fmt::Display for FlowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Token response
// ============================================================================

/// Successful token endpoint body (RFC 6749 §5.1).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    fn expires_at(&self, now: DateTime<Utc>) -> std::result::Result<DateTime<Utc>, AuthCodeGrantFlowError> {
        i64::try_from(self.expires_in)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                AuthCodeGrantFlowError::MalformedTokenResponse(format!(
                    "expires_in out of range: {}",
                    self.expires_in
                ))
            })
    }
}

// ============================================================================
// ResponseManager
// ============================================================================

/// Turns HTTP replies into authorization codes and stored tokens.
#[derive(Debug, Clone)]
pub struct ResponseManager {
    credentials: SharedCredentials,
    browser: Arc<dyn BrowserLauncher>,
    listeners: SharedConsentListeners,
    cancel: CancellationToken,
}

impl ResponseManager {
    pub fn new(credentials: SharedCredentials) -> Self {
        Self {
            credentials,
            browser: Arc::new(SystemBrowser),
            listeners: ConsentListeners::shared(),
            cancel: CancellationToken::new(),
        }
    }

    /// Use `browser` instead of the system browser for consent.
    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    /// Take callback listeners from `listeners`, shared with other managers.
    pub fn with_consent_listeners(mut self, listeners: SharedConsentListeners) -> Self {
        self.listeners = listeners;
        self
    }

    /// Abort pending consent waits when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Obtain the authorization code from the `/authorize` reply.
    ///
    /// A 302 is followed according to the consent mode: in API mode the code
    /// is read from the `Location` query, in browser mode the user is sent to
    /// `Location` and the code arrives on the local callback. A 200 carries
    /// the code in its JSON body (API mode) or is a consent page to open in
    /// the browser.
    pub async fn handle_auth_code_grant_response_codes(
        &self,
        reply: &HttpReply,
        config: &GrantConfig,
    ) -> Result<String> {
        match reply.status {
            302 => {
                let location = reply
                    .location
                    .as_deref()
                    .ok_or(AuthCodeGrantFlowError::MissingLocation)?;
                match config.consent_prompt_mode() {
                    ConsentPromptMode::Api => extract_code_from_redirect(location, config.state()),
                    ConsentPromptMode::Browser => self.consent_in_browser(location, config).await,
                }
            }
            200 => match config.consent_prompt_mode() {
                ConsentPromptMode::Api => extract_code_from_body(reply, config.state()),
                ConsentPromptMode::Browser => self.consent_in_browser(&reply.url, config).await,
            },
            status if REJECTED_STATUSES.contains(&status) => {
                Err(AuthCodeGrantFlowError::Rejected {
                    status,
                    error: reply.oauth_error(),
                }
                .into())
            }
            status => Err(AuthCodeGrantFlowError::UnexpectedStatus { status }.into()),
        }
    }

    async fn consent_in_browser(&self, location: &str, config: &GrantConfig) -> Result<String> {
        // Callbacks are matched on the redirect URI's full path, base path included.
        let callback_path = Url::parse(&config.redirect_uri())
            .map(|uri| uri.path().to_string())
            .unwrap_or_else(|_| config.redirect_endpoint().to_string());
        let listener = self.listeners.listener(config.client_server_url()).await?;
        let mut pending = listener.await_state(&callback_path, config.state())?;
        drop(listener);

        self.browser
            .open(location)
            .map_err(AuthCodeGrantFlowError::BrowserLaunch)?;
        tracing::info!(
            callback = %pending.local_addr(),
            timeout_secs = config.consent_timeout().as_secs(),
            "Waiting for consent in the browser"
        );

        let timeout = config.consent_timeout();
        let params = tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(AuthCodeGrantFlowError::ConsentCancelled.into());
            }
            outcome = tokio::time::timeout(timeout, pending.callback()) => match outcome {
                Err(_) => return Err(AuthCodeGrantFlowError::ConsentTimeout(timeout).into()),
                Ok(None) => return Err(AuthCodeGrantFlowError::ConsentCancelled.into()),
                Ok(Some(params)) => params,
            },
        };
        drop(pending);

        code_from_params(params, config.state())
    }

    /// Validate a token endpoint reply and store its tokens under `name`.
    ///
    /// Returns the new access token's expiry. Nothing is stored on failure.
    pub fn process_token_response(&self, reply: &HttpReply, name: &str) -> Result<DateTime<Utc>> {
        if reply.status != 200 {
            return Err(AuthCodeGrantFlowError::TokenRejected {
                status: reply.status,
                error: reply.oauth_error(),
            }
            .into());
        }

        let token: TokenResponse = serde_json::from_str(&reply.body)
            .map_err(|e| AuthCodeGrantFlowError::MalformedTokenResponse(e.to_string()))?;
        if token.access_token.is_empty() {
            return Err(AuthCodeGrantFlowError::MalformedTokenResponse(
                "empty access_token".to_string(),
            )
            .into());
        }
        if let Some(token_type) = token.token_type.as_deref()
            && !token_type.eq_ignore_ascii_case("bearer")
        {
            return Err(AuthCodeGrantFlowError::MalformedTokenResponse(format!(
                "unsupported token_type '{}'",
                token_type
            ))
            .into());
        }

        let expires_at = token.expires_at(Utc::now())?;
        let rotated = token.refresh_token.is_some();
        self.credentials.store_tokens(
            name,
            TokenUpdate {
                access_token: token.access_token,
                expires_at,
                refresh_token: token.refresh_token,
            },
        )?;

        tracing::info!(config = %name, expires_at = %expires_at, rotated, "Token response accepted");
        Ok(expires_at)
    }
}

fn extract_code_from_redirect(location: &str, expected_state: &str) -> Result<String> {
    let url = Url::parse(location)
        .or_else(|_| Url::parse("http://localhost/").and_then(|base| base.join(location)))
        .map_err(|_| AuthCodeGrantFlowError::MissingCode)?;

    let mut params = CallbackParams::default();
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => params.code = Some(value.into_owned()),
            "state" => params.state = Some(value.into_owned()),
            "error" => params.error = Some(value.into_owned()),
            "error_description" => params.error_description = Some(value.into_owned()),
            _ => {}
        }
    }
    code_from_params(params, expected_state)
}

fn extract_code_from_body(reply: &HttpReply, expected_state: &str) -> Result<String> {
    let params: CallbackParams = serde_json::from_str(&reply.body)
        .map_err(|_| AuthCodeGrantFlowError::MissingCode)?;
    code_from_params(params, expected_state)
}

fn code_from_params(params: CallbackParams, expected_state: &str) -> Result<String> {
    if let Some(error) = params.error {
        tracing::warn!(
            error = %error,
            description = params.error_description.as_deref().unwrap_or(""),
            "Authorization denied"
        );
        return Err(AuthCodeGrantFlowError::Denied { error }.into());
    }
    if params.state.as_deref() != Some(expected_state) {
        return Err(AuthCodeGrantFlowError::StateMismatch.into());
    }
    match params.code {
        Some(code) if !code.is_empty() => Ok(code),
        _ => Err(AuthCodeGrantFlowError::MissingCode.into()),
    }
}
