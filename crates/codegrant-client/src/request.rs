//! Outbound requests of the authorization code flow.

use url::Url;

use crate::config::GrantConfig;
use crate::error::{AuthCodeGrantFlowError, Result};
use crate::transport::{HttpReply, SharedTransport};

/// Query parameters of the authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationQuery {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    /// Space-joined scopes.
    pub scope: String,
    pub state: String,
    pub audience: String,
    pub prompt: String,
}

impl AuthorizationQuery {
    /// Check that the query was produced from `config`.
    pub fn verify(&self, config: &GrantConfig) -> Result<()> {
        if self.client_id != config.client_id() {
            return Err(AuthCodeGrantFlowError::QueryMismatch("client_id").into());
        }
        if self.audience != config.audience() {
            return Err(AuthCodeGrantFlowError::QueryMismatch("audience").into());
        }
        if self.state != config.state() {
            return Err(AuthCodeGrantFlowError::QueryMismatch("state").into());
        }
        if self.scope != config.scope_string() {
            return Err(AuthCodeGrantFlowError::QueryMismatch("scope").into());
        }
        Ok(())
    }

    /// Parameters in wire order.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("client_id", self.client_id.clone()),
            ("redirect_uri", self.redirect_uri.clone()),
            ("response_type", self.response_type.clone()),
            ("scope", self.scope.clone()),
            ("state", self.state.clone()),
            ("audience", self.audience.clone()),
            ("prompt", self.prompt.clone()),
        ]
    }
}

/// Join the client server's base path and the callback endpoint.
pub fn redirect_uri(client_auth_path: &str, client_auth_endpoint: &str) -> String {
    format!(
        "{}/{}",
        client_auth_path.trim_end_matches('/'),
        client_auth_endpoint.trim_start_matches('/')
    )
}

/// Builds and sends the grant's HTTP requests.
#[derive(Debug, Clone)]
pub struct RequestManager {
    transport: SharedTransport,
}

impl RequestManager {
    pub fn new(transport: SharedTransport) -> Self {
        Self { transport }
    }

    /// Build the authorization request parameters for `config`.
    pub fn construct_authorization_query_params(
        config: &GrantConfig,
        response_type: &str,
        prompt: &str,
    ) -> Result<AuthorizationQuery> {
        let query = AuthorizationQuery {
            client_id: config.client_id().to_string(),
            redirect_uri: config.redirect_uri(),
            response_type: response_type.to_string(),
            scope: config.scope_string(),
            state: config.state().to_string(),
            audience: config.audience().to_string(),
            prompt: prompt.to_string(),
        };
        query.verify(config)?;
        Ok(query)
    }

    /// Send the authorization request. Expected answers are 200 or 302; the
    /// status is interpreted by the response manager.
    pub async fn send_authorization_request(
        &self,
        url: &Url,
        params: &AuthorizationQuery,
    ) -> Result<HttpReply> {
        tracing::debug!(url = %url, client_id = %params.client_id, "Sending authorization request");
        let reply = self.transport.get(url.as_str(), &params.to_pairs()).await?;
        tracing::debug!(status = reply.status, "Authorization request answered");
        Ok(reply)
    }

    /// Exchange an authorization code at the token endpoint.
    ///
    /// The `redirect_uri` is rebuilt from `client_auth_path` and
    /// `client_auth_endpoint` and must equal the one sent to `/authorize`.
    pub async fn send_token_request(
        &self,
        config: &GrantConfig,
        client_secret: &str,
        client_auth_path: &str,
        client_auth_endpoint: &str,
        code: &str,
    ) -> Result<HttpReply> {
        let form = [
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("client_id", config.client_id().to_string()),
            ("client_secret", client_secret.to_string()),
            (
                "redirect_uri",
                redirect_uri(client_auth_path, client_auth_endpoint),
            ),
        ];
        let url = config.authorization_token_url();
        tracing::debug!(url = %url, client_id = %config.client_id(), "Sending token request");
        self.transport.post_form(url.as_str(), &form).await
    }

    /// Exchange a refresh token for a new token pair.
    pub async fn send_refresh_request(
        &self,
        config: &GrantConfig,
        client_secret: &str,
        refresh_token: &str,
    ) -> Result<HttpReply> {
        let form = [
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
            ("client_id", config.client_id().to_string()),
            ("client_secret", client_secret.to_string()),
        ];
        let url = config.authorization_token_url();
        tracing::debug!(url = %url, client_id = %config.client_id(), "Sending refresh request");
        self.transport.post_form(url.as_str(), &form).await
    }
}
