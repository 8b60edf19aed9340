//! `POST /oauth/token`.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, header},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};
use crate::routes::extract::{JsonOrForm, basic_credentials};
use crate::state::AppState;
use crate::store::{AccessToken, RegisteredClient};

/// Token request body (any grant type).
#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
}

/// Successful token response (RFC 6749 §5.1).
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

impl TokenResponse {
    fn new(token: AccessToken, expires_in: i64) -> Self {
        Self {
            access_token: token.access_token,
            token_type: token.token_type.to_string(),
            expires_in,
            refresh_token: token.refresh_token,
            scope: token.scope,
        }
    }
}

pub async fn token_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonOrForm(request): JsonOrForm<TokenRequest>,
) -> Result<impl IntoResponse> {
    let grant_type = request
        .grant_type
        .as_deref()
        .ok_or_else(|| ServerError::InvalidRequest("missing grant_type".to_string()))?;

    let token = match grant_type {
        "authorization_code" => {
            let client = authenticate(&state, &headers, &request)?;
            let code = required(&request.code, "code")?;
            let redirect_uri = required(&request.redirect_uri, "redirect_uri")?;

            let redeemed = state
                .store
                .redeem_code(code, &client.client_id, redirect_uri)?;
            state.store.mint_token(
                &client.client_id,
                &redeemed.scope,
                Some(&redeemed.user_id),
                true,
            )
        }
        "refresh_token" => {
            let client = authenticate(&state, &headers, &request)?;
            let refresh_token = required(&request.refresh_token, "refresh_token")?;
            state
                .store
                .rotate_refresh_token(refresh_token, &client.client_id)?
        }
        "client_credentials" => {
            let client = authenticate(&state, &headers, &request)?;
            let scope = request.scope.as_deref().unwrap_or_default();
            state.store.mint_token(&client.client_id, scope, None, false)
        }
        other => return Err(ServerError::UnsupportedGrantType(other.to_string())),
    };

    tracing::info!(
        client_id = %token.client_id,
        grant_type,
        refresh = token.refresh_token.is_some(),
        "Access token issued"
    );

    let body = TokenResponse::new(token, state.store.token_ttl_secs());
    Ok((
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(body),
    ))
}

/// Client credentials from HTTP Basic, falling back to the body.
fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    request: &TokenRequest,
) -> Result<RegisteredClient> {
    let (client_id, client_secret) = match basic_credentials(headers) {
        Some(credentials) => credentials,
        None => match (&request.client_id, &request.client_secret) {
            (Some(id), Some(secret)) => (id.clone(), secret.clone()),
            _ => return Err(ServerError::InvalidClient),
        },
    };
    state.store.authenticate_client(&client_id, &client_secret)
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServerError::InvalidRequest(format!("missing {}", name)))
}
