//! `POST /oauth/introspect` (RFC 7662).

use axum::{Json, extract::State};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::routes::extract::JsonOrForm;
use crate::state::AppState;

/// Introspection request body.
#[derive(Debug, Default, Deserialize)]
pub struct IntrospectRequest {
    pub token: Option<String>,
}

/// Introspection response. Only `active` is present for inactive tokens.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IntrospectResponse {
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Expiry as Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
}

pub async fn introspect_handler(
    State(state): State<AppState>,
    JsonOrForm(request): JsonOrForm<IntrospectRequest>,
) -> Result<Json<IntrospectResponse>> {
    let Some(token) = request
        .token
        .as_deref()
        .and_then(|t| state.store.introspect(t))
    else {
        return Ok(Json(IntrospectResponse::default()));
    };

    tracing::debug!(
        client_id = %token.client_id,
        remaining_secs = (token.expires_at - Utc::now()).num_seconds(),
        "Token introspected"
    );
    Ok(Json(IntrospectResponse {
        active: true,
        client_id: Some(token.client_id),
        scope: Some(token.scope),
        token_type: Some(token.token_type.to_string()),
        exp: Some(token.expires_at.timestamp()),
        sub: token.user_id,
    }))
}
