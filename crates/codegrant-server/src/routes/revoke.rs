//! `POST /oauth/revoke` (RFC 7009).

use axum::{extract::State, http::StatusCode};
use serde::Deserialize;

use crate::error::ServerError;
use crate::routes::extract::JsonOrForm;
use crate::state::AppState;

/// Revocation request body.
#[derive(Debug, Default, Deserialize)]
pub struct RevokeRequest {
    pub token: Option<String>,
}

/// Delete the token if known. Always answers 200.
pub async fn revoke_handler(
    State(state): State<AppState>,
    request: Result<JsonOrForm<RevokeRequest>, ServerError>,
) -> StatusCode {
    let token = match request {
        Ok(JsonOrForm(RevokeRequest { token: Some(token) })) => token,
        Ok(_) => return StatusCode::OK,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring malformed revocation request");
            return StatusCode::OK;
        }
    };

    if state.store.revoke(&token) {
        tracing::info!("Token revoked");
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::{
        Router,
        body::Body,
        http::{Request, header},
        routing::post,
    };
    use tower::ServiceExt;

    async fn revoke(state: AppState, content_type: &str, body: String) -> StatusCode {
        Router::new()
            .route("/oauth/revoke", post(revoke_handler))
            .with_state(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/oauth/revoke")
                    .header(header::CONTENT_TYPE, content_type)
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let state = AppState::new(ServerConfig::new());
        let token = state.store.mint_token("c1", "read", None, true);
        let body = format!(r#"{{"token":"{}"}}"#, token.access_token);

        assert_eq!(revoke(state.clone(), "application/json", body.clone()).await, StatusCode::OK);
        assert!(state.store.introspect(&token.access_token).is_none());
        assert_eq!(revoke(state.clone(), "application/json", body).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_revoke_always_ok() {
        let state = AppState::new(ServerConfig::new());
        assert_eq!(
            revoke(state.clone(), "application/x-www-form-urlencoded", "token=unknown".to_string()).await,
            StatusCode::OK
        );
        assert_eq!(
            revoke(state, "application/json", "{not json".to_string()).await,
            StatusCode::OK
        );
    }
}
