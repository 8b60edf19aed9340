//! `GET /oauth/authorize`.
//!
//! Consent is implicit: every valid request is approved on behalf of the
//! configured default user and answered with a 302 to the client's redirect
//! URI carrying the code and the echoed `state`.

use axum::{
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use url::form_urlencoded;

use crate::error::{Result, ServerError};
use crate::state::AppState;

/// Authorization request parameters.
#[derive(Debug, Default, Deserialize)]
pub struct AuthorizeQuery {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub audience: Option<String>,
    pub prompt: Option<String>,
}

pub async fn authorize_handler(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Response> {
    let client_id = query
        .client_id
        .as_deref()
        .ok_or_else(|| ServerError::InvalidRequest("missing client_id".to_string()))?;
    let client = state.store.client(client_id).ok_or(ServerError::InvalidClient)?;

    let redirect_uri = query
        .redirect_uri
        .as_deref()
        .filter(|uri| *uri == client.redirect_uri)
        .ok_or(ServerError::InvalidRedirectUri)?;

    let response_type = query
        .response_type
        .as_deref()
        .ok_or_else(|| ServerError::InvalidRequest("missing response_type".to_string()))?;
    if !client.supports_response_type(response_type) {
        return Err(ServerError::UnsupportedResponseType(
            response_type.to_string(),
        ));
    }

    let scope = query.scope.as_deref().unwrap_or_default();
    let code = state.store.issue_code(
        client_id,
        redirect_uri,
        scope,
        &state.config.default_user_id,
        query.state.as_deref(),
    );
    tracing::info!(
        client_id,
        scope,
        audience = query.audience.as_deref().unwrap_or(""),
        "Authorization code issued"
    );

    let mut params = form_urlencoded::Serializer::new(String::new());
    params.append_pair("code", &code.code);
    if let Some(echo) = code.state.as_deref() {
        params.append_pair("state", echo);
    }
    let separator = if redirect_uri.contains('?') { '&' } else { '?' };
    let location = format!("{}{}{}", redirect_uri, separator, params.finish());

    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::error::ErrorResponse;
    use crate::store::RegisteredClient;
    use axum::{Router, body::Body, http::Request, routing::get};
    use tower::ServiceExt;

    fn app() -> Router {
        let config = ServerConfig::new()
            .with_client(RegisteredClient::new("c1", "S0123456789abcdef", "https://cb"));
        Router::new()
            .route("/oauth/authorize", get(authorize_handler))
            .with_state(AppState::new(config))
    }

    async fn get_uri(uri: &str) -> Response {
        app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn error_of(response: Response) -> String {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice::<ErrorResponse>(&body).unwrap().error
    }

    #[tokio::test]
    async fn test_redirects_with_code_and_state() {
        let response = get_uri(
            "/oauth/authorize?client_id=c1&redirect_uri=https://cb&response_type=code&scope=read&state=STATE1",
        )
        .await;

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://cb?code="));
        assert!(location.ends_with("&state=STATE1"));
    }

    #[tokio::test]
    async fn test_rejections() {
        let cases = [
            ("/oauth/authorize?redirect_uri=https://cb&response_type=code", "invalid_request"),
            ("/oauth/authorize?client_id=c2&redirect_uri=https://cb&response_type=code", "invalid_client"),
            ("/oauth/authorize?client_id=c1&redirect_uri=https://evil&response_type=code", "invalid_redirect_uri"),
            ("/oauth/authorize?client_id=c1&response_type=code", "invalid_redirect_uri"),
            ("/oauth/authorize?client_id=c1&redirect_uri=https://cb&response_type=token", "unsupported_response_type"),
            ("/oauth/authorize?client_id=c1&redirect_uri=https://cb", "invalid_request"),
        ];

        for (uri, expected) in cases {
            let response = get_uri(uri).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(error_of(response).await, expected, "{}", uri);
        }
    }
}
