//! Mock OAuth 2.0 authorization server.
//!
//! Issues and redeems authorization codes, mints and rotates tokens, and
//! answers introspection and revocation requests. Consent is granted
//! automatically for the configured default user, which makes the server a
//! test peer for the authorization code grant client.
//!
//! # Endpoints
//!
//! - `GET /oauth/authorize`: code issuance via 302 to the client's redirect URI
//! - `POST /oauth/token`: `authorization_code`, `refresh_token` and
//!   `client_credentials` grants
//! - `POST /oauth/introspect`, `POST /oauth/revoke`
//! - `GET /health`
//!
//! # Example
//!
//! ```ignore
//! use codegrant_server::{AuthorizationServer, RegisteredClient, ServerConfig};
//!
//! let config = ServerConfig::new()
//!     .with_client(RegisteredClient::new("c1", "S0123456789abcdef", "https://cb"));
//! AuthorizationServer::new(config).run(CancellationToken::new()).await?;
//! ```

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod store;

pub use config::ServerConfig;
pub use error::{ErrorResponse, Result, ServerError};
pub use routes::{IntrospectResponse, TokenResponse};
pub use state::AppState;
pub use store::{
    AccessToken, AuthorizationCode, AuthorizationStore, RegisteredClient, SharedStore, StoreStats,
};

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// The authorization server.
#[derive(Debug, Clone)]
pub struct AuthorizationServer {
    state: AppState,
}

impl AuthorizationServer {
    /// Create a server and register the configured clients.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            state: AppState::new(config),
        }
    }

    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// The server's store.
    pub fn store(&self) -> SharedStore {
        self.state.store.clone()
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        use axum::routing::{get, post};

        Router::new()
            .merge(routes::health_routes())
            .route("/oauth/authorize", get(routes::authorize_handler))
            .route("/oauth/token", post(routes::token_handler))
            .route("/oauth/introspect", post(routes::introspect_handler))
            .route("/oauth/revoke", post(routes::revoke_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until `shutdown` fires.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.state.config.bind_address;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` fires.
    ///
    /// Starts the expired entry sweep when a sweep interval is configured.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let addr = listener
            .local_addr()
            .map_err(|e| ServerError::Internal(format!("Failed to read local address: {}", e)))?;
        let router = self.router();

        let sweeper = self.state.config.sweep_interval.map(|interval| {
            store::spawn_sweeper(self.store(), interval, shutdown.child_token())
        });

        info!("Starting authorization server on {}", addr);

        let stop = shutdown.clone();
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)));

        shutdown.cancel();
        if let Some(handle) = sweeper {
            let _ = handle.await;
        }
        info!("Authorization server stopped");
        served
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_server_health_endpoint() {
        let server = AuthorizationServer::new(ServerConfig::new());

        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let server = AuthorizationServer::new(ServerConfig::new());

        let response = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/oauth/unknown")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let server = AuthorizationServer::new(
            ServerConfig::new().with_sweep_interval(std::time::Duration::from_secs(60)),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(server.serve(listener, shutdown.clone()));
        shutdown.cancel();
        assert!(handle.await.unwrap().is_ok());
    }
}
