//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, header},
};
use tower::ServiceExt;
use url::Url;

use codegrant_client::{
    AuthCodeGrantManager, BrowserLauncher, ConsentListeners, ConsentPromptMode, CredentialsManager,
    GrantError, GrantSettings, HttpReply, HttpTransport, Result, SharedConsentListeners,
    SharedCredentials,
};
use codegrant_server::{AuthorizationServer, RegisteredClient, ServerConfig, SharedStore};

pub const CLIENT_ID: &str = "c1";
pub const CLIENT_SECRET: &str = "S0123456789abcdef";
pub const CLIENT_SERVER_URL: &str = "http://localhost:8765";

/// Routes client requests into an in-process authorization server.
///
/// Scheme and host are ignored; only path and query reach the router.
#[derive(Debug, Clone)]
pub struct RouterTransport {
    router: Router,
    requests: Arc<AtomicUsize>,
}

impl RouterTransport {
    pub fn new(router: Router) -> Self {
        Self {
            router,
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of requests sent so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    async fn send(&self, url: Url, request: Request<Body>) -> Result<HttpReply> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .map_err(|e| GrantError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| GrantError::Network(e.to_string()))?;

        Ok(HttpReply {
            url: url.to_string(),
            status,
            location,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

#[async_trait]
impl HttpTransport for RouterTransport {
    async fn get(&self, url: &str, query: &[(&'static str, String)]) -> Result<HttpReply> {
        let mut url = Url::parse(url).map_err(|e| GrantError::Network(e.to_string()))?;
        url.query_pairs_mut().extend_pairs(query);
        let request = Request::get(path_and_query(&url))
            .body(Body::empty())
            .map_err(|e| GrantError::Network(e.to_string()))?;
        self.send(url, request).await
    }

    async fn post_form(&self, url: &str, form: &[(&'static str, String)]) -> Result<HttpReply> {
        let url = Url::parse(url).map_err(|e| GrantError::Network(e.to_string()))?;
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();
        let request = Request::post(path_and_query(&url))
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .map_err(|e| GrantError::Network(e.to_string()))?;
        self.send(url, request).await
    }
}

/// Browser that follows the consent URL with a plain HTTP GET.
#[derive(Debug, Default)]
pub struct FollowingBrowser {
    pub opened: AtomicUsize,
}

impl BrowserLauncher for FollowingBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let url = url.to_string();
        tokio::spawn(async move {
            let _ = reqwest::get(url).await;
        });
        Ok(())
    }
}

/// Browser that never completes consent.
#[derive(Debug, Default)]
pub struct IdleBrowser;

impl BrowserLauncher for IdleBrowser {
    fn open(&self, _url: &str) -> std::io::Result<()> {
        Ok(())
    }
}

/// Browser that cannot be launched.
#[derive(Debug, Default)]
pub struct BrokenBrowser;

impl BrowserLauncher for BrokenBrowser {
    fn open(&self, _url: &str) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no browser installed",
        ))
    }
}

/// An in-process server plus a client wired to it.
pub struct Harness {
    pub store: SharedStore,
    pub transport: RouterTransport,
    pub credentials: SharedCredentials,
    pub consents: SharedConsentListeners,
}

impl Harness {
    /// Server with `c1` registered for `redirect_uri`.
    pub fn new(redirect_uri: &str) -> Self {
        Self::with_server_secret(redirect_uri, CLIENT_SECRET)
    }

    /// Server with `c1` registered under a specific secret.
    pub fn with_server_secret(redirect_uri: &str, secret: &str) -> Self {
        let server = AuthorizationServer::new(
            ServerConfig::new().with_client(RegisteredClient::new(CLIENT_ID, secret, redirect_uri)),
        );
        Self {
            store: server.store(),
            transport: RouterTransport::new(server.router()),
            credentials: CredentialsManager::shared(),
            consents: ConsentListeners::shared(),
        }
    }

    pub fn manager(&self, name: &str, settings: GrantSettings) -> AuthCodeGrantManager {
        AuthCodeGrantManager::from_settings(
            name,
            settings,
            self.credentials.clone(),
            Arc::new(self.transport.clone()),
        )
        .expect("valid settings")
        .with_consent_listeners(self.consents.clone())
    }
}

/// Grant settings pointing at the in-process server.
pub fn settings(mode: ConsentPromptMode, client_server_url: &str) -> GrantSettings {
    GrantSettings {
        client_id: CLIENT_ID.to_string(),
        client_secret: CLIENT_SECRET.to_string(),
        audience: "https://api.example.com".to_string(),
        scope: vec!["read".to_string(), "write".to_string()],
        authorization_url: "https://auth.test/oauth/authorize".to_string(),
        authorization_token_url: "https://auth.test/oauth/token".to_string(),
        client_server_url: client_server_url.to_string(),
        redirect_endpoint: "/callback".to_string(),
        consent_prompt_key: "consent-key".to_string(),
        consent_prompt_mode: mode,
        consent_timeout: Duration::from_secs(5),
    }
}

/// Find an available local port.
pub async fn find_available_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let port = listener.local_addr().expect("local addr").port();
    drop(listener);
    port
}
