//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use reqwest::{Client, redirect};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use codegrant_server::{AuthorizationServer, RegisteredClient, ServerConfig, SharedStore};

pub const CLIENT_ID: &str = "c1";
pub const CLIENT_SECRET: &str = "S0123456789abcdef";
pub const REDIRECT_URI: &str = "https://cb";

/// A test server that runs in the background.
pub struct TestServer {
    /// The server's address.
    pub addr: SocketAddr,
    /// HTTP client that does not follow redirects.
    pub client: Client,
    /// The server's store, for inspecting state.
    pub store: SharedStore,
    shutdown: CancellationToken,
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server with client `c1` registered.
    pub async fn start() -> Result<Self> {
        Self::start_with(ServerConfig::new()).await
    }

    /// Start a server from `config`, adding client `c1`.
    pub async fn start_with(config: ServerConfig) -> Result<Self> {
        let config =
            config.with_client(RegisteredClient::new(CLIENT_ID, CLIENT_SECRET, REDIRECT_URI));
        let server = AuthorizationServer::new(config);
        let store = server.store();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        let handle = tokio::spawn(async move {
            let _ = server.serve(listener, stop).await;
        });

        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()?;
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            store,
            shutdown,
            _handle: handle,
        })
    }

    /// Get the base URL for the server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Run `/oauth/authorize` for `c1` and return the issued code.
    pub async fn authorize(&self, state: &str) -> Result<String> {
        let resp = self
            .client
            .get(format!("{}/oauth/authorize", self.base_url()))
            .query(&[
                ("client_id", CLIENT_ID),
                ("redirect_uri", REDIRECT_URI),
                ("response_type", "code"),
                ("scope", "read"),
                ("state", state),
            ])
            .send()
            .await?;
        anyhow::ensure!(resp.status().as_u16() == 302, "expected 302, got {}", resp.status());

        let location = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| anyhow::anyhow!("missing Location"))?;
        let url = url::Url::parse(location)?;
        url.query_pairs()
            .find(|(k, _)| k == "code")
            .map(|(_, v)| v.into_owned())
            .ok_or_else(|| anyhow::anyhow!("no code in {}", location))
    }

    /// POST a form to `path`.
    pub async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(format!("{}{}", self.base_url(), path))
            .form(form)
            .send()
            .await?)
    }

    /// Exchange `code` at the token endpoint.
    pub async fn exchange(&self, code: &str, redirect_uri: &str) -> Result<reqwest::Response> {
        self.post_form(
            "/oauth/token",
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", CLIENT_ID),
                ("client_secret", CLIENT_SECRET),
                ("redirect_uri", redirect_uri),
            ],
        )
        .await
    }

    /// Refresh with `refresh_token`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<reqwest::Response> {
        self.post_form(
            "/oauth/token",
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", CLIENT_ID),
                ("client_secret", CLIENT_SECRET),
            ],
        )
        .await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/health", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return,
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
