//! HTTP transport used by the grant client.
//!
//! Requests go through the [`HttpTransport`] trait so flows never block each
//! other and tests can route traffic to an in-process authorization server.
//! Redirects are never followed: a 302 from `/authorize` is the answer the
//! flow is waiting for.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header, redirect};

use crate::error::{GrantError, Result};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The parts of an HTTP response the grant flow interprets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    /// URL the request was sent to (query included).
    pub url: String,
    pub status: u16,
    /// `Location` header, if any.
    pub location: Option<String>,
    pub body: String,
}

impl HttpReply {
    /// The OAuth `error` code from a JSON error body, if present.
    pub fn oauth_error(&self) -> Option<String> {
        serde_json::from_str::<serde_json::Value>(&self.body)
            .ok()?
            .get("error")?
            .as_str()
            .map(str::to_string)
    }
}

/// Non-blocking HTTP transport.
#[async_trait]
pub trait HttpTransport: Send + Sync + std::fmt::Debug {
    /// Send a GET with the given query parameters.
    async fn get(&self, url: &str, query: &[(&'static str, String)]) -> Result<HttpReply>;

    /// Send a POST with an `application/x-www-form-urlencoded` body.
    async fn post_form(&self, url: &str, form: &[(&'static str, String)]) -> Result<HttpReply>;
}

/// Shared transport handle.
pub type SharedTransport = Arc<dyn HttpTransport>;

/// [`HttpTransport`] backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with the default timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a transport with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn into_reply(response: reqwest::Response) -> Result<HttpReply> {
        let url = response.url().to_string();
        let status = response.status().as_u16();
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;
        Ok(HttpReply {
            url,
            status,
            location,
            body,
        })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str, query: &[(&'static str, String)]) -> Result<HttpReply> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| GrantError::Network(format!("GET {} failed: {}", url, e)))?;
        Self::into_reply(response).await
    }

    async fn post_form(&self, url: &str, form: &[(&'static str, String)]) -> Result<HttpReply> {
        let response = self
            .client
            .post(url)
            .form(form)
            .send()
            .await
            .map_err(|e| GrantError::Network(format!("POST {} failed: {}", url, e)))?;
        Self::into_reply(response).await
    }
}
