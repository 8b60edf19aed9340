//! Browser consent: a local callback listener and the system browser.
//!
//! A flow takes the [`ConsentListener`] for its client server address from a
//! shared [`ConsentListeners`] registry, registers its `state`, opens the
//! browser at the authorization redirect, and waits on a oneshot channel
//! until the browser lands on the callback.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, State},
    http::{Method, StatusCode, Uri},
    response::Html,
};
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::{Host, Url};

use crate::error::{AuthCodeGrantFlowError, Result};

// ============================================================================
// Browser
// ============================================================================

/// Opens URLs for the user.
pub trait BrowserLauncher: Send + Sync + std::fmt::Debug {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Launches the platform's default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> std::io::Result<()> {
        #[cfg(target_os = "macos")]
        let status = std::process::Command::new("open").arg(url).status()?;
        #[cfg(target_os = "linux")]
        let status = std::process::Command::new("xdg-open").arg(url).status()?;
        #[cfg(target_os = "windows")]
        let status = std::process::Command::new("cmd")
            .args(["/C", "start", "", url])
            .status()?;
        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        let status: std::process::ExitStatus = {
            let _ = url;
            return Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "no system browser launcher for this platform",
            ));
        };

        if status.success() {
            Ok(())
        } else {
            Err(std::io::Error::other(format!(
                "browser launcher exited with {}",
                status
            )))
        }
    }
}

// ============================================================================
// Callback listener
// ============================================================================

/// Parameters delivered to the redirect endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Flows waiting on a listener, keyed by `state`.
type Waiters = Arc<Mutex<HashMap<String, Waiter>>>;

#[derive(Debug)]
struct Waiter {
    path: String,
    tx: oneshot::Sender<CallbackParams>,
}

/// How long a new bind waits for the previous listener on the same address
/// to finish shutting down.
const LISTENER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Local HTTP listener receiving authorization redirects.
///
/// One listener serves every flow whose client server URL resolves to its
/// address; each flow registers its `state` and callback path. The listener
/// shuts down when the last handle is dropped.
#[derive(Debug)]
pub struct ConsentListener {
    local_addr: SocketAddr,
    waiters: Waiters,
    shutdown: CancellationToken,
}

impl ConsentListener {
    async fn bind(host: &str, port: u16) -> Result<(Self, JoinHandle<()>)> {
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind((host, port)).await.map_err(|source| {
            AuthCodeGrantFlowError::CallbackListener {
                addr: addr.clone(),
                source,
            }
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| AuthCodeGrantFlowError::CallbackListener { addr, source })?;

        let waiters: Waiters = Arc::new(Mutex::new(HashMap::new()));
        let router = Router::new()
            .fallback(handle_callback)
            .with_state(waiters.clone());

        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(async move { stop.cancelled().await })
                .await
            {
                tracing::warn!(error = %e, "Consent callback listener stopped with error");
            }
        });

        tracing::debug!(addr = %local_addr, "Consent callback listener started");
        let listener = Self {
            local_addr,
            waiters,
            shutdown,
        };
        Ok((listener, task))
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the callback on `path` carrying `state`.
    ///
    /// Fails if a flow is already waiting for the same `state`.
    pub fn await_state(self: &Arc<Self>, path: &str, state: &str) -> Result<PendingConsent> {
        let (tx, rx) = oneshot::channel();
        {
            let mut waiters = self.waiters.lock();
            if waiters.contains_key(state) {
                return Err(AuthCodeGrantFlowError::ConsentPending.into());
            }
            waiters.insert(
                state.to_string(),
                Waiter {
                    path: path.to_string(),
                    tx,
                },
            );
        }
        Ok(PendingConsent {
            state: state.to_string(),
            rx,
            listener: self.clone(),
        })
    }

    /// Number of flows currently waiting.
    pub fn pending(&self) -> usize {
        self.waiters.lock().len()
    }
}

impl Drop for ConsentListener {
    fn drop(&mut self) {
        self.shutdown.cancel();
        tracing::debug!(addr = %self.local_addr, "Consent callback listener released");
    }
}

/// One flow's registration on a [`ConsentListener`].
///
/// Dropping it withdraws the registration and releases the listener.
#[derive(Debug)]
pub struct PendingConsent {
    state: String,
    rx: oneshot::Receiver<CallbackParams>,
    listener: Arc<ConsentListener>,
}

impl PendingConsent {
    /// Address of the listener the callback will arrive on.
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    /// Wait for the callback. `None` if the listener went away first.
    pub async fn callback(&mut self) -> Option<CallbackParams> {
        (&mut self.rx).await.ok()
    }
}

impl Drop for PendingConsent {
    fn drop(&mut self) {
        self.listener.waiters.lock().remove(&self.state);
    }
}

#[derive(Debug)]
struct Slot {
    listener: Weak<ConsentListener>,
    task: Option<JoinHandle<()>>,
}

/// Callback listeners shared between grant managers, one per bound address.
///
/// Constructed explicitly and handed to every manager whose flows may share a
/// callback address, like the credential store.
#[derive(Debug, Default)]
pub struct ConsentListeners {
    slots: tokio::sync::Mutex<HashMap<String, Slot>>,
}

/// Listener registry shared between grant managers.
pub type SharedConsentListeners = Arc<ConsentListeners>;

impl ConsentListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared registry.
    pub fn shared() -> SharedConsentListeners {
        Arc::new(Self::new())
    }

    /// The listener for `client_server_url`'s host and port.
    ///
    /// Reuses the running listener while any flow holds it, otherwise binds a
    /// new one once the previous listener on that address has shut down.
    pub async fn listener(&self, client_server_url: &Url) -> Result<Arc<ConsentListener>> {
        let host = match client_server_url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => ip.to_string(),
            None => "127.0.0.1".to_string(),
        };
        let port = client_server_url.port_or_known_default().unwrap_or(80);
        let key = format!("{}:{}", host, port);

        let mut slots = self.slots.lock().await;
        if let Some(slot) = slots.get_mut(&key) {
            if let Some(listener) = slot.listener.upgrade() {
                return Ok(listener);
            }
            if let Some(task) = slot.task.take()
                && tokio::time::timeout(LISTENER_SHUTDOWN_GRACE, task).await.is_err()
            {
                tracing::warn!(addr = %key, "Previous consent listener is still shutting down");
            }
        }

        let (listener, task) = ConsentListener::bind(&host, port).await?;
        let listener = Arc::new(listener);
        slots.insert(
            key,
            Slot {
                listener: Arc::downgrade(&listener),
                task: Some(task),
            },
        );
        Ok(listener)
    }
}

async fn handle_callback(
    State(waiters): State<Waiters>,
    method: Method,
    uri: Uri,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Html<&'static str>) {
    if method != Method::GET {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            Html("<h1>Method not allowed</h1>"),
        );
    }
    let Some(state) = params.state.clone() else {
        return (
            StatusCode::BAD_REQUEST,
            Html("<h1>Missing state parameter</h1>"),
        );
    };

    let waiter = {
        let mut waiters = waiters.lock();
        let on_path = waiters
            .get(&state)
            .is_some_and(|waiter| waiter.path == uri.path());
        if on_path { waiters.remove(&state) } else { None }
    };
    let Some(waiter) = waiter else {
        tracing::warn!(path = uri.path(), "Consent callback with unknown or expired state");
        return (
            StatusCode::BAD_REQUEST,
            Html("<h1>Unknown or expired authorization request</h1>"),
        );
    };

    let denied = params.error.is_some();
    if waiter.tx.send(params).is_err() {
        tracing::debug!("Consent callback arrived after the flow stopped waiting");
    }

    if denied {
        (
            StatusCode::OK,
            Html("<h1>Authorization was not granted</h1><p>You may close this window.</p>"),
        )
    } else {
        (
            StatusCode::OK,
            Html("<h1>Authorization complete</h1><p>You may close this window.</p>"),
        )
    }
}
