//! Client registry and code/token store.
//!
//! Every read-modify-write runs under a single lock: redeeming a code is
//! remove-if-present-unexpired-and-matching, and refresh rotation removes the
//! old entry and inserts the new one in the same critical section. Expiry is
//! checked on every lookup; [`AuthorizationStore::sweep`] only reclaims memory.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rand::RngCore;
use serde::Serialize;
use subtle::ConstantTimeEq;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ServerError};

/// `token_type` of every issued token.
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Random bytes in codes and tokens.
const TOKEN_BYTES: usize = 32;

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// A client known to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredClient {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub response_types: Vec<String>,
}

impl RegisteredClient {
    /// Client accepting the `code` response type.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            response_types: vec!["code".to_string()],
        }
    }

    pub fn supports_response_type(&self, response_type: &str) -> bool {
        self.response_types.iter().any(|t| t == response_type)
    }
}

/// An issued authorization code.
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub user_id: String,
    /// Client `state` the code was issued for, echoed on the redirect.
    pub state: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
}

impl AuthorizationCode {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// An issued access token and its refresh token.
#[derive(Debug, Clone, Serialize)]
pub struct AccessToken {
    pub access_token: String,
    pub client_id: String,
    pub scope: String,
    pub user_id: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub refresh_token: Option<String>,
    pub token_type: &'static str,
}

impl AccessToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Expired entries are dropped unless a refresh token can still renew them.
    fn is_reclaimable(&self, now: DateTime<Utc>) -> bool {
        self.is_expired(now) && self.refresh_token.is_none()
    }
}

/// Entry counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub clients: usize,
    pub codes: usize,
    pub tokens: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Grants {
    codes: HashMap<String, AuthorizationCode>,
    tokens: HashMap<String, AccessToken>,
}

/// In-memory state of the authorization server.
#[derive(Debug)]
pub struct AuthorizationStore {
    clients: RwLock<HashMap<String, RegisteredClient>>,
    grants: Mutex<Grants>,
    code_ttl: chrono::Duration,
    token_ttl: chrono::Duration,
}

/// Shared handle to the store.
pub type SharedStore = Arc<AuthorizationStore>;

impl AuthorizationStore {
    pub fn new(code_ttl: Duration, token_ttl: Duration) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            grants: Mutex::new(Grants::default()),
            code_ttl: chrono::Duration::from_std(code_ttl).unwrap_or(chrono::Duration::MAX),
            token_ttl: chrono::Duration::from_std(token_ttl).unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Token lifetime in whole seconds, as reported in `expires_in`.
    pub fn token_ttl_secs(&self) -> i64 {
        self.token_ttl.num_seconds()
    }

    // ── Clients ─────────────────────────────────────────────────────────────

    /// Register (or replace) a client.
    pub fn register_client(&self, client: RegisteredClient) {
        tracing::debug!(client_id = %client.client_id, "Client registered");
        self.clients
            .write()
            .insert(client.client_id.clone(), client);
    }

    pub fn client(&self, client_id: &str) -> Option<RegisteredClient> {
        self.clients.read().get(client_id).cloned()
    }

    /// Look up `client_id` and check its secret in constant time.
    pub fn authenticate_client(&self, client_id: &str, client_secret: &str) -> Result<RegisteredClient> {
        let client = self.client(client_id).ok_or(ServerError::InvalidClient)?;
        if constant_time_eq(&client.client_secret, client_secret) {
            Ok(client)
        } else {
            Err(ServerError::InvalidClient)
        }
    }

    // ── Codes ───────────────────────────────────────────────────────────────

    /// Issue a one-time authorization code.
    pub fn issue_code(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scope: &str,
        user_id: &str,
        state: Option<&str>,
    ) -> AuthorizationCode {
        let code = AuthorizationCode {
            code: generate_token(),
            client_id: client_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            scope: scope.to_string(),
            user_id: user_id.to_string(),
            state: state.map(str::to_string),
            expires_at: expiry(self.code_ttl),
            used: false,
        };
        self.grants
            .lock()
            .codes
            .insert(code.code.clone(), code.clone());
        code
    }

    /// Redeem `code` for the client that obtained it.
    ///
    /// The code is removed only when it is unexpired, unused and bound to
    /// `client_id` and `redirect_uri`; any other outcome is `invalid_grant`
    /// and leaves a valid code in place.
    pub fn redeem_code(&self, code: &str, client_id: &str, redirect_uri: &str) -> Result<AuthorizationCode> {
        let now = Utc::now();
        let mut grants = self.grants.lock();

        let Some(entry) = grants.codes.get(code) else {
            return Err(ServerError::InvalidGrant);
        };
        if entry.is_expired(now) {
            grants.codes.remove(code);
            tracing::debug!(client_id, "Expired authorization code presented");
            return Err(ServerError::InvalidGrant);
        }
        if entry.used || entry.client_id != client_id || entry.redirect_uri != redirect_uri {
            return Err(ServerError::InvalidGrant);
        }

        let mut redeemed = grants
            .codes
            .remove(code)
            .ok_or(ServerError::InvalidGrant)?;
        redeemed.used = true;
        Ok(redeemed)
    }

    // ── Tokens ──────────────────────────────────────────────────────────────

    /// Mint and store a new access token.
    pub fn mint_token(
        &self,
        client_id: &str,
        scope: &str,
        user_id: Option<&str>,
        with_refresh_token: bool,
    ) -> AccessToken {
        let token = self.new_token(client_id, scope, user_id.map(str::to_string), with_refresh_token);
        self.grants
            .lock()
            .tokens
            .insert(token.access_token.clone(), token.clone());
        token
    }

    fn new_token(
        &self,
        client_id: &str,
        scope: &str,
        user_id: Option<String>,
        with_refresh_token: bool,
    ) -> AccessToken {
        AccessToken {
            access_token: generate_token(),
            client_id: client_id.to_string(),
            scope: scope.to_string(),
            user_id,
            expires_at: expiry(self.token_ttl),
            refresh_token: with_refresh_token.then(generate_token),
            token_type: TOKEN_TYPE_BEARER,
        }
    }

    /// Replace the token holding `refresh_token` for `client_id` with a new
    /// access/refresh pair carrying the same scope and user.
    pub fn rotate_refresh_token(&self, refresh_token: &str, client_id: &str) -> Result<AccessToken> {
        let mut grants = self.grants.lock();

        let old_key = grants
            .tokens
            .iter()
            .find(|(_, t)| {
                t.client_id == client_id
                    && t.refresh_token
                        .as_deref()
                        .is_some_and(|r| constant_time_eq(r, refresh_token))
            })
            .map(|(key, _)| key.clone())
            .ok_or(ServerError::InvalidGrant)?;

        let old = grants
            .tokens
            .remove(&old_key)
            .ok_or(ServerError::InvalidGrant)?;
        let token = self.new_token(&old.client_id, &old.scope, old.user_id, true);
        grants
            .tokens
            .insert(token.access_token.clone(), token.clone());
        Ok(token)
    }

    /// The token if it exists and is unexpired.
    ///
    /// An expired token without a refresh token is dropped.
    pub fn introspect(&self, access_token: &str) -> Option<AccessToken> {
        let now = Utc::now();
        let mut grants = self.grants.lock();
        let token = grants.tokens.get(access_token)?;
        if !token.is_expired(now) {
            return Some(token.clone());
        }
        if token.is_reclaimable(now) {
            grants.tokens.remove(access_token);
        }
        None
    }

    /// Delete the entry holding `token` as access or refresh token.
    ///
    /// Returns whether anything was removed.
    pub fn revoke(&self, token: &str) -> bool {
        let mut grants = self.grants.lock();
        if grants.tokens.remove(token).is_some() {
            return true;
        }
        let before = grants.tokens.len();
        grants
            .tokens
            .retain(|_, t| t.refresh_token.as_deref() != Some(token));
        grants.tokens.len() != before
    }

    /// Drop expired codes and expired tokens that cannot be refreshed.
    ///
    /// Returns the number of codes and tokens removed.
    pub fn sweep(&self) -> (usize, usize) {
        let now = Utc::now();
        let mut grants = self.grants.lock();

        let codes_before = grants.codes.len();
        grants.codes.retain(|_, c| !c.is_expired(now));
        let tokens_before = grants.tokens.len();
        grants.tokens.retain(|_, t| !t.is_reclaimable(now));

        (
            codes_before - grants.codes.len(),
            tokens_before - grants.tokens.len(),
        )
    }

    pub fn stats(&self) -> StoreStats {
        let grants = self.grants.lock();
        StoreStats {
            clients: self.clients.read().len(),
            codes: grants.codes.len(),
            tokens: grants.tokens.len(),
        }
    }
}

/// Run [`AuthorizationStore::sweep`] every `interval` until `shutdown` fires.
pub fn spawn_sweeper(store: SharedStore, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let (codes, tokens) = store.sweep();
                    if codes + tokens > 0 {
                        tracing::debug!(codes, tokens, "Swept expired entries");
                    }
                }
            }
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn expiry(ttl: chrono::Duration) -> DateTime<Utc> {
    Utc::now()
        .checked_add_signed(ttl)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Random URL-safe token.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compare two strings in constant time.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a_bytes = a.as_bytes();
    let b_bytes = b.as_bytes();

    if a_bytes.len() == b_bytes.len() {
        a_bytes.ct_eq(b_bytes).into()
    } else {
        let _ = a_bytes.ct_eq(a_bytes);
        false
    }
}
