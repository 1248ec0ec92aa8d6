//! Login checks and the signed-in user.
//!
//! Streams never see credentials directly. When a socket fails they ask an
//! [`AuthProbe`] whether the login is still valid; an expired login
//! invalidates the shared [`UserSession`] and requests a refresh so the
//! front end can prompt for a new token.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::watch;

/// Path of the login check endpoint.
const AUTH_CHECK_PATH: &str = "/api/auth/check";

/// Outcome of a login check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStatus {
    /// Credentials accepted.
    Valid,
    /// Server rejected the credentials (HTTP 401).
    Expired(String),
    /// Check could not be completed (network error, unexpected status).
    Unknown(String),
}

impl LoginStatus {
    /// Whether the login is known to have expired.
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired(_))
    }
}

/// Checks whether the current login is still valid.
#[async_trait]
pub trait AuthProbe: Send + Sync {
    /// Ask the server whether the configured credentials are accepted.
    async fn check_login(&self) -> LoginStatus;
}

/// [`AuthProbe`] backed by `GET /api/auth/check`.
#[derive(Debug, Clone)]
pub struct HttpAuthClient {
    client: reqwest::Client,
    check_url: String,
    token: Option<String>,
}

impl HttpAuthClient {
    /// Create a probe for `server_url` (http or https).
    pub fn new(server_url: &str, token: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            check_url: format!("{}{}", server_url.trim_end_matches('/'), AUTH_CHECK_PATH),
            token: token.filter(|t| !t.is_empty()),
        })
    }
}

#[async_trait]
impl AuthProbe for HttpAuthClient {
    async fn check_login(&self) -> LoginStatus {
        let mut request = self.client.get(&self.check_url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("[Auth] Login check failed: {}", e);
                return LoginStatus::Unknown(e.to_string());
            }
        };

        let status = response.status();
        if status.is_success() {
            LoginStatus::Valid
        } else if status == reqwest::StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            log::info!("[Auth] Login expired: {}", body);
            LoginStatus::Expired(body)
        } else {
            log::warn!("[Auth] Unexpected login check status {}", status);
            LoginStatus::Unknown(format!("server returned {status}"))
        }
    }
}

/// The signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Display name.
    pub name: String,
}

/// Shared signed-in state with change notification.
///
/// Cloning is cheap; all clones observe the same user.
#[derive(Debug, Clone)]
pub struct UserSession {
    user: Arc<watch::Sender<Option<User>>>,
    refresh_count: Arc<AtomicU64>,
}

impl UserSession {
    /// Session with `user` signed in (or nobody).
    pub fn new(user: Option<User>) -> Self {
        let (tx, _rx) = watch::channel(user);
        Self {
            user: Arc::new(tx),
            refresh_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Session with a user signed in under `name`.
    pub fn signed_in(name: impl Into<String>) -> Self {
        Self::new(Some(User { name: name.into() }))
    }

    /// Current user, if signed in.
    pub fn current(&self) -> Option<User> {
        self.user.borrow().clone()
    }

    /// Whether a user is signed in.
    pub fn is_signed_in(&self) -> bool {
        self.user.borrow().is_some()
    }

    /// Watch the signed-in user.
    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.user.subscribe()
    }

    /// Sign a user in.
    pub fn sign_in(&self, user: User) {
        self.user.send_replace(Some(user));
    }

    /// Drop the signed-in user. Subscribers see `None`.
    pub fn invalidate(&self) {
        if self.user.send_replace(None).is_some() {
            log::info!("[Auth] User session invalidated");
        }
    }

    /// Ask the front end to re-authenticate.
    pub fn request_refresh(&self) {
        self.refresh_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of refresh requests so far. Views check this on exit to tell
    /// the user to renew their token.
    pub fn refresh_requests(&self) -> u64 {
        self.refresh_count.load(Ordering::SeqCst)
    }
}

/// Run the login check after a transport error.
///
/// An expired login invalidates `session` and requests a refresh. Returns
/// the probe's verdict.
pub async fn on_transport_error(probe: &dyn AuthProbe, session: &UserSession) -> LoginStatus {
    let status = probe.check_login().await;
    if status.is_expired() {
        session.invalidate();
        session.request_refresh();
    }
    status
}
