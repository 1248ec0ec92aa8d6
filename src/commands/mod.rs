//! CLI front ends for the streaming sessions.
//!
//! Each subcommand renders one view in the local terminal:
//!
//! - [`check`] - verify the configured login
//! - [`logs`] - follow the run log or the audit log
//! - [`metrics`] - live metrics cards with a QPS sparkline
//! - [`term`] - interactive terminal with detach/resume
//!
//! Services are built once from the [`Config`] and shared by the views.

pub mod check;
pub mod logs;
pub mod metrics;
pub mod term;

use std::sync::Arc;

use anyhow::Result;

use crate::auth::{AuthProbe, HttpAuthClient, LoginStatus, UserSession};
use crate::config::Config;
use crate::constants::PARKED_SWEEP_INTERVAL;
use crate::listeners::EventHub;
use crate::log_stream::LogStreamDeps;
use crate::messages::Messages;
use crate::session_store::SessionStore;
use crate::socket::{Connector, WsConnector};
use crate::terminal::TerminalDeps;

/// Name shown for the signed-in console user.
const CONSOLE_USER: &str = "console";

/// Shared services for the CLI views.
#[derive(Clone)]
pub struct Services {
    /// Opens stream sockets.
    pub connector: Arc<dyn Connector>,
    /// Login checks.
    pub auth: Arc<dyn AuthProbe>,
    /// Signed-in user.
    pub user: UserSession,
    /// Parked sessions.
    pub store: SessionStore,
    /// UI events.
    pub hub: EventHub,
    /// User-visible strings.
    pub messages: Arc<Messages>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl Services {
    /// Build services for `config` and sign in if the server accepts the login.
    ///
    /// An unreachable server still signs in; the streams report the failure.
    pub async fn connect(config: &Config) -> Result<Self> {
        let auth = HttpAuthClient::new(&config.server_url, config.token().map(String::from))?;
        let user = match auth.check_login().await {
            LoginStatus::Expired(reason) => {
                log::warn!("[Console] Login rejected: {}", reason);
                UserSession::new(None)
            }
            LoginStatus::Valid | LoginStatus::Unknown(_) => UserSession::signed_in(CONSOLE_USER),
        };

        let store = SessionStore::new();
        store.spawn_janitor(&user, PARKED_SWEEP_INTERVAL);

        Ok(Self {
            connector: Arc::new(WsConnector::new(config.server_url.clone()).with_token(config.token())),
            auth: Arc::new(auth),
            user,
            store,
            hub: EventHub::new(),
            messages: config.messages(),
        })
    }

    /// Tell the user to renew their token if a view saw the login expire.
    pub fn report_expired_login(&self) {
        if self.user.refresh_requests() > 0 {
            eprintln!("Login expired. Pass a new token with --token or SMARTDNS_TOKEN.");
        }
    }

    /// Dependencies for a log view.
    pub fn log_deps(&self) -> LogStreamDeps {
        LogStreamDeps {
            connector: Arc::clone(&self.connector),
            auth: Arc::clone(&self.auth),
            user: self.user.clone(),
            messages: Arc::clone(&self.messages),
        }
    }

    /// Dependencies for a terminal view.
    pub fn terminal_deps(&self) -> TerminalDeps {
        TerminalDeps {
            connector: Arc::clone(&self.connector),
            auth: Arc::clone(&self.auth),
            user: self.user.clone(),
            store: self.store.clone(),
            hub: self.hub.clone(),
            messages: Arc::clone(&self.messages),
        }
    }
}
