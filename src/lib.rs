//! SmartDNS console - streaming client core for the SmartDNS web API.
//!
//! This crate consumes the resolver's WebSocket streams (run log, audit
//! log, metrics, interactive terminal) and keeps the client-side state each
//! of them needs: bounded line buffers, pause/level controls, reconnect
//! timers and a parked terminal session that survives view switches.
//!
//! # Architecture
//!
//! ```text
//!   commands (CLI views)
//!        │
//!        ├── log_stream::LogStreamSession ──┐
//!        ├── metrics::MetricsStream ────────┤── socket::Connector ── WebSocket
//!        └── terminal::TerminalSession ─────┘
//!                 │
//!                 └── session_store::SessionStore (parked socket + scrollback)
//! ```
//!
//! Every stream decodes its frames through [`codec`]. Services (connector,
//! auth probe, user session, session store) are constructed once and passed
//! in explicitly; nothing here is a global.

pub mod auth;
pub mod clipboard;
pub mod codec;
pub mod commands;
pub mod config;
pub mod constants;
pub mod follow;
pub mod listeners;
pub mod log_buffer;
pub mod log_stream;
pub mod messages;
pub mod metrics;
pub mod session_store;
pub mod socket;
pub mod stream_state;
pub mod terminal;

// Re-export commonly used types
pub use auth::{AuthProbe, LoginStatus, UserSession};
pub use codec::{FrameError, LogKind, LogLevel, StreamFrame};
pub use config::Config;
pub use log_stream::LogStreamSession;
pub use metrics::{MetricsSnapshot, MetricsStream};
pub use session_store::{SessionKind, SessionStore};
pub use socket::{Connector, Endpoint, ReadyState, SocketEvent, SocketHandle};
pub use terminal::TerminalSession;
