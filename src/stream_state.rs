//! Lifecycle shared by the log and terminal sessions.
//!
//! ```text
//! Connecting ──open──> Open <──resume── Paused
//!     │                 │ └────pause────>  │
//!     │                 │                  │
//!     └──error──> Errored ──close──> Closed <──close── Closing
//! ```
//!
//! `Errored` triggers the session-expiry probe; the close event that
//! follows every transport error settles it into `Closed`.

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// Socket handshake in progress.
    #[default]
    Connecting,
    /// Live.
    Open,
    /// Live, output paused by the user or by parking.
    Paused,
    /// Close requested locally.
    Closing,
    /// Socket released.
    Closed,
    /// Transport error seen; waiting for the close event.
    Errored,
}

impl StreamState {
    /// Socket opened. A pause requested while connecting survives the open.
    pub fn on_open(self) -> Self {
        match self {
            Self::Paused => Self::Paused,
            Self::Connecting => Self::Open,
            other => other,
        }
    }

    /// Pause requested.
    pub fn on_pause(self) -> Self {
        match self {
            Self::Open | Self::Connecting => Self::Paused,
            other => other,
        }
    }

    /// Resume requested.
    pub fn on_resume(self) -> Self {
        match self {
            Self::Paused => Self::Open,
            other => other,
        }
    }

    /// Transport error.
    pub fn on_error(self) -> Self {
        match self {
            Self::Connecting | Self::Open | Self::Paused => Self::Errored,
            other => other,
        }
    }

    /// Local close requested.
    pub fn on_close_requested(self) -> Self {
        match self {
            Self::Closed => Self::Closed,
            _ => Self::Closing,
        }
    }

    /// Whether the session is past the point of delivering data.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}
