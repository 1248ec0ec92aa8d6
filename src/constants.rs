//! Reference thresholds and delays for the streaming core.
//!
//! These are the defaults for [`crate::config::Config`]; every one of them
//! can be overridden there. Constants are grouped by the stream that uses
//! them.

use std::time::Duration;

// ============================================================================
// Metrics stream
// ============================================================================

/// Fixed delay before the metrics stream reconnects after an unrequested close.
///
/// Retry is fixed-delay with no attempt cap: the metrics view is expected to
/// stay live for as long as it is shown.
pub const METRICS_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// Number of QPS samples kept for the sparkline window.
pub const QPS_HISTORY_LEN: usize = 60;

// ============================================================================
// Log stream
// ============================================================================

/// Maximum number of rendered lines kept by a log view.
pub const LOG_BUFFER_CAPACITY: usize = 2000;

/// Consecutive "not at bottom" scroll events tolerated before auto-follow
/// turns off. Auto-follow disables once the run length exceeds this value.
pub const FOLLOW_DISABLE_AFTER: u32 = 3;

/// Distance from the bottom (in pixels) that still counts as "at bottom".
pub const FOLLOW_BOTTOM_TOLERANCE_PX: f64 = 50.0;

/// Close codes in this range are application-defined abnormal closes whose
/// reason is shown to the user.
pub const ABNORMAL_CLOSE_CODES: std::ops::RangeInclusive<u16> = 4001..=4999;

// ============================================================================
// Terminal
// ============================================================================

/// Visual viewport shrink (in pixels) above which an on-screen keyboard is
/// assumed to be covering the terminal.
pub const KEYBOARD_HEIGHT_THRESHOLD_PX: f64 = 20.0;

/// Vertical drag distance (in pixels) that scrolls one scrollback line.
pub const TOUCH_SCROLL_PX_PER_LINE: f64 = 30.0;

/// Extra rows sent in the transient resize that forces the remote shell to
/// repaint after a resumed session.
pub const RESUME_REPAINT_EXTRA_ROWS: u16 = 10;

/// Scrollback lines kept by the vt100-backed terminal surface.
pub const TERMINAL_SCROLLBACK_LINES: usize = 3500;

/// How often parked sessions are swept for queued output and closes.
pub const PARKED_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Fallback terminal size `(cols, rows)` when the host size is unknown.
pub const DEFAULT_TERMINAL_SIZE: (u16, u16) = (80, 24);
