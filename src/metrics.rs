//! Reconnecting metrics stream.
//!
//! The server pushes one JSON snapshot per tick on `/api/stats/metrics`.
//! [`MetricsStream`] keeps a socket open for as long as the stream is alive:
//! when the server closes it, a new socket is opened after a fixed delay,
//! with no attempt limit. [`MetricsStream::close`] cancels a pending
//! reconnect and closes the socket; nothing reconnects after that.
//!
//! ```text
//!   open ──> messages ──> close ──(delay)──> open ──> ...
//!                           │
//!                 close()   └──> done
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Notify};

use crate::constants::{METRICS_RECONNECT_DELAY, QPS_HISTORY_LEN};
use crate::socket::{Connector, Endpoint, Inbound, SocketEvent, SocketHandle};

/// One metrics snapshot as sent by the server.
///
/// Missing fields default to zero; keys this client does not know are kept
/// in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSnapshot {
    /// Cache hit rate in percent.
    pub cache_hit_rate: f64,
    /// Number of cached records.
    pub cache_number: u64,
    /// Average query time in milliseconds.
    pub avg_query_time: f64,
    /// Queries answered from the block list.
    pub block_query_count: u64,
    /// Queries seen since startup.
    pub total_query_count: u64,
    /// Cache memory in bytes.
    pub cache_memory_size: u64,
    /// Set when the server has stopped processing requests (disk full).
    pub is_metrics_suspended: bool,
    /// Queries per second.
    pub qps: f64,
    /// Any other keys.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A snapshot with its arrival number (1-based, counted across reconnects).
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsUpdate {
    /// Update counter.
    pub index: u64,
    /// Parsed snapshot.
    pub snapshot: MetricsSnapshot,
}

/// Sliding window of recent QPS samples.
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl MetricsHistory {
    /// Window of `capacity` samples.
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Record a snapshot's QPS.
    pub fn record(&mut self, snapshot: &MetricsSnapshot) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(snapshot.qps);
    }

    /// Samples, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }

    /// Largest sample in the window.
    pub fn peak(&self) -> f64 {
        self.samples.iter().copied().fold(0.0, f64::max)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True before the first sample.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::new(QPS_HISTORY_LEN)
    }
}

/// Human-readable byte size (`512B`, `1.50KB`, `3.00MB`, ...).
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KB", "MB", "GB", "TB", "PB"];
    if bytes < 1024 {
        return format!("{bytes}B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2}{}", value, UNITS[unit])
}

/// Handle to the background metrics task.
///
/// Dropping the handle closes the stream.
#[derive(Debug)]
pub struct MetricsStream {
    close_requested: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl MetricsStream {
    /// Open the metrics socket with the default reconnect delay.
    pub fn connect(connector: Arc<dyn Connector>) -> (Self, mpsc::UnboundedReceiver<MetricsUpdate>) {
        Self::connect_with_delay(connector, METRICS_RECONNECT_DELAY)
    }

    /// Open the metrics socket, reconnecting `reconnect_delay` after every
    /// unrequested close.
    pub fn connect_with_delay(
        connector: Arc<dyn Connector>,
        reconnect_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<MetricsUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let close_requested = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(Notify::new());

        tokio::spawn(run_metrics_loop(
            connector,
            reconnect_delay,
            tx,
            Arc::clone(&close_requested),
            Arc::clone(&wake),
        ));

        (Self { close_requested, wake }, rx)
    }

    /// Close the socket and cancel any pending reconnect.
    pub fn close(&self) {
        if !self.close_requested.swap(true, Ordering::SeqCst) {
            log::debug!("[Metrics] Close requested");
        }
        self.wake.notify_one();
    }

    /// Whether [`Self::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
    }
}

impl Drop for MetricsStream {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_metrics_loop(
    connector: Arc<dyn Connector>,
    reconnect_delay: Duration,
    tx: mpsc::UnboundedSender<MetricsUpdate>,
    close_requested: Arc<AtomicBool>,
    wake: Arc<Notify>,
) {
    let mut index: u64 = 0;

    loop {
        if close_requested.load(Ordering::SeqCst) {
            break;
        }

        let mut socket = connector.open(Endpoint::Metrics);
        log::info!("[Metrics] Connecting (socket {})", socket.id());

        if !pump_socket(&mut socket, &tx, &close_requested, &wake, &mut index).await {
            socket.close();
            break;
        }

        if close_requested.load(Ordering::SeqCst) {
            break;
        }

        log::info!("[Metrics] Disconnected, reconnecting in {:?}", reconnect_delay);
        tokio::select! {
            () = tokio::time::sleep(reconnect_delay) => {}
            () = wake.notified() => {}
        }
    }

    log::info!("[Metrics] Stream closed");
}

/// Forward snapshots until the socket closes.
///
/// Returns `false` when the loop should stop (close requested or nobody
/// listening), `true` when the socket closed on its own.
async fn pump_socket(
    socket: &mut SocketHandle,
    tx: &mpsc::UnboundedSender<MetricsUpdate>,
    close_requested: &AtomicBool,
    wake: &Notify,
    index: &mut u64,
) -> bool {
    loop {
        tokio::select! {
            () = wake.notified() => {
                if close_requested.load(Ordering::SeqCst) {
                    return false;
                }
            }
            event = socket.next_event() => match event {
                Some(SocketEvent::Open) => log::debug!("[Metrics] Connected"),
                Some(SocketEvent::Message(inbound)) => {
                    let Some(snapshot) = parse_snapshot(inbound).await else {
                        continue;
                    };
                    *index += 1;
                    let update = MetricsUpdate { index: *index, snapshot };
                    if tx.send(update).is_err() {
                        log::debug!("[Metrics] Receiver dropped");
                        return false;
                    }
                }
                Some(SocketEvent::Error(e)) => log::warn!("[Metrics] Socket error: {}", e),
                Some(SocketEvent::Close { code, reason }) => {
                    log::info!("[Metrics] Socket closed ({} {})", code, reason);
                    return true;
                }
                None => return true,
            }
        }
    }
}

async fn parse_snapshot(inbound: Inbound) -> Option<MetricsSnapshot> {
    let text = match inbound {
        Inbound::Text(text) => text,
        other => String::from_utf8(other.into_binary().await?).ok()?,
    };
    match serde_json::from_str(&text) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            log::debug!("[Metrics] Ignoring malformed snapshot: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_defaults_missing_fields_and_keeps_extras() {
        let snapshot: MetricsSnapshot =
            serde_json::from_str(r#"{"qps": 12.5, "cache_number": 7, "uptime": 99}"#).expect("json");
        assert!((snapshot.qps - 12.5).abs() < f64::EPSILON);
        assert_eq!(snapshot.cache_number, 7);
        assert!(!snapshot.is_metrics_suspended);
        assert_eq!(snapshot.extra.get("uptime"), Some(&serde_json::json!(99)));
    }

    #[test]
    fn history_keeps_last_sixty_samples() {
        let mut history = MetricsHistory::default();
        for i in 0..75 {
            history.record(&MetricsSnapshot {
                qps: f64::from(i),
                ..MetricsSnapshot::default()
            });
        }
        assert_eq!(history.len(), 60);
        assert_eq!(history.samples().next(), Some(15.0));
        assert!((history.peak() - 74.0).abs() < f64::EPSILON);
    }

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(1536), "1.50KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00MB");
    }

    #[tokio::test]
    async fn text_and_binary_snapshots_parse_and_garbage_is_dropped() {
        assert!(parse_snapshot(Inbound::Text(r#"{"qps":1}"#.into())).await.is_some());
        assert!(parse_snapshot(Inbound::Binary(br#"{"qps":1}"#.to_vec())).await.is_some());
        assert!(parse_snapshot(Inbound::Text("not json".into())).await.is_none());
    }
}
