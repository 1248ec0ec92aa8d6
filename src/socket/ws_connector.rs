//! WebSocket-backed [`Connector`].
//!
//! Each [`WsConnector::open`] spawns one driver task that owns the
//! WebSocket and bridges it to the [`SocketPeer`] end of a fresh handle:
//!
//! ```text
//!   SocketHandle ══ SocketPeer ── run_socket() ── tokio-tungstenite ── server
//! ```
//!
//! The driver mirrors browser socket semantics: a failed handshake or read
//! error produces `Error` followed by `Close { code: 1006 }`, a server close
//! frame produces `Close` with the server's code and reason, and dropping
//! the handle closes the connection. Pings are answered by tungstenite and
//! never reach the session.

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::{self, Message};

use super::{Connector, Endpoint, Inbound, Outbound, SocketHandle, SocketPeer};

/// Close code reported when the connection ends without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code reported after a client-requested close.
const NORMAL_CLOSURE: u16 = 1000;

/// Close code for a close frame that carried no status.
const NO_STATUS: u16 = 1005;

/// Opens stream sockets against a SmartDNS web server.
#[derive(Debug, Clone)]
pub struct WsConnector {
    server_url: String,
    token: Option<String>,
}

impl WsConnector {
    /// Create a connector for `server_url` (http, https, ws or wss).
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            token: None,
        }
    }

    /// Send `token` as a bearer token with every handshake.
    pub fn with_token(mut self, token: Option<&str>) -> Self {
        self.token = token.filter(|t| !t.is_empty()).map(String::from);
        self
    }

    /// WebSocket URL for an endpoint.
    pub fn url_for(&self, endpoint: Endpoint) -> String {
        socket_url(&self.server_url, endpoint.path())
    }
}

impl Connector for WsConnector {
    fn open(&self, endpoint: Endpoint) -> SocketHandle {
        let (handle, peer) = SocketHandle::pair(endpoint);
        let url = self.url_for(endpoint);
        log::info!("[Socket] Opening {} (socket {})", url, handle.id());
        tokio::spawn(run_socket(url, self.token.clone(), peer));
        handle
    }
}

/// Join a server URL and a stream path, mapping http(s) to ws(s).
fn socket_url(server_url: &str, path: &str) -> String {
    let base = server_url.trim_end_matches('/');
    match base.split_once("://") {
        Some(("https", host)) => format!("wss://{host}{path}"),
        Some(("http", host)) => format!("ws://{host}{path}"),
        _ => format!("{base}{path}"),
    }
}

/// Handshake request for `url`, with the bearer token if there is one.
fn handshake_request(url: &str, token: Option<&str>) -> Result<Request> {
    let mut request = url
        .into_client_request()
        .with_context(|| format!("invalid WebSocket URL: {url}"))?;
    if let Some(token) = token {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .context("token is not a valid header value")?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    Ok(request)
}

/// What one read from the server amounts to.
#[derive(Debug)]
enum Received {
    Message(Inbound),
    Closed { code: u16, reason: String },
    Failed(String),
}

/// Map one read off the WebSocket. Control frames map to `None`.
fn classify(read: Option<Result<Message, tungstenite::Error>>) -> Option<Received> {
    match read {
        Some(Ok(Message::Binary(data))) => Some(Received::Message(Inbound::Binary(data.to_vec()))),
        Some(Ok(Message::Text(text))) => Some(Received::Message(Inbound::Text(text.to_string()))),
        Some(Ok(Message::Close(frame))) => {
            let (code, reason) = frame.map_or((NO_STATUS, String::new()), |frame| {
                (u16::from(frame.code), frame.reason.to_string())
            });
            Some(Received::Closed { code, reason })
        }
        Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => None,
        Some(Err(e)) => Some(Received::Failed(e.to_string())),
        None => Some(Received::Closed {
            code: ABNORMAL_CLOSURE,
            reason: String::new(),
        }),
    }
}

/// Drive one WebSocket until either side closes it.
async fn run_socket(url: String, token: Option<String>, mut peer: SocketPeer) {
    let connected = match handshake_request(&url, token.as_deref()) {
        Ok(request) => tokio_tungstenite::connect_async(request)
            .await
            .context("WebSocket connect failed"),
        Err(e) => Err(e),
    };
    let (mut sink, mut stream) = match connected {
        Ok((ws, _response)) => ws.split(),
        Err(e) => {
            log::warn!("[Socket] Connection to {} failed: {:#}", url, e);
            peer.fail(format!("{e:#}"));
            peer.close(ABNORMAL_CLOSURE, "");
            return;
        }
    };

    // The handle may have asked to close while the handshake was running.
    if let Some(Outbound::Close) = peer.try_next_outbound() {
        let _ = sink.close().await;
        peer.close(NORMAL_CLOSURE, "");
        return;
    }

    log::debug!("[Socket] Connected to {}", url);
    peer.open();

    loop {
        tokio::select! {
            read = stream.next() => match classify(read) {
                None => {}
                Some(Received::Message(message)) => peer.deliver(message),
                Some(Received::Closed { code, reason }) => {
                    log::info!("[Socket] {} closed ({} {})", url, code, reason);
                    peer.close(code, reason);
                    return;
                }
                Some(Received::Failed(e)) => {
                    log::warn!("[Socket] {} read error: {}", url, e);
                    peer.fail(e);
                    peer.close(ABNORMAL_CLOSURE, "");
                    return;
                }
            },

            out = peer.next_outbound() => {
                let message = match out {
                    Some(Outbound::Binary(data)) => Message::Binary(data),
                    Some(Outbound::Text(text)) => Message::Text(text),
                    Some(Outbound::Close) | None => {
                        let _ = sink.close().await;
                        peer.close(NORMAL_CLOSURE, "");
                        return;
                    }
                };
                if let Err(e) = sink.send(message).await {
                    log::warn!("[Socket] {} send failed: {}", url, e);
                    peer.fail(e.to_string());
                    peer.close(ABNORMAL_CLOSURE, "");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::{ReadyState, SocketEvent};
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    #[test]
    fn url_for_maps_scheme_and_path() {
        let connector = WsConnector::new("https://dns.lan:6080/");
        assert_eq!(
            connector.url_for(Endpoint::Terminal),
            "wss://dns.lan:6080/api/tool/term"
        );
        assert_eq!(
            socket_url("http://127.0.0.1:6080", "/api/log/stream"),
            "ws://127.0.0.1:6080/api/log/stream"
        );
        assert_eq!(socket_url("ws://dns.lan", "/x"), "ws://dns.lan/x");
    }

    #[test]
    fn token_goes_into_the_handshake() {
        let connector = WsConnector::new("http://x").with_token(Some(""));
        assert_eq!(connector.token, None);

        let request = handshake_request("ws://dns.lan/api/tool/term", Some("abc")).unwrap();
        assert_eq!(request.headers()[AUTHORIZATION], "Bearer abc");
        let request = handshake_request("ws://dns.lan/api/tool/term", None).unwrap();
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn invalid_url_is_rejected_before_connecting() {
        assert!(handshake_request("not-a-url", None).is_err());
    }

    #[test]
    fn close_frames_keep_code_and_reason() {
        let frame = CloseFrame {
            code: CloseCode::from(4001),
            reason: "Session expired".into(),
        };
        match classify(Some(Ok(Message::Close(Some(frame))))) {
            Some(Received::Closed { code, reason }) => {
                assert_eq!(code, 4001);
                assert_eq!(reason, "Session expired");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            classify(Some(Ok(Message::Close(None)))),
            Some(Received::Closed { code: 1005, .. })
        ));
        assert!(matches!(
            classify(None),
            Some(Received::Closed { code: 1006, .. })
        ));
    }

    #[test]
    fn control_frames_are_not_delivered() {
        assert!(classify(Some(Ok(Message::Ping(vec![1].into())))).is_none());
        assert!(classify(Some(Ok(Message::Pong(vec![].into())))).is_none());
        assert!(matches!(
            classify(Some(Ok(Message::Binary(vec![0, 1].into())))),
            Some(Received::Message(Inbound::Binary(data))) if data == [0, 1]
        ));
    }

    #[tokio::test]
    async fn unreachable_server_reports_error_then_close() {
        let connector = WsConnector::new("http://127.0.0.1:1");
        let mut handle = connector.open(Endpoint::Metrics);
        assert_eq!(handle.ready_state(), ReadyState::Connecting);
        assert!(matches!(handle.next_event().await, Some(SocketEvent::Error(_))));
        assert!(matches!(
            handle.next_event().await,
            Some(SocketEvent::Close { code: 1006, .. })
        ));
        assert_eq!(handle.ready_state(), ReadyState::Closed);
    }
}
