//! Integration tests for the run-log and audit-log sessions.
//!
//! Sessions are driven through `step()` against in-memory sockets, the way
//! the `logs` command drives them.

mod common;

use std::time::Duration;

use common::Harness;
use smartdns_console::auth::LoginStatus;
use smartdns_console::clipboard::{Clipboard, Osc52Clipboard};
use smartdns_console::codec::LineColor;
use smartdns_console::follow::ScrollPosition;
use smartdns_console::log_buffer::LogLine;
use smartdns_console::log_stream::{LogStreamOptions, LogStreamSession};
use smartdns_console::socket::{Blob, Inbound, Outbound, SocketPeer};
use smartdns_console::stream_state::StreamState;
use smartdns_console::{LogKind, LogLevel};

struct NoDisplay;

impl Clipboard for NoDisplay {
    fn set_text(&mut self, _text: &str) -> anyhow::Result<()> {
        anyhow::bail!("no display")
    }
}

async fn open_log(h: &mut Harness, kind: LogKind) -> (LogStreamSession, SocketPeer) {
    let mut session = LogStreamSession::open(kind, h.log_deps());
    let mut peer = h.next_peer();
    peer.open();
    assert!(session.step().await);
    peer.drain_outbound();
    (session, peer)
}

fn texts(session: &LogStreamSession) -> Vec<String> {
    session.buffer().iter().map(|line| line.text.clone()).collect()
}

#[tokio::test]
async fn test_level_change_is_fire_and_forget() {
    let mut h = Harness::new();
    let (mut session, mut peer) = open_log(&mut h, LogKind::RunLog).await;

    assert!(session.set_level(LogLevel::Error));
    assert_eq!(session.level(), Some(LogLevel::Error));
    assert_eq!(
        peer.drain_outbound(),
        vec![Outbound::Binary(b"\x01\x03error".to_vec())]
    );

    // Lines already in flight at a lower level are still shown.
    peer.deliver_binary(b"\x00\x01late info line\n".to_vec());
    assert!(session.step().await);
    assert_eq!(
        session.buffer().last(),
        Some(&LogLine::plain("late info line"))
    );
    assert!(peer.drain_outbound().is_empty());
}

#[tokio::test]
async fn test_level_change_before_open_is_not_sent() {
    let mut h = Harness::new();
    let mut session = LogStreamSession::open(LogKind::RunLog, h.log_deps());
    let mut peer = h.next_peer();

    assert!(!session.set_level(LogLevel::Debug));
    assert_eq!(session.level(), Some(LogLevel::Debug));

    peer.open();
    assert!(session.step().await);
    assert!(peer.drain_outbound().is_empty());
}

#[tokio::test]
async fn test_pause_while_connecting_is_sent_on_open() {
    let mut h = Harness::new();
    let mut session = LogStreamSession::open(LogKind::RunLog, h.log_deps());
    let mut peer = h.next_peer();

    session.pause();
    assert!(session.is_paused());
    assert!(peer.drain_outbound().is_empty());

    peer.open();
    assert!(session.step().await);
    assert_eq!(session.state(), StreamState::Paused);
    assert_eq!(peer.drain_outbound(), vec![Outbound::Binary(vec![1, 1])]);
}

#[tokio::test]
async fn test_audit_log_frames_have_no_level() {
    let mut h = Harness::new();
    let (mut session, peer) = open_log(&mut h, LogKind::AuditLog).await;

    peer.deliver_binary(b"\x00user admin logged in\r\nuser admin changed config\n".to_vec());
    assert!(session.step().await);
    assert_eq!(
        texts(&session)[2..],
        ["user admin logged in", "user admin changed config"]
    );
    assert!(session.buffer().iter().skip(2).all(|line| line.color.is_none()));
}

#[tokio::test]
async fn test_blob_messages_are_materialized() {
    let mut h = Harness::new();
    let (mut session, peer) = open_log(&mut h, LogKind::RunLog).await;

    peer.deliver(Inbound::Blob(Blob::new(&b"\x00\x03upstream slow\n"[..])));
    assert!(session.step().await);
    assert_eq!(
        session.buffer().last(),
        Some(&LogLine::colored("upstream slow", LineColor::Yellow))
    );
}

#[tokio::test]
async fn test_buffer_keeps_newest_lines() {
    let mut h = Harness::new();
    let options = LogStreamOptions {
        capacity: 5,
        ..LogStreamOptions::default()
    };
    let mut session = LogStreamSession::open_with(LogKind::RunLog, h.log_deps(), options);
    let peer = h.next_peer();
    peer.open();
    for i in 0..10 {
        peer.deliver_binary(format!("\x00\x01line {i}\n").into_bytes());
    }
    for _ in 0..11 {
        assert!(session.step().await);
    }

    assert_eq!(session.buffer().len(), 5);
    assert_eq!(
        texts(&session),
        ["line 5", "line 6", "line 7", "line 8", "line 9"]
    );
}

#[tokio::test]
async fn test_default_capacity_is_two_thousand_lines() {
    let mut h = Harness::new();
    let (mut session, peer) = open_log(&mut h, LogKind::AuditLog).await;

    let chunk: String = (0..2100).map(|i| format!("entry {i}\n")).collect();
    let mut frame = vec![0x00];
    frame.extend_from_slice(chunk.as_bytes());
    peer.deliver_binary(frame);
    assert!(session.step().await);

    assert_eq!(session.buffer().len(), 2000);
    assert_eq!(texts(&session).first().map(String::as_str), Some("entry 100"));
}

#[tokio::test]
async fn test_follow_hysteresis_through_session() {
    let mut h = Harness::new();
    let (mut session, _peer) = open_log(&mut h, LogKind::RunLog).await;

    let away = ScrollPosition {
        scroll_top: 0.0,
        scroll_height: 2000.0,
        client_height: 500.0,
    };
    let near_bottom = ScrollPosition {
        scroll_top: 1460.0,
        scroll_height: 2000.0,
        client_height: 500.0,
    };

    assert!(session.is_following());
    assert!(session.on_scroll(away));
    assert!(session.on_scroll(away));
    assert!(session.on_scroll(away));
    assert!(!session.on_scroll(away));
    assert!(!session.is_following());
    assert!(session.on_scroll(near_bottom));
}

#[tokio::test]
async fn test_copy_falls_back_and_strips_ansi() {
    let mut h = Harness::new();
    let (mut session, peer) = open_log(&mut h, LogKind::RunLog).await;
    peer.deliver_binary(b"\x00\x04\x1b[1mquery failed\x1b[0m\n".to_vec());
    assert!(session.step().await);

    let mut fallback = Osc52Clipboard::new(Vec::new());
    assert!(session.copy_to_clipboard(&mut NoDisplay, &mut fallback));
    let written = String::from_utf8(fallback.into_inner()).unwrap();
    assert!(written.starts_with("\x1b]52;c;"));
    assert!(written.ends_with('\x07'));
}

#[tokio::test]
async fn test_clear_empties_buffer_but_keeps_socket() {
    let mut h = Harness::new();
    let (mut session, mut peer) = open_log(&mut h, LogKind::RunLog).await;

    session.clear();
    assert!(session.buffer().is_empty());
    peer.deliver_binary(b"\x00\x01after clear\n".to_vec());
    assert!(session.step().await);
    assert_eq!(texts(&session), ["after clear"]);
    assert!(peer.drain_outbound().is_empty());
}

#[tokio::test]
async fn test_transport_error_with_expired_login() {
    let mut h = Harness::with_auth(LoginStatus::Expired("expired".into()));
    let (mut session, peer) = open_log(&mut h, LogKind::RunLog).await;

    peer.fail("reset by peer");
    assert!(session.step().await);
    assert_eq!(session.state(), StreamState::Errored);
    assert_eq!(
        session.buffer().last(),
        Some(&LogLine::colored("unexpected socket close", LineColor::Red))
    );
    assert_eq!(h.auth.calls(), 1);
    assert!(!h.user.is_signed_in());

    peer.close(1006, "");
    assert!(!session.step().await);
    assert_eq!(session.state(), StreamState::Closed);
    assert_eq!(
        session.buffer().last().map(|line| line.text.as_str()),
        Some("Disconnected from log stream.")
    );
}

#[tokio::test]
async fn test_login_check_finishes_while_interrupt_is_pending() {
    let mut h = Harness::with_slow_auth(
        LoginStatus::Expired("expired".into()),
        Duration::from_millis(50),
    );
    let (mut session, peer) = open_log(&mut h, LogKind::RunLog).await;
    let interrupt = tokio::time::sleep(Duration::from_millis(10));
    tokio::pin!(interrupt);

    peer.fail("reset by peer");
    tokio::select! {
        event = session.next_event() => assert!(session.dispatch(event).await),
        () = &mut interrupt => panic!("interrupt won over a queued socket error"),
    }

    assert_eq!(h.auth.completed(), 1);
    assert!(!h.user.is_signed_in());
    assert_eq!(session.state(), StreamState::Errored);
}

#[tokio::test]
async fn test_switching_streams_opens_one_socket_each() {
    let mut h = Harness::new();
    let (mut session, mut run_peer) = open_log(&mut h, LogKind::RunLog).await;

    session.select_kind(LogKind::AuditLog);
    assert_eq!(run_peer.drain_outbound(), vec![Outbound::Close]);
    let audit_peer = h.next_peer();
    audit_peer.open();
    assert!(session.step().await);
    assert_eq!(session.state(), StreamState::Open);

    session.select_kind(LogKind::RunLog);
    assert_eq!(h.connector.opened(), 3);
    assert_eq!(session.state(), StreamState::Connecting);
}

#[tokio::test]
async fn test_drop_closes_socket() {
    let mut h = Harness::new();
    let (session, mut peer) = open_log(&mut h, LogKind::RunLog).await;
    drop(session);
    assert_eq!(peer.drain_outbound(), vec![Outbound::Close]);
}
