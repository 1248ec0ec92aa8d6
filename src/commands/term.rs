//! `term` - interactive terminal with detach and resume.
//!
//! Keystrokes are read on a blocking thread and published on the event hub
//! as input events. `Ctrl-]` detaches: the session is unmounted, which
//! parks the socket, and a prompt offers to resume it or quit.

use std::io::{Read, Write};

use anyhow::{Context, Result};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

use super::Services;
use crate::listeners::UiEvent;
use crate::session_store::SessionKind;
use crate::terminal::{InputDecoder, MountError, TerminalOptions, TerminalSession, Vt100Surface};

/// `Ctrl-]`.
const DETACH_KEY: u8 = 0x1d;

/// Why the attached loop ended.
enum Exit {
    Detached,
    Closed,
}

/// Run the terminal until the remote side closes it or the user quits.
pub async fn run(services: &Services, options: TerminalOptions) -> Result<()> {
    crossterm::terminal::enable_raw_mode().context("Failed to enable raw mode")?;
    let _raw_mode = scopeguard::guard((), |()| {
        let _ = crossterm::terminal::disable_raw_mode();
    });

    let mut input = spawn_stdin_reader();
    let mut winch = signal(SignalKind::window_change()).context("Failed to listen for SIGWINCH")?;
    let mut stdout = std::io::stdout();

    loop {
        let surface = Box::new(Vt100Surface::stdout());
        let mut session = match TerminalSession::mount_with(surface, services.terminal_deps(), options) {
            Ok(session) => session,
            Err(MountError::SignedOut) => {
                write!(stdout, "{}\r\n", services.messages.refresh_page)?;
                return Ok(());
            }
        };

        let mut decoder = InputDecoder::new();
        let exit = loop {
            tokio::select! {
                wake = session.wait() => {
                    if !session.dispatch(wake).await {
                        break Exit::Closed;
                    }
                }
                bytes = input.recv() => {
                    let Some(bytes) = bytes else {
                        session.close();
                        break Exit::Closed;
                    };
                    if let Some(pos) = bytes.iter().position(|b| *b == DETACH_KEY) {
                        forward_input(services, &mut decoder, &bytes[..pos]);
                        break Exit::Detached;
                    }
                    forward_input(services, &mut decoder, &bytes);
                }
                _ = winch.recv() => {
                    services.hub.emit(UiEvent::WindowResize);
                }
            }
        };

        session.handle_pending_ui();
        session.unmount();

        match exit {
            Exit::Closed => return Ok(()),
            Exit::Detached => {
                write!(stdout, "\r\n[detached: r to resume, q to quit]\r\n")?;
                stdout.flush()?;
                if !wait_for_resume(&mut input).await {
                    services.store.clear(SessionKind::Terminal);
                    return Ok(());
                }
            }
        }
    }
}

fn forward_input(services: &Services, decoder: &mut InputDecoder, bytes: &[u8]) {
    let text = decoder.push(bytes);
    if !text.is_empty() {
        services.hub.emit(UiEvent::Input(text));
    }
}

async fn wait_for_resume(input: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> bool {
    while let Some(bytes) = input.recv().await {
        for byte in bytes {
            match byte {
                b'r' | b'R' => return true,
                b'q' | b'Q' | 0x03 | 0x04 => return false,
                _ => {}
            }
        }
    }
    false
}

/// Read raw stdin on a blocking thread.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<Vec<u8>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let mut stdin = std::io::stdin();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("[Console] stdin read failed: {}", e);
                    break;
                }
            }
        }
    });
    rx
}
