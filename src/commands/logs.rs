//! `logs` - follow the run log or the audit log.

use std::io::Write;

use anyhow::Result;

use super::Services;
use crate::clipboard::{Osc52Clipboard, SystemClipboard};
use crate::codec::{LogKind, LogLevel};
use crate::log_stream::{LogStreamOptions, LogStreamSession};
use crate::stream_state::StreamState;

/// What to show.
#[derive(Debug, Clone, Copy)]
pub struct LogsArgs {
    /// Stream to follow.
    pub kind: LogKind,
    /// Server log level to request once connected (run log only).
    pub level: Option<LogLevel>,
    /// Copy the buffer to the clipboard on exit.
    pub copy_on_exit: bool,
}

/// Stream lines to stdout until the socket closes or Ctrl-C.
pub async fn run(services: &Services, options: LogStreamOptions, args: LogsArgs) -> Result<()> {
    let mut session = LogStreamSession::open_with(args.kind, services.log_deps(), options);
    let mut seen = 0;
    let mut level_sent = false;
    let mut stdout = std::io::stdout();

    loop {
        seen = print_new(&session, seen, &mut stdout)?;

        if !level_sent && session.state() == StreamState::Open {
            if let Some(level) = args.level {
                session.set_level(level);
            }
            level_sent = true;
        }

        tokio::select! {
            event = session.next_event() => {
                if !session.dispatch(event).await {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("[Console] Interrupted");
                session.close();
                break;
            }
        }
    }
    print_new(&session, seen, &mut stdout)?;

    if args.copy_on_exit {
        let mut fallback = Osc52Clipboard::new(std::io::stdout());
        if session.copy_to_clipboard(&mut SystemClipboard, &mut fallback) {
            eprintln!("Copied {} lines.", session.buffer().len());
        }
    }
    Ok(())
}

fn print_new(session: &LogStreamSession, seen: u64, out: &mut impl Write) -> Result<u64> {
    let buffer = session.buffer();
    for line in buffer.since(seen) {
        writeln!(out, "{}", line.render_ansi())?;
    }
    out.flush()?;
    Ok(buffer.pushed())
}
