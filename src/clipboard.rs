//! Copying log text out of the console.
//!
//! The system clipboard is tried first. When it is unavailable (headless
//! session, SSH) the text is sent to the hosting terminal as an OSC 52
//! sequence instead. Errors never reach the caller; a failed copy is logged.

use std::io::Write;

use anyhow::{anyhow, Result};
use base64::Engine;
use copypasta::{ClipboardContext, ClipboardProvider};

/// Remove SGR and other CSI escape sequences from `text`.
pub fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\x1b' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'[') {
            chars.next();
            // Parameters and intermediates, up to the final byte.
            for c in chars.by_ref() {
                if ('\x40'..='\x7e').contains(&c) {
                    break;
                }
            }
        }
    }
    out
}

/// A place copied text can go.
pub trait Clipboard {
    /// Replace the clipboard contents.
    fn set_text(&mut self, text: &str) -> Result<()>;
}

/// The desktop clipboard.
#[derive(Debug, Default)]
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn set_text(&mut self, text: &str) -> Result<()> {
        let mut ctx = ClipboardContext::new().map_err(|e| anyhow!("clipboard unavailable: {e}"))?;
        ctx.set_contents(text.to_string())
            .map_err(|e| anyhow!("failed to set clipboard: {e}"))
    }
}

/// Clipboard write through the hosting terminal (OSC 52).
#[derive(Debug)]
pub struct Osc52Clipboard<W: Write> {
    out: W,
}

impl<W: Write> Osc52Clipboard<W> {
    /// Write sequences to `out` (normally stdout).
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Consume the clipboard, returning the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Clipboard for Osc52Clipboard<W> {
    fn set_text(&mut self, text: &str) -> Result<()> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(text);
        write!(self.out, "\x1b]52;c;{encoded}\x07")?;
        self.out.flush()?;
        Ok(())
    }
}

/// Copy `text` (ANSI stripped) via `primary`, falling back to `fallback`.
///
/// Returns whether either clipboard accepted the text.
pub fn copy_with_fallback(text: &str, primary: &mut dyn Clipboard, fallback: &mut dyn Clipboard) -> bool {
    let plain = strip_ansi(text);
    match primary.set_text(&plain) {
        Ok(()) => true,
        Err(e) => {
            log::debug!("[Clipboard] Primary copy failed, using fallback: {:#}", e);
            match fallback.set_text(&plain) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("[Clipboard] Copy failed: {:#}", e);
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    impl Clipboard for Broken {
        fn set_text(&mut self, _text: &str) -> Result<()> {
            anyhow::bail!("no display")
        }
    }

    #[derive(Default)]
    struct Recording(Vec<String>);

    impl Clipboard for Recording {
        fn set_text(&mut self, text: &str) -> Result<()> {
            self.0.push(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn strip_ansi_removes_color_codes() {
        assert_eq!(strip_ansi("\x1b[31merror\x1b[0m: boom"), "error: boom");
        assert_eq!(strip_ansi("\x1b[1;33mwarn\x1b[m"), "warn");
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn fallback_used_when_primary_fails() {
        let mut fallback = Recording::default();
        assert!(copy_with_fallback("\x1b[34mdbg\x1b[0m", &mut Broken, &mut fallback));
        assert_eq!(fallback.0, vec!["dbg".to_string()]);
    }

    #[test]
    fn primary_success_skips_fallback() {
        let mut primary = Recording::default();
        let mut fallback = Recording::default();
        assert!(copy_with_fallback("x", &mut primary, &mut fallback));
        assert!(fallback.0.is_empty());
    }

    #[test]
    fn both_failing_is_swallowed() {
        assert!(!copy_with_fallback("x", &mut Broken, &mut Broken));
    }

    #[test]
    fn osc52_sequence() {
        let mut clip = Osc52Clipboard::new(Vec::new());
        clip.set_text("hi").expect("write to vec");
        assert_eq!(clip.into_inner(), b"\x1b]52;c;aGk=\x07");
    }
}
