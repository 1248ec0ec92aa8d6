//! One-shot modifiers and toolbar actions for terminal input.
//!
//! Touch keyboards have no Ctrl or Alt key, so the toolbar arms a modifier
//! that applies to the next piece of input only.

/// ESC, sent for the toolbar Esc button and as the Alt prefix.
pub const ESC: &str = "\x1b";

/// TAB, sent for the toolbar Tab button.
pub const TAB: &str = "\t";

/// Toolbar buttons shown over the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolbarAction {
    /// Select the whole terminal content.
    SelectAll,
    /// Toggle the one-shot Ctrl modifier.
    Ctrl,
    /// Toggle the one-shot Alt modifier.
    Alt,
    /// Send a tab.
    Tab,
    /// Send an escape.
    Esc,
}

/// Map a character to its control code (`'c'` -> `0x03`).
///
/// The character is upper-cased and 64 is subtracted. Characters below `@`
/// have no control code and are returned unchanged.
pub fn ctrl_char(c: char) -> char {
    let upper = c.to_ascii_uppercase();
    (upper as u32)
        .checked_sub(64)
        .and_then(char::from_u32)
        .unwrap_or(c)
}

/// Frames to send for one piece of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingInput {
    /// ESC sent as its own frame before `data` (Alt).
    pub prefix: Option<&'static str>,
    /// Input text, possibly with the first character rewritten (Ctrl).
    pub data: String,
}

/// Armed one-shot modifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    ctrl: bool,
    alt: bool,
}

impl Modifiers {
    /// Whether Ctrl is armed.
    pub fn ctrl(self) -> bool {
        self.ctrl
    }

    /// Whether Alt is armed.
    pub fn alt(self) -> bool {
        self.alt
    }

    /// Flip Ctrl; returns the new state.
    pub fn toggle_ctrl(&mut self) -> bool {
        self.ctrl = !self.ctrl;
        self.ctrl
    }

    /// Flip Alt; returns the new state.
    pub fn toggle_alt(&mut self) -> bool {
        self.alt = !self.alt;
        self.alt
    }

    /// Apply and disarm the modifiers for `data`.
    pub fn apply(&mut self, data: &str) -> OutgoingInput {
        let mut out = data.to_string();
        if std::mem::take(&mut self.ctrl) {
            let mut chars = data.chars();
            if let Some(first) = chars.next() {
                out = std::iter::once(ctrl_char(first)).chain(chars).collect();
            }
        }
        let prefix = std::mem::take(&mut self.alt).then_some(ESC);
        OutgoingInput { prefix, data: out }
    }
}

/// Turns raw keyboard bytes into text without splitting characters.
///
/// A multi-byte character cut by a read boundary is held back until the
/// rest of it arrives. Bytes that can never form a character become U+FFFD.
#[derive(Debug, Default, Clone)]
pub struct InputDecoder {
    pending: Vec<u8>,
}

impl InputDecoder {
    /// Create a decoder with nothing held back.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next chunk. Returns an empty string while a character is
    /// still incomplete.
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        let mut rest = self.pending.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // `valid` was just checked.
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }
        self.pending = rest.to_vec();
        out
    }

    /// Whether bytes of an incomplete character are held back.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
