//! Terminal rendering surface.
//!
//! [`TerminalSession`](super::TerminalSession) never touches a screen
//! directly; it drives a [`TerminalSurface`]. The CLI uses
//! [`Vt100Surface`], which keeps a vt100 model of the remote screen (for
//! scrollback serialization and selection) and mirrors output to the
//! hosting terminal.

use std::io::Write;

use vt100::Parser;

use super::gesture::ViewportLayout;
use crate::constants::{DEFAULT_TERMINAL_SIZE, TERMINAL_SCROLLBACK_LINES};

/// Operations a terminal session needs from its display.
///
/// Sizes are `(cols, rows)`.
pub trait TerminalSurface: Send {
    /// Render output bytes.
    fn write(&mut self, data: &[u8]);
    /// Clear the screen.
    fn clear(&mut self);
    /// Reset terminal modes and content.
    fn reset(&mut self);
    /// Give the surface input focus.
    fn focus(&mut self);
    /// Fit to the available space and return the resulting size.
    fn fit(&mut self) -> (u16, u16);
    /// Current size.
    fn size(&self) -> (u16, u16);
    /// Set the size (remote-initiated).
    fn resize(&mut self, cols: u16, rows: u16);
    /// Scroll the viewport; negative moves into history.
    fn scroll_lines(&mut self, lines: i32);
    /// Serialize content (history and screen) for later replay.
    fn serialize(&mut self) -> Option<String>;
    /// Select everything and return the selected text.
    fn select_all(&mut self) -> String;
    /// Adjust for an on-screen keyboard.
    fn apply_layout(&mut self, layout: ViewportLayout);
}

type SizeSource = Box<dyn Fn() -> Option<(u16, u16)> + Send>;

/// vt100-backed surface that mirrors output to a writer.
pub struct Vt100Surface<W: Write + Send> {
    parser: Parser,
    out: W,
    host_size: SizeSource,
    layout: ViewportLayout,
    focused: bool,
}

impl<W: Write + Send> std::fmt::Debug for Vt100Surface<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vt100Surface")
            .field("size", &self.size())
            .field("layout", &self.layout)
            .field("focused", &self.focused)
            .finish_non_exhaustive()
    }
}

impl Vt100Surface<std::io::Stdout> {
    /// Surface on stdout, sized from the hosting terminal.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout(), || crossterm::terminal::size().ok())
    }
}

impl<W: Write + Send> Vt100Surface<W> {
    /// Surface writing to `out`, fitting to whatever `host_size` reports.
    pub fn new(out: W, host_size: impl Fn() -> Option<(u16, u16)> + Send + 'static) -> Self {
        let (cols, rows) = host_size().unwrap_or(DEFAULT_TERMINAL_SIZE);
        Self {
            parser: Parser::new(rows.max(1), cols.max(1), TERMINAL_SCROLLBACK_LINES),
            out,
            host_size: Box::new(host_size),
            layout: ViewportLayout::Full,
            focused: false,
        }
    }

    /// The vt100 screen model.
    pub fn screen(&self) -> &vt100::Screen {
        self.parser.screen()
    }

    /// Whether the surface has focus.
    pub fn is_focused(&self) -> bool {
        self.focused
    }

    /// Current layout.
    pub fn layout(&self) -> ViewportLayout {
        self.layout
    }

    fn emit(&mut self, bytes: &[u8]) {
        if let Err(e) = self.out.write_all(bytes).and_then(|()| self.out.flush()) {
            log::debug!("[Surface] Write failed: {}", e);
        }
    }

    fn set_size(&mut self, cols: u16, rows: u16) {
        if cols == 0 || rows == 0 {
            return;
        }
        self.parser.screen_mut().set_size(rows, cols);
    }

    fn redraw(&mut self) {
        let frame = self.parser.screen().contents_formatted();
        self.emit(&frame);
    }

    /// Text of every scrollback line, oldest first.
    fn history_lines(&mut self) -> Vec<String> {
        let (rows, cols) = self.parser.screen().size();
        let screen = self.parser.screen_mut();
        screen.set_scrollback(usize::MAX);
        let depth = screen.scrollback();

        let mut lines = Vec::with_capacity(depth);
        let mut offset = depth;
        while offset > 0 {
            screen.set_scrollback(offset);
            let visible = offset.min(usize::from(rows));
            lines.extend(screen.rows(0, cols).take(visible));
            offset = offset.saturating_sub(usize::from(rows));
        }
        screen.set_scrollback(0);
        lines
    }
}

impl<W: Write + Send> TerminalSurface for Vt100Surface<W> {
    fn write(&mut self, data: &[u8]) {
        self.parser.process(data);
        self.emit(data);
    }

    fn clear(&mut self) {
        const CLEAR: &[u8] = b"\x1b[H\x1b[2J";
        self.parser.process(CLEAR);
        self.emit(CLEAR);
    }

    fn reset(&mut self) {
        let (rows, cols) = self.parser.screen().size();
        self.parser = Parser::new(rows, cols, TERMINAL_SCROLLBACK_LINES);
        self.emit(b"\x1bc");
    }

    fn focus(&mut self) {
        self.focused = true;
    }

    fn fit(&mut self) -> (u16, u16) {
        let (cols, mut rows) = (self.host_size)().unwrap_or(DEFAULT_TERMINAL_SIZE);
        if let ViewportLayout::KeyboardInset { .. } = self.layout {
            // Leave the bottom half to the keyboard.
            rows = (rows / 2).max(1);
        }
        self.set_size(cols, rows);
        self.size()
    }

    fn size(&self) -> (u16, u16) {
        let (rows, cols) = self.parser.screen().size();
        (cols, rows)
    }

    fn resize(&mut self, cols: u16, rows: u16) {
        self.set_size(cols, rows);
    }

    fn scroll_lines(&mut self, lines: i32) {
        let current = self.parser.screen().scrollback();
        let target = if lines < 0 {
            current.saturating_add(lines.unsigned_abs() as usize)
        } else {
            current.saturating_sub(lines as usize)
        };
        self.parser.screen_mut().set_scrollback(target);
        self.redraw();
    }

    fn serialize(&mut self) -> Option<String> {
        let history = self.history_lines();
        if history.is_empty() && self.parser.screen().contents().trim().is_empty() {
            return None;
        }
        let mut out = String::new();
        if !history.is_empty() {
            for line in history {
                out.push_str(line.trim_end());
                out.push_str("\r\n");
            }
            // Scroll history off the screen so the screen dump below does not erase it.
            let (rows, _) = self.parser.screen().size();
            out.push_str(&"\r\n".repeat(usize::from(rows)));
        }
        out.push_str(&String::from_utf8_lossy(&self.parser.screen().contents_formatted()));
        Some(out)
    }

    fn select_all(&mut self) -> String {
        let mut text = self.history_lines().join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&self.parser.screen().contents());
        text
    }

    fn apply_layout(&mut self, layout: ViewportLayout) {
        self.layout = layout;
    }
}
