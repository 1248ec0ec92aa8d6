//! Fixed-capacity line buffer for log views.
//!
//! When the buffer is full, pushing a new line silently evicts the oldest
//! one. Insertion order is eviction order, so the buffer always holds the
//! most recent `capacity` lines in arrival order.

use std::collections::VecDeque;

use crate::codec::LineColor;
use crate::constants::LOG_BUFFER_CAPACITY;

/// One rendered log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    /// Line text without the trailing newline.
    pub text: String,
    /// Display colour, `None` for the default colour.
    pub color: Option<LineColor>,
}

impl LogLine {
    /// Line in the default colour.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            color: None,
        }
    }

    /// Line in the given colour.
    pub fn colored(text: impl Into<String>, color: LineColor) -> Self {
        Self {
            text: text.into(),
            color: Some(color),
        }
    }

    /// Render with an SGR colour prefix (and reset) when coloured.
    pub fn render_ansi(&self) -> String {
        match self.color {
            Some(color) => format!("\x1b[{}m{}\x1b[0m", color.ansi_code(), self.text),
            None => self.text.clone(),
        }
    }
}

/// Fixed-capacity FIFO of log lines.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: VecDeque<LogLine>,
    capacity: usize,
    pushed: u64,
}

impl LogBuffer {
    /// Create a buffer holding at most `capacity` lines.
    ///
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "LogBuffer capacity must be > 0");
        Self {
            lines: VecDeque::with_capacity(capacity.min(4096)),
            capacity,
            pushed: 0,
        }
    }

    /// Append a line, evicting the oldest one if full.
    pub fn push(&mut self, line: LogLine) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        self.pushed += 1;
    }

    /// Append every non-empty line of `text`, all in the same colour.
    ///
    /// Returns the number of lines appended.
    pub fn push_text(&mut self, text: &str, color: Option<LineColor>) -> usize {
        let mut appended = 0;
        for line in text.split('\n').filter(|l| !l.is_empty()) {
            self.push(LogLine {
                text: line.trim_end_matches('\r').to_string(),
                color,
            });
            appended += 1;
        }
        appended
    }

    /// Lines, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &LogLine> {
        self.lines.iter()
    }

    /// Lines appended since creation, including evicted and cleared ones.
    ///
    /// Renderers compare this against the value they last saw to find the
    /// lines that are new.
    pub fn pushed(&self) -> u64 {
        self.pushed
    }

    /// Lines appended after the `seen`-th push that are still buffered.
    pub fn since(&self, seen: u64) -> impl Iterator<Item = &LogLine> {
        let new = usize::try_from(self.pushed.saturating_sub(seen)).unwrap_or(usize::MAX);
        let skip = self.lines.len().saturating_sub(new);
        self.lines.iter().skip(skip)
    }

    /// Most recent line.
    pub fn last(&self) -> Option<&LogLine> {
        self.lines.back()
    }

    /// All lines joined with `\n`, without colour.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(&line.text);
            out.push('\n');
        }
        out
    }

    /// Current number of lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True if no lines are buffered.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Discard all lines without changing capacity.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Configured maximum line count.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(LOG_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_empty() {
        let buf = LogBuffer::default();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 2000);
    }

    #[test]
    #[should_panic(expected = "capacity must be > 0")]
    fn zero_capacity_panics() {
        let _ = LogBuffer::new(0);
    }

    #[test]
    fn overflow_keeps_most_recent_in_order() {
        let mut buf = LogBuffer::default();
        for i in 0..2500 {
            buf.push(LogLine::plain(format!("line {i}")));
        }
        assert_eq!(buf.len(), 2000);
        let texts: Vec<&str> = buf.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts[0], "line 500");
        assert_eq!(texts[1999], "line 2499");
        assert!(texts.windows(2).all(|w| {
            let a: usize = w[0][5..].parse().expect("numbered");
            let b: usize = w[1][5..].parse().expect("numbered");
            b == a + 1
        }));
    }

    #[test]
    fn push_text_skips_empty_lines() {
        let mut buf = LogBuffer::new(10);
        let n = buf.push_text("a\n\nb\r\n", Some(LineColor::Red));
        assert_eq!(n, 2);
        assert_eq!(buf.plain_text(), "a\nb\n");
        assert!(buf.iter().all(|l| l.color == Some(LineColor::Red)));
    }

    #[test]
    fn clear_then_push() {
        let mut buf = LogBuffer::new(4);
        buf.push_text("x\ny", None);
        buf.clear();
        assert!(buf.is_empty());
        buf.push(LogLine::plain("z"));
        assert_eq!(buf.last().map(|l| l.text.as_str()), Some("z"));
    }

    #[test]
    fn since_reports_new_lines_across_eviction() {
        let mut buf = LogBuffer::new(3);
        buf.push_text("a\nb", None);
        let seen = buf.pushed();
        buf.push_text("c\nd\ne\nf", None);
        let new: Vec<&str> = buf.since(seen).map(|l| l.text.as_str()).collect();
        assert_eq!(new, vec!["d", "e", "f"]);
        assert_eq!(buf.since(buf.pushed()).count(), 0);
    }

    #[test]
    fn render_ansi() {
        assert_eq!(LogLine::colored("boom", LineColor::Red).render_ansi(), "\x1b[31mboom\x1b[0m");
        assert_eq!(LogLine::plain("ok").render_ansi(), "ok");
    }
}
