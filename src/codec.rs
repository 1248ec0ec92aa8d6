//! Binary frame codec for the streaming sockets.
//!
//! Every binary message starts with a single type byte. The meaning of the
//! rest depends on which stream the message travels on:
//!
//! ```text
//! run log    data     [0x00][level u8][utf8 text...]
//! audit log  data     [0x00][utf8 text...]
//! log        control  [0x01][1=pause | 2=resume | 3=set-level][level utf8...]
//! terminal   data     [0x00][stdout...] | [0x01][stderr...] | [0x02][cols u16be][rows u16be]
//! terminal   control  [0x02][cols u16be][rows u16be] | [0x03] pause | [0x04] resume
//! metrics    data     raw UTF-8 JSON, no tag
//! ```
//!
//! Frames shorter than two bytes are malformed. Callers drop them without
//! closing the connection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Frame type constants shared by the log streams.
pub mod frame_type {
    /// Data payload.
    pub const DATA: u8 = 0x00;
    /// Control instruction.
    pub const CONTROL: u8 = 0x01;
}

/// Control instruction numbers carried in log-stream control frames.
pub mod log_control {
    /// Stop delivering log lines.
    pub const PAUSE: u8 = 1;
    /// Resume delivering log lines.
    pub const RESUME: u8 = 2;
    /// Change the server log level (UTF-8 level name follows).
    pub const SET_LEVEL: u8 = 3;
}

/// Type bytes used on the terminal stream.
pub mod term_type {
    /// Standard output chunk (inbound).
    pub const STDOUT: u8 = 0x00;
    /// Standard error chunk (inbound).
    pub const STDERR: u8 = 0x01;
    /// Window size, `[cols u16be][rows u16be]` (both directions).
    pub const RESIZE: u8 = 0x02;
    /// Pause output (outbound).
    pub const PAUSE: u8 = 0x03;
    /// Resume output (outbound).
    pub const RESUME: u8 = 0x04;
}

/// Errors produced while decoding a frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Fewer than two bytes; dropped silently by every stream.
    #[error("malformed frame: {len} byte(s)")]
    Malformed {
        /// Length of the rejected message.
        len: usize,
    },
    /// A structured frame whose fixed-width fields are cut short.
    #[error("truncated frame type {frame_type:#04x}: {len} byte(s)")]
    Truncated {
        /// Type byte of the frame.
        frame_type: u8,
        /// Length of the rejected message.
        len: usize,
    },
}

/// A decoded wire unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    /// First byte: data or control tag.
    pub kind: u8,
    /// Second byte for frames that need disambiguation (level, instruction).
    pub sub_kind: Option<u8>,
    /// Remaining bytes.
    pub payload: Vec<u8>,
}

impl StreamFrame {
    /// True for control frames (`kind == 0x01`).
    pub fn is_control(&self) -> bool {
        self.kind == frame_type::CONTROL
    }
}

/// Encode a control frame: `[0x01][instruction][data...]`.
pub fn encode_control(instruction: u8, data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 + data.len());
    buf.push(frame_type::CONTROL);
    buf.push(instruction);
    buf.extend_from_slice(data);
    buf
}

/// Decode a two-byte-header frame `[kind][sub_kind][payload...]`.
///
/// This is the generic layout used by control frames and run-log data
/// frames. Stream-specific layouts go through [`decode_log`] and
/// [`decode_terminal`].
pub fn decode_frame(bytes: &[u8]) -> Result<StreamFrame, FrameError> {
    if bytes.len() < 2 {
        return Err(FrameError::Malformed { len: bytes.len() });
    }
    Ok(StreamFrame {
        kind: bytes[0],
        sub_kind: Some(bytes[1]),
        payload: bytes[2..].to_vec(),
    })
}

// ============================================================================
// Log streams
// ============================================================================

/// Which log stream a session is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    /// Resolver run log; data frames carry a level byte.
    RunLog,
    /// Audit log; data frames carry no level byte.
    AuditLog,
}

impl LogKind {
    /// Whether data frames on this stream carry a level byte.
    pub fn has_level(self) -> bool {
        matches!(self, Self::RunLog)
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunLog => f.write_str("run log"),
            Self::AuditLog => f.write_str("audit log"),
        }
    }
}

/// Resolver log severity, numbered as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// `0`
    Debug,
    /// `1`
    Info,
    /// `2`
    Notice,
    /// `3`
    Warn,
    /// `4`
    Error,
    /// `5`
    Fatal,
}

impl LogLevel {
    /// All levels, lowest first.
    pub const ALL: [Self; 6] = [
        Self::Debug,
        Self::Info,
        Self::Notice,
        Self::Warn,
        Self::Error,
        Self::Fatal,
    ];

    /// Map a wire level byte. Unknown bytes return `None`.
    pub fn from_wire(byte: u8) -> Option<Self> {
        Self::ALL.get(usize::from(byte)).copied()
    }

    /// Name sent in the set-level control frame.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }

    /// Display colour for lines at this level (`None` = default colour).
    pub fn color(self) -> Option<LineColor> {
        match self {
            Self::Debug => Some(LineColor::Blue),
            Self::Info | Self::Notice => None,
            Self::Warn => Some(LineColor::Yellow),
            Self::Error => Some(LineColor::Red),
            Self::Fatal => Some(LineColor::Magenta),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown log level: {s}"))
    }
}

/// Display colour derived from severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineColor {
    /// Debug lines.
    Blue,
    /// Warnings.
    Yellow,
    /// Errors and abnormal closes.
    Red,
    /// Fatal lines.
    Magenta,
}

impl LineColor {
    /// SGR foreground code for this colour.
    pub fn ansi_code(self) -> u8 {
        match self {
            Self::Red => 31,
            Self::Yellow => 33,
            Self::Blue => 34,
            Self::Magenta => 35,
        }
    }
}

/// Decoded text chunk from a log stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChunk {
    /// Raw level byte (run log only).
    pub level: Option<u8>,
    /// UTF-8 text, possibly spanning several lines.
    pub text: String,
}

impl LogChunk {
    /// Colour for every line of this chunk. Unknown levels use the default.
    pub fn color(&self) -> Option<LineColor> {
        self.level.and_then(LogLevel::from_wire).and_then(LogLevel::color)
    }
}

/// Decode a log-stream data frame.
///
/// Returns `Ok(None)` for well-formed frames of a type the client does not
/// render.
pub fn decode_log(bytes: &[u8], kind: LogKind) -> Result<Option<LogChunk>, FrameError> {
    if bytes.len() < 2 {
        return Err(FrameError::Malformed { len: bytes.len() });
    }
    if bytes[0] != frame_type::DATA {
        return Ok(None);
    }
    let (level, text) = if kind.has_level() {
        (Some(bytes[1]), &bytes[2..])
    } else {
        (None, &bytes[1..])
    };
    Ok(Some(LogChunk {
        level,
        text: String::from_utf8_lossy(text).into_owned(),
    }))
}

/// Control instruction sent over a log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogControl {
    /// `[1, 1]`
    Pause,
    /// `[1, 2]`
    Resume,
    /// `[1, 3, level...]`
    SetLevel(LogLevel),
}

impl LogControl {
    /// Encode to wire bytes.
    pub fn encode(self) -> Vec<u8> {
        match self {
            Self::Pause => encode_control(log_control::PAUSE, &[]),
            Self::Resume => encode_control(log_control::RESUME, &[]),
            Self::SetLevel(level) => encode_control(log_control::SET_LEVEL, level.as_str().as_bytes()),
        }
    }
}

// ============================================================================
// Terminal stream
// ============================================================================

/// Decoded inbound terminal frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalFrame {
    /// Standard output bytes.
    Stdout(Vec<u8>),
    /// Standard error bytes.
    Stderr(Vec<u8>),
    /// Remote-initiated window size change.
    Resize {
        /// Columns.
        cols: u16,
        /// Rows.
        rows: u16,
    },
    /// Unrecognised type byte; ignored by the session.
    Unknown(u8),
}

/// Decode an inbound terminal frame.
pub fn decode_terminal(bytes: &[u8]) -> Result<TerminalFrame, FrameError> {
    if bytes.len() < 2 {
        return Err(FrameError::Malformed { len: bytes.len() });
    }
    match bytes[0] {
        term_type::STDOUT => Ok(TerminalFrame::Stdout(bytes[1..].to_vec())),
        term_type::STDERR => Ok(TerminalFrame::Stderr(bytes[1..].to_vec())),
        term_type::RESIZE => {
            let (cols, rows) = read_size(&bytes[1..]).ok_or(FrameError::Truncated {
                frame_type: term_type::RESIZE,
                len: bytes.len(),
            })?;
            Ok(TerminalFrame::Resize { cols, rows })
        }
        other => Ok(TerminalFrame::Unknown(other)),
    }
}

/// Terminal control instruction (outbound).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalControl {
    /// `[0x02][cols be][rows be]`
    Resize {
        /// Columns.
        cols: u16,
        /// Rows.
        rows: u16,
    },
    /// `[0x03]`
    Pause,
    /// `[0x04]`
    Resume,
}

impl TerminalControl {
    /// Encode to wire bytes.
    pub fn encode(self) -> Vec<u8> {
        match self {
            Self::Resize { cols, rows } => {
                let mut buf = Vec::with_capacity(5);
                buf.push(term_type::RESIZE);
                buf.extend_from_slice(&cols.to_be_bytes());
                buf.extend_from_slice(&rows.to_be_bytes());
                buf
            }
            Self::Pause => vec![term_type::PAUSE],
            Self::Resume => vec![term_type::RESUME],
        }
    }
}

fn read_size(bytes: &[u8]) -> Option<(u16, u16)> {
    let cols = u16::from_be_bytes([*bytes.first()?, *bytes.get(1)?]);
    let rows = u16::from_be_bytes([*bytes.get(2)?, *bytes.get(3)?]);
    Some((cols, rows))
}
