//! Text line protocol between devices and peers.
//!
//! Every message is one line:
//!
//! - command:      `verb [arg]*`            (peer -> device)
//! - success:      `+OK [value]`            (terminal reply)
//! - error:        `-ERR <code> <message>`  (terminal reply)
//! - value push:   `V <name> <value>`       (device -> all peers)
//! - state push:   `M <word>`               (coordinator -> devices)
//!
//! Error codes are stable and mirror the wire taxonomy: a malformed client
//! command fails only that command, a hardware error leaves the device
//! operable, a system error aborts the operation.

use arrayvec::ArrayString;
use thiserror::Error;

pub const MAX_LINE_SIZE: usize = 512;
pub type LineBuffer = ArrayString<MAX_LINE_SIZE>;

/// Wire error taxonomy with stable numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Resource exhaustion (worker spawn failure and the like).
    System,
    /// Wrong number of arguments.
    ParamsNum,
    /// Argument present but unparseable or out of range.
    ParamsVal,
    /// Unknown verb.
    Command,
    /// Underlying hardware operation failed.
    Hw,
}

impl ErrorKind {
    pub fn code(self) -> i32 {
        match self {
            ErrorKind::System => -1,
            ErrorKind::ParamsNum => -2,
            ErrorKind::ParamsVal => -3,
            ErrorKind::Command => -4,
            ErrorKind::Hw => -5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            -1 => Some(ErrorKind::System),
            -2 => Some(ErrorKind::ParamsNum),
            -3 => Some(ErrorKind::ParamsVal),
            -4 => Some(ErrorKind::Command),
            -5 => Some(ErrorKind::Hw),
            _ => None,
        }
    }
}

/// A terminal command failure as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} {message}", .kind.code())]
pub struct WireError {
    pub kind: ErrorKind,
    pub message: String,
}

impl WireError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("empty line")]
    EmptyLine,
    #[error("line exceeds {MAX_LINE_SIZE} bytes")]
    LineTooLong,
    #[error("malformed reply: {0}")]
    MalformedReply(String),
    #[error("malformed push: {0}")]
    MalformedPush(String),
}

/// A parsed command line: verb plus positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub verb: String,
    pub args: Vec<String>,
}

impl CommandLine {
    /// Validate the argument count, producing the PARAMSNUM wire error the
    /// way devices always have.
    pub fn require_args(&self, expected: usize) -> Result<(), WireError> {
        if self.args.len() != expected {
            return Err(WireError::new(
                ErrorKind::ParamsNum,
                format!(
                    "unknown number of params: expected {}, got {}",
                    expected,
                    self.args.len()
                ),
            ));
        }
        Ok(())
    }

    /// Parse one positional argument, producing PARAMSVAL on failure.
    pub fn arg_f64(&self, index: usize) -> Result<f64, WireError> {
        let raw = &self.args[index];
        raw.parse().map_err(|_| {
            WireError::new(ErrorKind::ParamsVal, format!("invalid value: {raw}"))
        })
    }

    pub fn arg_i64(&self, index: usize) -> Result<i64, WireError> {
        let raw = &self.args[index];
        raw.parse().map_err(|_| {
            WireError::new(ErrorKind::ParamsVal, format!("invalid value: {raw}"))
        })
    }
}

/// A terminal reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok(Option<String>),
    Err(WireError),
}

/// Unsolicited push lines a peer may receive between replies.
#[derive(Debug, Clone, PartialEq)]
pub enum Push {
    Value { name: String, value: String },
    MasterState(u32),
}

pub fn parse_command_line(line: &str) -> Result<CommandLine, ProtocolError> {
    if line.len() > MAX_LINE_SIZE {
        return Err(ProtocolError::LineTooLong);
    }
    let mut parts = line.split_whitespace();
    let verb = parts.next().ok_or(ProtocolError::EmptyLine)?;
    Ok(CommandLine {
        verb: verb.to_string(),
        args: parts.map(str::to_string).collect(),
    })
}

pub fn format_command(verb: &str, args: &[String]) -> String {
    if args.is_empty() {
        verb.to_string()
    } else {
        format!("{} {}", verb, args.join(" "))
    }
}

pub fn format_reply(reply: &Reply) -> String {
    match reply {
        Reply::Ok(None) => "+OK".to_string(),
        Reply::Ok(Some(value)) => format!("+OK {value}"),
        Reply::Err(err) => format!("-ERR {} {}", err.kind.code(), err.message),
    }
}

pub fn parse_reply(line: &str) -> Result<Reply, ProtocolError> {
    if line == "+OK" {
        return Ok(Reply::Ok(None));
    }
    // The marker must be a whole word; "+OKAY" is not a success reply
    if let Some(rest) = line.strip_prefix("+OK ") {
        let rest = rest.trim();
        return Ok(Reply::Ok(if rest.is_empty() { None } else { Some(rest.to_string()) }));
    }
    if let Some(rest) = line.strip_prefix("-ERR ") {
        let mut parts = rest.splitn(2, ' ');
        let code: i32 = parts
            .next()
            .and_then(|c| c.parse().ok())
            .ok_or_else(|| ProtocolError::MalformedReply(line.to_string()))?;
        let kind = ErrorKind::from_code(code)
            .ok_or_else(|| ProtocolError::MalformedReply(line.to_string()))?;
        let message = parts.next().unwrap_or("").to_string();
        return Ok(Reply::Err(WireError { kind, message }));
    }
    Err(ProtocolError::MalformedReply(line.to_string()))
}

pub fn format_value_line(name: &str, value: &str) -> String {
    format!("V {name} {value}")
}

pub fn format_state_line(word: u32) -> String {
    format!("M {word}")
}

/// Classify an unsolicited line on the peer side.
pub fn parse_push(line: &str) -> Result<Push, ProtocolError> {
    if let Some(rest) = line.strip_prefix("V ") {
        let mut parts = rest.splitn(2, ' ');
        let name = parts
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ProtocolError::MalformedPush(line.to_string()))?;
        let value = parts.next().unwrap_or("").to_string();
        return Ok(Push::Value { name: name.to_string(), value });
    }
    if let Some(rest) = line.strip_prefix("M ") {
        let word = rest
            .trim()
            .parse()
            .map_err(|_| ProtocolError::MalformedPush(line.to_string()))?;
        return Ok(Push::MasterState(word));
    }
    Err(ProtocolError::MalformedPush(line.to_string()))
}
