//! Wire types for termrelay.
//!
//! The terminal channel carries two directions:
//!
//! - Client -> server: the first frame is the raw source text of the program,
//!   every later frame is appended verbatim to the program's stdin.
//! - Server -> client: [`RelayMessage`] records serialized as
//!   `{"type": "stdout" | "stderr" | "done" | "error", "payload": "..."}`.
//!
//! `done` is always the last message of a session that ran to completion.
//! No ordering is promised between `stdout` and `stderr` messages.

mod eval;

pub use eval::{EvalRequest, EvalResponse};

use serde::{Deserialize, Serialize};

/// Which child output stream a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Stdout => "stdout",
            StreamKind::Stderr => "stderr",
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged unit of output or status sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum RelayMessage {
    /// Decoded chunk of the child's stdout.
    Stdout(String),
    /// Decoded chunk of the child's stderr.
    Stderr(String),
    /// Terminal status, human readable, embedding the exit code.
    Done(String),
    /// Diagnostic for a session-level failure.
    Error(String),
}

impl RelayMessage {
    /// Build an output message for the given stream.
    pub fn output(kind: StreamKind, text: impl Into<String>) -> Self {
        match kind {
            StreamKind::Stdout => RelayMessage::Stdout(text.into()),
            StreamKind::Stderr => RelayMessage::Stderr(text.into()),
        }
    }

    /// Build the final `done` message for an exit code.
    pub fn done(exit_code: i32) -> Self {
        RelayMessage::Done(format!("--- Process exited with code {exit_code} ---\n"))
    }

    pub fn error(message: impl Into<String>) -> Self {
        RelayMessage::Error(message.into())
    }

    /// Wire tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayMessage::Stdout(_) => "stdout",
            RelayMessage::Stderr(_) => "stderr",
            RelayMessage::Done(_) => "done",
            RelayMessage::Error(_) => "error",
        }
    }

    pub fn payload(&self) -> &str {
        match self {
            RelayMessage::Stdout(p)
            | RelayMessage::Stderr(p)
            | RelayMessage::Done(p)
            | RelayMessage::Error(p) => p,
        }
    }

    /// Whether this message ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayMessage::Done(_) | RelayMessage::Error(_))
    }

    /// Exit code embedded in a `done` payload.
    pub fn exit_code(&self) -> Option<i32> {
        let RelayMessage::Done(payload) = self else {
            return None;
        };
        payload
            .split_whitespace()
            .find_map(|word| word.parse::<i32>().ok())
    }
}
