use std::io;

use thiserror::Error;

/// Session-level failures. Each one is reported to the client once and ends
/// the session; stream-level problems (stdin writes after exit, undecodable
/// output bytes) never reach this type.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to prepare workspace: {0}")]
    Workspace(#[source] io::Error),

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{stream} relay failed: {reason}")]
    Relay { stream: &'static str, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    pub fn spawn(program: impl Into<String>, source: io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Short machine-friendly label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Workspace(_) => "workspace",
            Self::Spawn { .. } => "spawn",
            Self::Relay { .. } => "relay",
            Self::Io(_) => "io",
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_error_names_program() {
        let err = SessionError::spawn(
            "/nope/python",
            io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
        );
        let text = err.to_string();
        assert!(text.contains("/nope/python"));
        assert!(text.contains("No such file"));
        assert_eq!(err.kind(), "spawn");
    }
}
