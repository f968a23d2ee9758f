//! Process-session bridge.
//!
//! One client connection owns one [`Workspace`] and one child process. The
//! [`SessionController`] drives them: it writes the submitted source into the
//! workspace, starts the interpreter, relays stdout/stderr to the client while
//! pumping client input into stdin, and tears everything down on every exit
//! path.
//!
//! ## Security boundary
//!
//! Submitted code runs with the privileges of the server process, with full
//! access to the host filesystem and network and without CPU, memory or time
//! limits. Deploy this only behind admission control for trusted users, or
//! point `interpreter.program` at a sandboxing wrapper.

mod controller;
mod error;
mod process;
mod relay;
mod workspace;

use std::path::PathBuf;

use anyhow::Result;

use crate::config::{AppConfig, InterpreterConfig};

pub use controller::{SessionController, SessionOutcome, SessionState};
pub use error::{SessionError, SessionResult};
pub use process::{ProcessSession, wait_for_exit};
pub(crate) use process::{interpreter_command, kill_process_group};
pub use relay::{ForwardSummary, forward};
pub use workspace::Workspace;

/// Settings shared by every session the server runs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub interpreter: InterpreterConfig,
    /// Parent of per-session directories; `None` means the system temp dir.
    pub workspace_root: Option<PathBuf>,
    pub workspace_prefix: String,
    pub chunk_size: usize,
}

impl SessionConfig {
    pub fn from_app(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            interpreter: config.interpreter.clone(),
            workspace_root: config.workspace.root_dir()?,
            workspace_prefix: config.workspace.prefix.clone(),
            chunk_size: config.relay.chunk_size,
        })
    }

    /// Materialize `source` in a fresh workspace.
    pub fn create_workspace(&self, source: &str) -> SessionResult<Workspace> {
        Workspace::create(
            self.workspace_root.as_deref(),
            &self.workspace_prefix,
            &self.interpreter.script_name,
            source,
        )
        .map_err(SessionError::Workspace)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        let app = AppConfig::default();
        Self {
            interpreter: app.interpreter,
            workspace_root: None,
            workspace_prefix: app.workspace.prefix,
            chunk_size: app.relay.chunk_size,
        }
    }
}
