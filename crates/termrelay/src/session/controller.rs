//! Session state machine: `AwaitingCode -> Running -> Draining -> Closed`.

use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use termrelay_protocol::{RelayMessage, StreamKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

use super::SessionConfig;
use super::error::{SessionError, SessionResult};
use super::process::{ProcessSession, wait_for_exit};
use super::relay::{ForwardSummary, forward};
use super::workspace::Workspace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingCode,
    Running,
    Draining,
    Closed,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::AwaitingCode => "awaiting_code",
            SessionState::Running => "running",
            SessionState::Draining => "draining",
            SessionState::Closed => "closed",
        }
    }
}

/// How a session ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Exit code of the child, if one was started.
    pub exit_code: Option<i32>,
    /// The inbound stream ended before the child exited on its own.
    pub client_disconnected: bool,
    /// Diagnostic sent to the client as an `error` message.
    pub error: Option<String>,
    pub stdout_bytes: u64,
    pub stderr_bytes: u64,
}

/// Drives one connection from the first inbound frame to teardown.
///
/// The controller is transport agnostic: inbound frames arrive as a stream of
/// byte buffers whose end signals a disconnect, and outbound messages go into
/// a bounded channel drained by the connection layer. A full channel blocks
/// the forwarders, which in turn lets the child block on its own writes.
pub struct SessionController {
    id: Uuid,
    config: Arc<SessionConfig>,
    state: SessionState,
}

impl SessionController {
    pub fn new(config: Arc<SessionConfig>) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            state: SessionState::AwaitingCode,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion.
    ///
    /// The first inbound frame is the program source; later frames go to the
    /// child's stdin. `done` is the last message sent on success; any
    /// session-level failure is sent once as `error` instead. The workspace is
    /// removed and `outbound` dropped on every path.
    pub async fn run<I>(
        mut self,
        mut inbound: I,
        outbound: mpsc::Sender<RelayMessage>,
    ) -> SessionOutcome
    where
        I: Stream<Item = Bytes> + Unpin,
    {
        let span = info_span!("session", id = %self.id);
        async move {
            let mut workspace = None;
            let outcome = match self.drive(&mut inbound, &outbound, &mut workspace).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(kind = err.kind(), "session failed: {err}");
                    let message = err.to_string();
                    if outbound.send(RelayMessage::error(message.clone())).await.is_err() {
                        debug!("client gone, error not delivered");
                    }
                    SessionOutcome {
                        error: Some(message),
                        ..SessionOutcome::default()
                    }
                }
            };

            if let Some(mut workspace) = workspace.take() {
                workspace.destroy();
            }
            drop(outbound);
            self.transition(SessionState::Closed);
            outcome
        }
        .instrument(span)
        .await
    }

    async fn drive<I>(
        &mut self,
        inbound: &mut I,
        outbound: &mpsc::Sender<RelayMessage>,
        workspace: &mut Option<Workspace>,
    ) -> SessionResult<SessionOutcome>
    where
        I: Stream<Item = Bytes> + Unpin,
    {
        let Some(first) = inbound.next().await else {
            debug!("client left before sending code");
            return Ok(SessionOutcome {
                client_disconnected: true,
                ..SessionOutcome::default()
            });
        };
        let source = String::from_utf8_lossy(&first);
        debug!("received {} bytes of source", first.len());

        let workspace = workspace.insert(self.config.create_workspace(&source)?);
        let mut process = ProcessSession::start(&self.config.interpreter, workspace.script_path())?;
        info!(pid = ?process.pid(), program = process.program(), "child started");
        self.transition(SessionState::Running);

        let stdout = process
            .take_stdout()
            .ok_or_else(|| missing_pipe(StreamKind::Stdout))?;
        let stderr = process
            .take_stderr()
            .ok_or_else(|| missing_pipe(StreamKind::Stderr))?;
        let chunk_size = self.config.chunk_size;
        let stdout_task = tokio::spawn(
            forward(stdout, StreamKind::Stdout, outbound.clone(), chunk_size).in_current_span(),
        );
        let stderr_task = tokio::spawn(
            forward(stderr, StreamKind::Stderr, outbound.clone(), chunk_size).in_current_span(),
        );

        let mut exit = process.exit_watch();
        let mut client_disconnected = false;
        loop {
            tokio::select! {
                code = wait_for_exit(&mut exit) => {
                    debug!(code, "child exited while running");
                    break;
                }
                frame = inbound.next() => {
                    match frame {
                        Some(bytes) => {
                            process.write_stdin(bytes);
                        }
                        None => {
                            info!("client disconnected, killing child");
                            process.kill();
                            client_disconnected = true;
                            break;
                        }
                    }
                }
            }
        }

        self.transition(SessionState::Draining);
        process.close_stdin();
        let stdout_summary = join_relay(stdout_task, StreamKind::Stdout).await?;
        let stderr_summary = join_relay(stderr_task, StreamKind::Stderr).await?;
        let exit_code = process.wait().await;
        info!(
            exit_code,
            stdout_bytes = stdout_summary.bytes,
            stderr_bytes = stderr_summary.bytes,
            "session drained"
        );

        if outbound.send(RelayMessage::done(exit_code)).await.is_err() {
            debug!("client gone, done not delivered");
        }

        Ok(SessionOutcome {
            exit_code: Some(exit_code),
            client_disconnected,
            error: None,
            stdout_bytes: stdout_summary.bytes,
            stderr_bytes: stderr_summary.bytes,
        })
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = self.state.as_str(), to = next.as_str(), "session state");
        self.state = next;
    }
}

async fn join_relay(
    handle: JoinHandle<ForwardSummary>,
    kind: StreamKind,
) -> SessionResult<ForwardSummary> {
    handle.await.map_err(|e| SessionError::Relay {
        stream: kind.as_str(),
        reason: e.to_string(),
    })
}

fn missing_pipe(kind: StreamKind) -> SessionError {
    SessionError::Io(std::io::Error::other(format!("child {kind} was not captured")))
}
