//! Child process ownership for one session.
//!
//! The child itself is owned by a supervisor task that waits for it to exit
//! and publishes the exit code on a watch channel. The session keeps the
//! pipes, a kill switch and the watch receiver.

use std::path::Path;
use std::process::{ExitStatus, Stdio};

use bytes::Bytes;
use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, watch};

use crate::config::InterpreterConfig;

use super::error::{SessionError, SessionResult};

/// Exit code reported when the status could not be collected.
const UNKNOWN_EXIT_CODE: i32 = -1;

/// Handle to a running (or finished) interpreter child.
///
/// The child leads its own process group. Killing the session, or the child
/// exiting on its own, signals the whole group so no descendant keeps the
/// output pipes open.
#[derive(Debug)]
pub struct ProcessSession {
    pid: Option<u32>,
    program: String,
    stdin_tx: Option<mpsc::UnboundedSender<Bytes>>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    kill_tx: Option<oneshot::Sender<()>>,
    exit_rx: watch::Receiver<Option<i32>>,
}

/// `program [args..] <script_path>` with all three stdio pipes attached, in a
/// new process group.
pub(crate) fn interpreter_command(interpreter: &InterpreterConfig, script_path: &Path) -> Command {
    let mut cmd = Command::new(&interpreter.program);
    cmd.args(&interpreter.args)
        .arg(script_path)
        .envs(&interpreter.env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

impl ProcessSession {
    /// Spawn the interpreter on `script_path`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(interpreter: &InterpreterConfig, script_path: &Path) -> SessionResult<Self> {
        let mut child = interpreter_command(interpreter, script_path)
            .spawn()
            .map_err(|e| SessionError::spawn(&interpreter.program, e))?;
        let pid = child.id();
        info!(
            "spawned {} for {} (pid={:?})",
            interpreter.program,
            script_path.display(),
            pid
        );

        let stdin_tx = child.stdin.take().map(|stdin| {
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(pump_stdin(stdin, rx, pid));
            tx
        });
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = watch::channel(None);
        tokio::spawn(supervise(child, pid, kill_rx, exit_tx));

        Ok(Self {
            pid,
            program: interpreter.program.clone(),
            stdin_tx,
            stdout,
            stderr,
            kill_tx: Some(kill_tx),
            exit_rx,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Queue raw bytes for the child's stdin. Never blocks.
    ///
    /// Writes happen in order on a dedicated task, so a child that stops
    /// reading cannot stall the caller. Once the pipe is found closed (the
    /// child exited or closed its input) later writes are dropped. Returns
    /// whether the bytes were queued.
    pub fn write_stdin(&self, bytes: Bytes) -> bool {
        let Some(tx) = self.stdin_tx.as_ref() else {
            debug!("stdin already closed, dropping {} bytes", bytes.len());
            return false;
        };
        tx.send(bytes).is_ok()
    }

    /// Close the child's stdin once queued input has been written.
    pub fn close_stdin(&mut self) {
        self.stdin_tx = None;
    }

    /// Exit code if the child has terminated. Never blocks.
    pub fn exit_code(&self) -> Option<i32> {
        *self.exit_rx.borrow()
    }

    /// A receiver that observes the exit code once it is known.
    pub fn exit_watch(&self) -> watch::Receiver<Option<i32>> {
        self.exit_rx.clone()
    }

    /// Wait for the child to terminate and return its exit code.
    pub async fn wait(&self) -> i32 {
        let mut rx = self.exit_rx.clone();
        wait_for_exit(&mut rx).await
    }

    /// Forcibly terminate the child and its process group. Idempotent, and a
    /// no-op after exit.
    pub fn kill(&mut self) {
        if let Some(tx) = self.kill_tx.take() {
            debug!("killing pid {:?}", self.pid);
            let _ = tx.send(());
        }
    }
}

/// Resolve once `rx` carries an exit code.
pub async fn wait_for_exit(rx: &mut watch::Receiver<Option<i32>>) -> i32 {
    match rx.wait_for(Option::is_some).await {
        Ok(code) => (*code).unwrap_or(UNKNOWN_EXIT_CODE),
        Err(_) => UNKNOWN_EXIT_CODE,
    }
}

/// SIGKILL every process left in the group led by `pid`.
///
/// Safe to call after the leader was reaped: a group id is not reused while
/// any member is alive, and an empty group is reported as ESRCH.
pub(crate) fn kill_process_group(pid: Option<u32>) {
    #[cfg(unix)]
    {
        use rustix::process::{Pid, Signal};

        let Some(pgid) = pid
            .and_then(|p| i32::try_from(p).ok())
            .and_then(Pid::from_raw)
        else {
            return;
        };
        match rustix::process::kill_process_group(pgid, Signal::KILL) {
            Ok(()) => debug!("killed process group of pid {:?}", pid),
            Err(rustix::io::Errno::SRCH) => {}
            Err(e) => warn!("failed to kill process group {:?}: {}", pid, e),
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
}

/// Write queued input to the child in order until the queue closes or the
/// pipe breaks. Dropping `stdin` on return delivers EOF.
async fn pump_stdin(mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<Bytes>, pid: Option<u32>) {
    while let Some(bytes) = rx.recv().await {
        let result = match stdin.write_all(&bytes).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            debug!("stdin write to pid {:?} failed, closing pipe: {}", pid, e);
            return;
        }
    }
}

/// Own the child until it exits, killing it on request or when the session
/// handle is dropped, then clear out its process group and publish the exit
/// code.
async fn supervise(
    mut child: Child,
    pid: Option<u32>,
    mut kill_rx: oneshot::Receiver<()>,
    exit_tx: watch::Sender<Option<i32>>,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = &mut kill_rx => None,
    };

    let status = match exited {
        Some(status) => status,
        None => {
            kill_process_group(pid);
            if let Err(e) = child.start_kill() {
                debug!("kill for pid {:?} failed (already exited?): {}", pid, e);
            }
            child.wait().await
        }
    };
    // Background descendants would otherwise hold stdout/stderr open.
    kill_process_group(pid);

    let code = match status {
        Ok(status) => exit_code(status),
        Err(e) => {
            warn!("failed to collect exit status for pid {:?}: {}", pid, e);
            UNKNOWN_EXIT_CODE
        }
    };
    info!("pid {:?} exited with code {}", pid, code);
    exit_tx.send_replace(Some(code));
}

/// Numeric exit code; a signal-terminated child reports `-signal`.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    UNKNOWN_EXIT_CODE
}
