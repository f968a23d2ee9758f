//! One-shot evaluation: run a program to completion with a fixed stdin and
//! return its captured output.
//!
//! Every request gets its own workspace and interpreter process, so no state
//! carries over between evaluations.

use termrelay_protocol::{EvalRequest, EvalResponse, StreamKind};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::session::{SessionConfig, SessionError, SessionResult, interpreter_command, kill_process_group};

/// Evaluate `request`. Failures of any kind are reported in `error`.
pub async fn evaluate(config: &SessionConfig, request: &EvalRequest) -> EvalResponse {
    match run_once(config, request).await {
        Ok(response) => response,
        Err(err) => {
            warn!(kind = err.kind(), "evaluation failed: {err}");
            EvalResponse::failure(err.to_string())
        }
    }
}

async fn run_once(config: &SessionConfig, request: &EvalRequest) -> SessionResult<EvalResponse> {
    let workspace = config.create_workspace(&request.code)?;
    let interpreter = &config.interpreter;

    let mut child = interpreter_command(interpreter, workspace.script_path())
        .spawn()
        .map_err(|e| SessionError::spawn(&interpreter.program, e))?;
    let pid = child.id();

    // Feed stdin concurrently so a large input cannot deadlock against a
    // child that is blocked writing output.
    let stdin = child.stdin.take();
    let input = request.stdin.clone().into_bytes();
    let feeder = tokio::spawn(async move {
        if let Some(mut stdin) = stdin {
            if let Err(e) = stdin.write_all(&input).await {
                debug!("child stopped reading stdin: {e}");
            }
        }
    });
    let stdout_task = tokio::spawn(read_all(child.stdout.take()));
    let stderr_task = tokio::spawn(read_all(child.stderr.take()));

    let status = child.wait().await;
    // Background descendants would otherwise keep the output pipes open.
    kill_process_group(pid);
    let status = status?;

    if let Err(e) = feeder.await {
        warn!("stdin feeder task failed: {e}");
    }
    let stdout = join_output(stdout_task, StreamKind::Stdout).await?;
    let stderr = join_output(stderr_task, StreamKind::Stderr).await?;

    let code = status.code();
    info!(?code, stdout_bytes = stdout.len(), "evaluation finished");

    if status.success() {
        return Ok(EvalResponse::success(String::from_utf8_lossy(&stdout)));
    }

    let stderr = String::from_utf8_lossy(&stderr).into_owned();
    if stderr.trim().is_empty() {
        let status = code.map_or_else(|| "by a signal".to_string(), |c| format!("with code {c}"));
        return Ok(EvalResponse::failure(format!("process exited {status}")));
    }
    Ok(EvalResponse::failure(stderr))
}

/// Read a pipe to EOF. A read error ends the capture with what was read so far.
async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut out = Vec::new();
    let Some(mut pipe) = pipe else {
        return out;
    };
    if let Err(e) = pipe.read_to_end(&mut out).await {
        debug!("output read failed after {} bytes: {e}", out.len());
    }
    out
}

async fn join_output(handle: JoinHandle<Vec<u8>>, kind: StreamKind) -> SessionResult<Vec<u8>> {
    handle.await.map_err(|e| SessionError::Relay {
        stream: kind.as_str(),
        reason: e.to_string(),
    })
}
