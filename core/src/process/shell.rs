// cd_engine/src/process/shell.rs

//! Runs a `run` step's command through the platform shell, streaming output to the step logger.

use crate::error::{EngineError, EngineResult};
use crate::logging::StepLogger;
use crate::process::registry::ProcessRegistry;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{event, instrument, Level};

/// Upper bound on waiting for output pipes after the shell exits. Background children
/// can hold the pipes open indefinitely.
const STREAM_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const READ_CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone)]
pub struct ShellCommand {
  /// Already rendered command line.
  pub command: String,
  pub cwd: PathBuf,
  /// The complete child environment. Nothing is inherited beyond this map.
  pub env: BTreeMap<String, String>,
}

impl ShellCommand {
  fn to_command(&self) -> Command {
    #[cfg(windows)]
    let mut cmd = {
      let mut cmd = Command::new("cmd");
      cmd.arg("/C").arg(&self.command);
      cmd
    };
    #[cfg(not(windows))]
    let mut cmd = {
      let mut cmd = Command::new("sh");
      cmd.arg("-c").arg(&self.command);
      cmd
    };

    cmd
      .current_dir(&self.cwd)
      .env_clear()
      .envs(&self.env)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);
    cmd
  }
}

fn pump<R>(reader: Option<R>, logger: Arc<dyn StepLogger>) -> JoinHandle<Vec<u8>>
where
  R: AsyncRead + Unpin + Send + 'static,
{
  tokio::spawn(async move {
    let mut captured = Vec::new();
    let Some(mut reader) = reader else {
      return captured;
    };
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    // Bytes after the last newline are held back so a secret or a UTF-8 sequence is never
    // split across two log writes.
    let mut pending: Vec<u8> = Vec::new();
    loop {
      match reader.read(&mut buf).await {
        Ok(0) => break,
        Ok(n) => {
          captured.extend_from_slice(&buf[..n]);
          pending.extend_from_slice(&buf[..n]);
          if let Some(last_newline) = pending.iter().rposition(|b| *b == b'\n') {
            let rest = pending.split_off(last_newline + 1);
            logger.info(&String::from_utf8_lossy(&pending));
            pending = rest;
          }
        }
        Err(e) => {
          event!(Level::DEBUG, error = %e, "Output stream read failed.");
          break;
        }
      }
    }
    if !pending.is_empty() {
      logger.info(&String::from_utf8_lossy(&pending));
    }
    captured
  })
}

async fn drain(mut task: JoinHandle<Vec<u8>>) -> Vec<u8> {
  match tokio::time::timeout(STREAM_DRAIN_TIMEOUT, &mut task).await {
    Ok(Ok(bytes)) => bytes,
    Ok(Err(e)) => {
      event!(Level::DEBUG, error = %e, "Output reader task ended abnormally.");
      Vec::new()
    }
    Err(_) => {
      task.abort();
      event!(Level::DEBUG, "Output stream still open after process exit; detaching.");
      Vec::new()
    }
  }
}

/// Spawns `cmd`, forwards stdout and stderr chunks to `stream_logger` as they arrive and
/// resolves on exit.
///
/// Exit code 0, a kill through `registry`, or any exit while `is_cancelled()` holds resolves
/// with `{}`. Any other exit rejects with [`EngineError::CommandFailed`] carrying the captured
/// stderr. Once the streams end, `eol` is written and `stream_logger` is closed.
///
/// The span records only `cwd`, never the command text.
#[instrument(name = "shell::run", skip_all, fields(cwd = %cmd.cwd.display()))]
pub async fn run_shell_command<F>(
  cmd: &ShellCommand,
  stream_logger: Arc<dyn StepLogger>,
  eol: &str,
  registry: &ProcessRegistry,
  is_cancelled: F,
) -> EngineResult<Value>
where
  F: Fn() -> bool,
{
  let mut child = cmd.to_command().spawn().map_err(|source| EngineError::SpawnFailure {
    command: cmd.command.clone(),
    source,
  })?;
  let (_guard, mut kill_rx) = registry.register();
  event!(Level::DEBUG, pid = ?child.id(), "Child process spawned.");

  let stdout_task = pump(child.stdout.take(), Arc::clone(&stream_logger));
  let stderr_task = pump(child.stderr.take(), Arc::clone(&stream_logger));

  let mut killed = false;
  let status = tokio::select! {
    status = child.wait() => status,
    Ok(()) = &mut kill_rx => {
      killed = true;
      event!(Level::INFO, "Killing child process on cancellation.");
      if let Err(e) = child.start_kill() {
        event!(Level::DEBUG, error = %e, "Kill signal could not be delivered.");
      }
      child.wait().await
    }
  };

  let _stdout = drain(stdout_task).await;
  let stderr = drain(stderr_task).await;
  stream_logger.info(eol);
  stream_logger.close();

  let status = status.map_err(|e| EngineError::Internal(format!("waiting on '{}' failed: {}", cmd.command, e)))?;
  if status.success() || killed || is_cancelled() {
    event!(Level::DEBUG, code = ?status.code(), "Command finished.");
    return Ok(json!({}));
  }

  event!(Level::DEBUG, code = ?status.code(), "Command exited with failure.");
  Err(EngineError::CommandFailed {
    command: cmd.command.clone(),
    code: status.code(),
    stderr: String::from_utf8_lossy(&stderr).into_owned(),
  })
}
