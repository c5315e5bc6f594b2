//! External-process wrapper for the `exec` subcommand.
//!
//! The wrapped command streams to the parent's stdout/stderr while being
//! captured per stream and into a combined buffer, so the decision step can
//! consume the output even when the command fails or the run is interrupted.
//! SIGHUP/SIGINT/SIGTERM/SIGQUIT are forwarded to the child at most once
//! each; the child is never killed outright, so a command with signal
//! handling of its own can still flush useful output.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use github_comment_core::domain::ExecResult;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Mutex;
use tracing::debug;

/// Run `args` (command plus arguments) to completion and capture the result.
///
/// An error is returned only when the command cannot be started or waited
/// on; a nonzero exit is a normal [`ExecResult`].
pub async fn run_command(args: &[String]) -> Result<ExecResult> {
    let (program, rest) = args
        .split_first()
        .context("a command to execute is required")?;
    let mut child = Command::new(program)
        .args(rest)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("start the command `{program}`"))?;

    let stdout_pipe = child.stdout.take().context("take the child stdout pipe")?;
    let stderr_pipe = child.stderr.take().context("take the child stderr pipe")?;

    let combined = Arc::new(Mutex::new(Vec::new()));
    let stdout_task = tokio::spawn(tee(stdout_pipe, tokio::io::stdout(), Arc::clone(&combined)));
    let stderr_task = tokio::spawn(tee(stderr_pipe, tokio::io::stderr(), Arc::clone(&combined)));

    let status = wait_forwarding_signals(&mut child).await?;

    let stdout = stdout_task.await.context("join the stdout reader")?;
    let stderr = stderr_task.await.context("join the stderr reader")?;
    let combined_output = String::from_utf8_lossy(&combined.lock().await).into_owned();

    Ok(ExecResult {
        exit_code: exit_code_of(status),
        command: shell_words::join(args.iter().map(String::as_str)),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        combined_output,
    })
}

/// Wait for the child while forwarding termination-ish signals, each at most
/// once.
async fn wait_forwarding_signals(child: &mut tokio::process::Child) -> Result<std::process::ExitStatus> {
    let mut sighup = signal(SignalKind::hangup()).context("install the SIGHUP handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("install the SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("install the SIGTERM handler")?;
    let mut sigquit = signal(SignalKind::quit()).context("install the SIGQUIT handler")?;
    let mut hup_sent = false;
    let mut int_sent = false;
    let mut term_sent = false;
    let mut quit_sent = false;
    let child_id = child.id();

    loop {
        tokio::select! {
            status = child.wait() => {
                return status.context("wait for the command");
            }
            _ = sighup.recv(), if !hup_sent => {
                hup_sent = true;
                forward_signal(child_id, libc::SIGHUP);
            }
            _ = sigint.recv(), if !int_sent => {
                int_sent = true;
                forward_signal(child_id, libc::SIGINT);
            }
            _ = sigterm.recv(), if !term_sent => {
                term_sent = true;
                forward_signal(child_id, libc::SIGTERM);
            }
            _ = sigquit.recv(), if !quit_sent => {
                quit_sent = true;
                forward_signal(child_id, libc::SIGQUIT);
            }
        }
    }
}

fn forward_signal(child_id: Option<u32>, signo: i32) {
    let Some(pid) = child_id else {
        return;
    };
    debug!(pid, signo, "forward a signal to the wrapped command");
    // SAFETY: kill(2) with a valid pid and signal number touches no memory.
    unsafe {
        libc::kill(pid as i32, signo);
    }
}

fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .unwrap_or_else(|| status.signal().map_or(-1, |signo| 128 + signo))
}

/// Copy `reader` to `writer` while capturing everything read, and mirror it
/// into the shared combined buffer.
async fn tee<R, W>(mut reader: R, mut writer: W, combined: Arc<Mutex<Vec<u8>>>) -> Vec<u8>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut captured = Vec::new();
    let mut buf = [0_u8; 8_192];
    loop {
        let read = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(read) => read,
        };
        let chunk = &buf[..read];
        if writer.write_all(chunk).await.is_ok() {
            let _ = writer.flush().await;
        }
        captured.extend_from_slice(chunk);
        combined.lock().await.extend_from_slice(chunk);
    }
    captured
}
