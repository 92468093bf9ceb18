//! Subprocess supervision: scrubbed environment, bounded output capture,
//! wall-clock timeout with kill, and typed exit mapping.
//!
//! The supervisor is reentrant; per-tool serialization is the runner's job.

use crate::tools::base::{ErrorKind, ToolOutput};
use std::collections::HashMap;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct OutputLimits {
    pub max_stdout: usize,
    pub max_stderr: usize,
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self {
            max_stdout: 1_048_576,
            max_stderr: 262_144,
        }
    }
}

/// Create a `Command` with a scrubbed environment: only `PATH` is
/// inherited, and the locale is pinned so tool output parses stably.
/// Prevents leakage of API keys and tokens into child processes.
pub fn scrubbed_command(program: &str) -> Command {
    let mut cmd = Command::new(program);
    cmd.env_clear();
    if let Ok(path) = std::env::var("PATH") {
        cmd.env("PATH", path);
    }
    cmd.env("LANG", "C.UTF-8");
    cmd.env("LC_ALL", "C.UTF-8");
    cmd
}

/// Run `program` with `args`, enforcing `timeout` and the output caps.
/// Never returns an error: spawn failures, timeouts, and signal deaths all
/// map onto a `ToolOutput` with `returncode`/`error_type` set.
pub async fn supervise(
    program: &str,
    args: &[String],
    timeout: Duration,
    limits: &OutputLimits,
) -> ToolOutput {
    let started = Instant::now();
    info!(
        "tool.start command={} args={} timeout={:.1}",
        program,
        args.join(" "),
        timeout.as_secs_f64()
    );

    let mut cmd = scrubbed_command(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let msg = format!("Command not found: {}", program);
            error!("tool.error {}", msg);
            return error_output(msg, 127, ErrorKind::NotFound, started);
        }
        Err(e) => {
            let msg = format!("execution failed: {}", e);
            error!("tool.error {}", msg);
            return error_output(msg, 1, ErrorKind::ExecutionError, started);
        }
    };

    // Readers run independently so a chatty child never blocks on a full
    // pipe; past the cap they keep draining and discard.
    let stdout_task = child
        .stdout
        .take()
        .map(|pipe| tokio::spawn(read_capped(pipe, limits.max_stdout)));
    let stderr_task = child
        .stderr
        .take()
        .map(|pipe| tokio::spawn(read_capped(pipe, limits.max_stderr)));

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            let msg = format!("execution failed: {}", e);
            error!("tool.error {}", msg);
            return error_output(msg, 1, ErrorKind::ExecutionError, started);
        }
        Err(_) => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            let mut output = error_output(
                "process timed out".to_string(),
                124,
                ErrorKind::Timeout,
                started,
            );
            output.timed_out = true;
            return output;
        }
    };

    let (stdout_bytes, truncated_stdout) = join_capture(stdout_task).await;
    let (stderr_bytes, truncated_stderr) = join_capture(stderr_task).await;

    let returncode = status.code().unwrap_or_else(|| {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            status.signal().map_or(-1, |sig| 128 + sig)
        }
        #[cfg(not(unix))]
        {
            -1
        }
    });

    info!(
        "tool.end command={} returncode={} truncated_stdout={} truncated_stderr={}",
        program, returncode, truncated_stdout, truncated_stderr
    );

    ToolOutput {
        stdout: decode(&stdout_bytes, truncated_stdout),
        stderr: decode(&stderr_bytes, truncated_stderr),
        returncode,
        truncated_stdout,
        truncated_stderr,
        timed_out: false,
        error: None,
        error_type: None,
        execution_time: started.elapsed().as_secs_f64(),
        correlation_id: String::new(),
        metadata: HashMap::new(),
    }
}

fn error_output(message: String, returncode: i32, kind: ErrorKind, started: Instant) -> ToolOutput {
    ToolOutput {
        stdout: String::new(),
        stderr: message.clone(),
        returncode,
        truncated_stdout: false,
        truncated_stderr: false,
        timed_out: false,
        error: Some(message),
        error_type: Some(kind),
        execution_time: started.elapsed().as_secs_f64(),
        correlation_id: String::new(),
        metadata: HashMap::new(),
    }
}

async fn read_capped<R>(mut reader: R, cap: usize) -> (Vec<u8>, bool)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf: Vec<u8> = Vec::new();
    let mut truncated = false;
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if buf.len() < cap {
                    let take = (cap - buf.len()).min(n);
                    buf.extend_from_slice(&chunk[..take]);
                    if take < n {
                        truncated = true;
                    }
                } else {
                    truncated = true;
                }
            }
            Err(_) => break,
        }
    }
    (buf, truncated)
}

async fn join_capture(task: Option<tokio::task::JoinHandle<(Vec<u8>, bool)>>) -> (Vec<u8>, bool) {
    match task {
        Some(handle) => handle.await.unwrap_or_else(|_| (Vec::new(), false)),
        None => (Vec::new(), false),
    }
}

fn decode(data: &[u8], truncated: bool) -> String {
    let data = if truncated {
        trim_incomplete_utf8_tail(data)
    } else {
        data
    };
    String::from_utf8_lossy(data).into_owned()
}

/// Drop a trailing partial UTF-8 sequence so a byte cap landing
/// mid-character never yields a replacement rune at the cut. Invalid bytes
/// elsewhere are left for lossy decoding to handle.
fn trim_incomplete_utf8_tail(data: &[u8]) -> &[u8] {
    let len = data.len();
    let scan_from = len.saturating_sub(4);
    for i in (scan_from..len).rev() {
        let b = data[i];
        if b < 0x80 {
            return data;
        }
        if b >= 0xC0 {
            let needed = if b >= 0xF0 {
                4
            } else if b >= 0xE0 {
                3
            } else {
                2
            };
            return if len - i >= needed { data } else { &data[..i] };
        }
    }
    data
}
