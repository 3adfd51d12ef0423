use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::app::error::AppError;

const PIPE_GRACE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
    trace_id: &str,
) -> Result<CommandOutput, AppError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| {
            AppError::boundary_unavailable(format!("Failed to run {program}: {err}"), trace_id)
        })?;

    // Both pipes are drained on their own threads; a chatty child would otherwise
    // block on a full pipe and look like a timeout.
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stdout", trace_id))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stderr", trace_id))?;
    let stdout_rx = drain_pipe(stdout);
    let stderr_rx = drain_pipe(stderr);

    let start = Instant::now();
    let deadline = start + timeout;
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    // A grandchild may still hold the pipes; its drain threads are
                    // left behind rather than waited on.
                    warn!(trace_id = %trace_id, program = %program, "command timed out");
                    return Err(AppError::boundary_unavailable(
                        format!("{program} timed out after {}ms", timeout.as_millis()),
                        trace_id,
                    ));
                }
                thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                return Err(AppError::system(
                    format!("Failed to poll command: {err}"),
                    trace_id,
                ));
            }
        }
    };

    let stdout_bytes = collect_pipe(&stdout_rx, deadline);
    let stderr_bytes = collect_pipe(&stderr_rx, deadline);

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        exit_code,
    })
}

fn drain_pipe<R: Read + Send + 'static>(mut reader: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel::<Vec<u8>>();
    thread::spawn(move || {
        let mut buffer = Vec::<u8>::new();
        let mut temp = [0u8; 4096];
        loop {
            match reader.read(&mut temp) {
                Ok(0) => break,
                Ok(count) => buffer.extend_from_slice(&temp[..count]),
                Err(_) => break,
            }
        }
        let _ = tx.send(buffer);
    });
    rx
}

/// Waits for a drained pipe until the call's deadline, with a short grace
/// period for output still in flight when the child exits.
fn collect_pipe(rx: &Receiver<Vec<u8>>, deadline: Instant) -> Vec<u8> {
    let wait = deadline
        .saturating_duration_since(Instant::now())
        .max(PIPE_GRACE);
    rx.recv_timeout(wait).unwrap_or_default()
}
