//! Deadline-boxed child-process execution.

use crate::{RunnerError, RunnerResult};
use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation signal. Cloning is cheap; any clone can cancel the
/// whole batch.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Captured result of one child process run.
#[derive(Debug)]
pub struct ProcessOutput {
    /// Exit status; `None` when the process was killed on deadline.
    pub status: Option<std::process::ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status.is_some_and(|s| s.success())
    }

    /// stdout and stderr concatenated, the way the classifiers consume it.
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run `command` to completion, killing it when `deadline` elapses or
/// `cancel` fires. The child's stdout/stderr are drained on separate threads
/// so a chatty tool can never fill its pipe and stall.
pub fn run_with_deadline(
    mut command: Command,
    deadline: Duration,
    cancel: &CancelFlag,
    tool: &str,
) -> RunnerResult<ProcessOutput> {
    if cancel.is_cancelled() {
        return Err(RunnerError::Cancelled {
            tool: tool.to_string(),
        });
    }

    let start = Instant::now();
    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .spawn()
        .map_err(|source| RunnerError::Launch {
            tool: tool.to_string(),
            source,
        })?;

    let stdout_handle = drain(child.stdout.take());
    let stderr_handle = drain(child.stderr.take());

    let mut timed_out = false;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Some(status),
            Ok(None) => {
                if cancel.is_cancelled() {
                    kill_and_reap(&mut child);
                    return Err(RunnerError::Cancelled {
                        tool: tool.to_string(),
                    });
                }
                if start.elapsed() >= deadline {
                    tracing::warn!(tool, ?deadline, "deadline reached, killing process");
                    kill_and_reap(&mut child);
                    timed_out = true;
                    break None;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(source) => {
                kill_and_reap(&mut child);
                return Err(RunnerError::Io {
                    tool: tool.to_string(),
                    source,
                });
            }
        }
    };

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();

    Ok(ProcessOutput {
        status,
        stdout,
        stderr,
        timed_out,
        elapsed: start.elapsed(),
    })
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(mut reader) = reader {
            let _ = reader.read_to_string(&mut buf);
        }
        buf
    })
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_exit_status() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo hello"]);
        let out = run_with_deadline(cmd, Duration::from_secs(5), &CancelFlag::new(), "sh").unwrap();
        assert!(out.success());
        assert!(!out.timed_out);
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn captures_stderr_separately() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo oops >&2; exit 3"]);
        let out = run_with_deadline(cmd, Duration::from_secs(5), &CancelFlag::new(), "sh").unwrap();
        assert!(!out.success());
        assert_eq!(out.stderr.trim(), "oops");
        assert!(out.combined().contains("oops"));
    }

    #[test]
    fn deadline_kills_long_running_process() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 30"]);
        let out =
            run_with_deadline(cmd, Duration::from_millis(200), &CancelFlag::new(), "sh").unwrap();
        assert!(out.timed_out);
        assert!(out.status.is_none());
        assert!(out.elapsed < Duration::from_secs(10));
    }

    #[test]
    fn pre_cancelled_flag_short_circuits() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo never"]);
        let err = run_with_deadline(cmd, Duration::from_secs(1), &cancel, "sh").unwrap_err();
        assert!(matches!(err, RunnerError::Cancelled { .. }));
    }

    #[test]
    fn missing_binary_is_a_launch_error() {
        let cmd = Command::new("definitely-not-a-real-binary-name");
        let err =
            run_with_deadline(cmd, Duration::from_secs(1), &CancelFlag::new(), "ghost").unwrap_err();
        assert!(matches!(err, RunnerError::Launch { .. }));
    }
}
