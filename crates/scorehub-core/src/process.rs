use crate::paths::display_command;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

pub const LIST_TIMEOUT: Duration = Duration::from_secs(30);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
pub const PLUGIN_OPERATION_TIMEOUT: Duration = Duration::from_secs(300);
pub const ISSUE_UPLOAD_TIMEOUT: Duration = Duration::from_secs(180);

/// Outcome of one external command. `output` carries stdout and stderr on every
/// path, or a description of why the command could not run to completion.
///
/// `stdout` holds the standard output alone, for callers that parse it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub output: String,
    #[serde(skip)]
    pub stdout: String,
}

impl CommandResult {
    /// A successful run whose whole output came from stdout.
    pub fn ok(output: impl Into<String>) -> Self {
        let output = output.into();
        Self {
            success: true,
            stdout: output.clone(),
            output,
        }
    }

    /// A run that failed or never started. Nothing is attributed to stdout.
    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            stdout: String::new(),
        }
    }

    pub fn captured(success: bool, stdout: String, stderr: &str) -> Self {
        Self {
            success,
            output: format!("{stdout}\n{stderr}"),
            stdout,
        }
    }
}

pub trait CommandRunner {
    fn run(&self, argv: &[String], cwd: &Path, timeout: Duration) -> CommandResult;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessRunner {
    pub poll_interval: Duration,
    pub reap_grace: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
            reap_grace: Duration::from_millis(500),
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn wait_with_deadline(&self, child: &mut Child, deadline: Instant) -> WaitOutcome {
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return WaitOutcome::Exited(status),
                Ok(None) => {
                    if Instant::now() >= deadline {
                        return WaitOutcome::TimedOut;
                    }
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    thread::sleep(remaining.min(self.poll_interval.max(Duration::from_millis(1))));
                }
                Err(err) => return WaitOutcome::WaitFailed(err.to_string()),
            }
        }
    }

    fn kill_and_reap(&self, child: &mut Child) {
        let _ = child.kill();
        let deadline = Instant::now() + self.reap_grace;
        loop {
            match child.try_wait() {
                Ok(Some(_)) | Err(_) => return,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        tracing::warn!(pid = child.id(), "process did not exit after kill");
                        return;
                    }
                    thread::sleep(self.poll_interval.max(Duration::from_millis(1)));
                }
            }
        }
    }
}

enum WaitOutcome {
    Exited(ExitStatus),
    TimedOut,
    WaitFailed(String),
}

impl CommandRunner for ProcessRunner {
    fn run(&self, argv: &[String], cwd: &Path, timeout: Duration) -> CommandResult {
        let Some((program, args)) = argv.split_first() else {
            return CommandResult::failed("An unexpected error occurred: command is empty");
        };

        let rendered = display_command(argv);
        tracing::info!(command = %rendered, cwd = %cwd.display(), "running command");

        let spawned = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(err) => {
                tracing::error!(command = %rendered, "failed to launch command: {err}");
                return CommandResult::failed(format!("An unexpected error occurred: {err}"));
            }
        };

        let stdout_rx = child.stdout.take().map(spawn_reader_thread);
        let stderr_rx = child.stderr.take().map(spawn_reader_thread);

        let deadline = Instant::now() + timeout;
        let status = match self.wait_with_deadline(&mut child, deadline) {
            WaitOutcome::Exited(status) => status,
            WaitOutcome::TimedOut => {
                self.kill_and_reap(&mut child);
                let timeout_secs = timeout.as_secs_f64();
                tracing::error!(command = %rendered, timeout_secs, "command timed out");
                return CommandResult::failed(format!(
                    "Error: command timed out after {timeout_secs} seconds."
                ));
            }
            WaitOutcome::WaitFailed(err) => {
                self.kill_and_reap(&mut child);
                tracing::error!(command = %rendered, "waiting on command failed: {err}");
                return CommandResult::failed(format!("An unexpected error occurred: {err}"));
            }
        };

        let stdout = collect_output(stdout_rx, self.reap_grace);
        let stderr = collect_output(stderr_rx, self.reap_grace);
        if status.success() {
            tracing::info!(command = %rendered, "command finished successfully");
        } else {
            tracing::warn!(command = %rendered, status = %status, "command failed");
        }
        CommandResult::captured(status.success(), stdout, &stderr)
    }
}

fn spawn_reader_thread(mut stream: impl Read + Send + 'static) -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stream.read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

// A grandchild that inherited the pipe can keep it open past our child's exit.
fn collect_output(rx: Option<Receiver<String>>, wait: Duration) -> String {
    let Some(rx) = rx else {
        return String::new();
    };
    match rx.recv_timeout(wait) {
        Ok(text) => text,
        Err(RecvTimeoutError::Timeout) => {
            tracing::warn!("output stream still open after process exit, dropping it");
            String::new()
        }
        Err(RecvTimeoutError::Disconnected) => String::new(),
    }
}
