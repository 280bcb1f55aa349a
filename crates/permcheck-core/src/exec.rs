//! Request/response controller commands.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::process::{terminate, POLL_INTERVAL};
use crate::session::SessionScope;

#[cfg(any(test, feature = "test-support"))]
use mockall::automock;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to spawn controller command: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("controller command timed out after {after:?}")]
    Timeout { after: Duration },
    #[error("I/O error while running controller command: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured result of one finished command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, or `None` when the process was killed by a signal
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Whether stdout or stderr contains `needle`, ignoring ASCII case
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_ascii_lowercase();
        self.stderr.to_ascii_lowercase().contains(&needle)
            || self.stdout.to_ascii_lowercase().contains(&needle)
    }
}

/// Runs one controller command under an explicit session scope.
#[cfg_attr(any(test, feature = "test-support"), automock)]
pub trait CommandRunner: Send + Sync {
    fn run(&self, args: &[String], scope: &SessionScope) -> Result<CommandOutput, RunError>;
}

/// [`CommandRunner`] backed by the controller's CLI binary.
#[derive(Clone, Debug)]
pub struct ProcessRunner {
    bin: PathBuf,
    timeout: Duration,
    kill_grace: Duration,
}

impl ProcessRunner {
    pub fn new(bin: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
            kill_grace: Duration::from_secs(2),
        }
    }

    pub fn bin(&self) -> &PathBuf {
        &self.bin
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, args: &[String], scope: &SessionScope) -> Result<CommandOutput, RunError> {
        debug!(scope = scope.label(), ?args, "Running controller command");

        let mut child = Command::new(&self.bin)
            .args(args)
            .envs(scope.env().iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(RunError::Spawn)?;

        let (tx, rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            forward(stdout, Stream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward(stderr, Stream::Stderr, tx);
        }

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                warn!(scope = scope.label(), ?args, "Controller command timed out");
                terminate(&mut child, self.kill_grace);
                return Err(RunError::Timeout {
                    after: self.timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        // A background process started by the command can keep the pipes
        // open after the command itself exits.
        let drain_until = Instant::now() + self.kill_grace;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        loop {
            let remaining = drain_until.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((Stream::Stdout, chunk)) => stdout.extend_from_slice(&chunk),
                Ok((Stream::Stderr, chunk)) => stderr.extend_from_slice(&chunk),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        scope = scope.label(),
                        ?args,
                        "Output still open {:?} after exit, keeping what was read",
                        self.kill_grace
                    );
                    break;
                }
            }
        }

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            code: status.code(),
        })
    }
}

#[derive(Clone, Copy, Debug)]
enum Stream {
    Stdout,
    Stderr,
}

fn forward<R: Read + Send + 'static>(mut reader: R, stream: Stream, tx: Sender<(Stream, Vec<u8>)>) {
    thread::spawn(move || {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send((stream, chunk[..n].to_vec())).is_err() {
                        break;
                    }
                }
            }
        }
    });
}
