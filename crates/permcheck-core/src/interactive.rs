//! Interactive, turn-based processes driven by prompt matching.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, trace};

use crate::process::{terminate, wait_for_exit};
use crate::session::SessionScope;

#[derive(Error, Debug)]
pub enum ExpectError {
    #[error("timed out waiting for {pattern:?}; output so far: {output:?}")]
    Timeout { pattern: String, output: String },
    #[error("process closed its output before {pattern:?} appeared; output: {output:?}")]
    Eof { pattern: String, output: String },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// A spawned process that can be fed lines and scanned for prompts.
pub trait InteractiveProcess {
    fn send_line(&mut self, line: &str) -> io::Result<()>;

    /// Wait until `pattern` appears (ASCII case-insensitive) in the process
    /// output. Output up to and including the match is consumed and returned.
    fn expect(&mut self, pattern: &str, timeout: Duration) -> Result<String, ExpectError>;

    /// Close the input channel and give the process up to `grace` to exit.
    fn close(&mut self, grace: Duration) -> io::Result<()>;

    fn is_alive(&mut self) -> io::Result<bool>;
}

/// Spawns [`InteractiveProcess`]es under a session scope.
pub trait Spawner: Send + Sync {
    type Process: InteractiveProcess;

    fn spawn(&self, args: &[String], scope: &SessionScope) -> io::Result<Self::Process>;
}

/// [`Spawner`] that talks to the controller binary over pipes.
#[derive(Clone, Debug)]
pub struct PipeSpawner {
    bin: PathBuf,
}

impl PipeSpawner {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }
}

impl Spawner for PipeSpawner {
    type Process = PipeProcess;

    fn spawn(&self, args: &[String], scope: &SessionScope) -> io::Result<PipeProcess> {
        debug!(scope = scope.label(), ?args, "Spawning interactive process");

        let mut child = Command::new(&self.bin)
            .args(args)
            .envs(scope.env().iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Prompts may arrive on either stream; both feed one channel.
        let (tx, rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            pump(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            pump(stderr, tx);
        }

        Ok(PipeProcess {
            stdin: child.stdin.take(),
            child,
            rx,
            buffer: String::new(),
        })
    }
}

fn pump<R: Read + Send + 'static>(mut reader: R, tx: Sender<Vec<u8>>) {
    thread::spawn(move || {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(chunk[..n].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    });
}

pub struct PipeProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    rx: Receiver<Vec<u8>>,
    buffer: String,
}

impl PipeProcess {
    pub fn id(&self) -> u32 {
        self.child.id()
    }
}

impl InteractiveProcess for PipeProcess {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "input already closed"))?;
        stdin.write_all(line.as_bytes())?;
        stdin.write_all(b"\n")?;
        stdin.flush()
    }

    fn expect(&mut self, pattern: &str, timeout: Duration) -> Result<String, ExpectError> {
        let needle = pattern.to_ascii_lowercase();
        let deadline = Instant::now() + timeout;
        loop {
            // ASCII lowering keeps byte offsets aligned with `buffer`
            if let Some(pos) = self.buffer.to_ascii_lowercase().find(&needle) {
                let end = pos + needle.len();
                let consumed: String = self.buffer.drain(..end).collect();
                trace!(pattern, "Matched prompt");
                return Ok(consumed);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(chunk) => self.buffer.push_str(&String::from_utf8_lossy(&chunk)),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(ExpectError::Timeout {
                        pattern: pattern.to_string(),
                        output: self.buffer.clone(),
                    })
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ExpectError::Eof {
                        pattern: pattern.to_string(),
                        output: self.buffer.clone(),
                    })
                }
            }
        }
    }

    fn close(&mut self, grace: Duration) -> io::Result<()> {
        drop(self.stdin.take());
        wait_for_exit(&mut self.child, grace);
        Ok(())
    }

    fn is_alive(&mut self) -> io::Result<bool> {
        Ok(self.child.try_wait()?.is_none())
    }
}

impl Drop for PipeProcess {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Ok(None) = self.child.try_wait() {
            terminate(&mut self.child, Duration::from_secs(1));
        }
    }
}
