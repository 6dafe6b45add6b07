use std::io;
use std::process::Output;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::trace;

use crate::PdiskError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Outcome of one external command run to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Execution {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    /// stdout and stderr, merged in the order they were written.
    pub output: String,
}

impl Execution {
    pub fn new<S: AsRef<str>>(code: i32, output: S) -> Self {
        Execution {
            code: Some(code),
            output: output.as_ref().to_string(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn code_str(&self) -> String {
        self.code
            .map(|c| c.to_string())
            .unwrap_or("signal".to_string())
    }
}

/// Runs one command, blocking until it exits.
///
/// `action` only labels errors and log lines.
pub trait Executor {
    fn run(&self, action: &str, argv: &[String]) -> Result<Execution>;
}

/// Spawns the command directly, without a shell.
#[derive(Debug, Default, Clone)]
pub struct ProcessExecutor {
    timeout: Option<Duration>,
}

impl ProcessExecutor {
    pub fn new() -> Self {
        ProcessExecutor { timeout: None }
    }

    /// Commands still running after `timeout` are killed.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        ProcessExecutor { timeout }
    }
}

impl Executor for ProcessExecutor {
    fn run(&self, action: &str, argv: &[String]) -> Result<Execution> {
        let spawn_err = spawn_error(action);

        let (program, args) = argv
            .split_first()
            .ok_or_else(|| spawn_err(io::Error::new(io::ErrorKind::InvalidInput, "empty command")))?;

        let handle = duct::cmd(program.as_str(), args)
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked()
            .start()
            .map_err(&spawn_err)?;
        trace!("started '{}' for {} action", program, action);

        let output = match self.timeout {
            None => handle.wait().map_err(&spawn_err)?.clone(),
            Some(timeout) => wait_deadline(&handle, action, timeout)?,
        };

        Ok(Execution {
            code: output.status.code(),
            output: String::from_utf8_lossy(&output.stdout).to_string(),
        })
    }
}

fn spawn_error(action: &str) -> impl Fn(io::Error) -> PdiskError + '_ {
    move |e| PdiskError::Spawn {
        action: action.to_string(),
        e,
    }
}

fn wait_deadline(handle: &duct::Handle, action: &str, timeout: Duration) -> Result<Output> {
    let deadline = Instant::now() + timeout;
    loop {
        let finished = handle.try_wait().map_err(spawn_error(action))?;
        if let Some(output) = finished {
            return Ok(output.clone());
        }

        if Instant::now() >= deadline {
            handle.kill().map_err(spawn_error(action))?;
            anyhow::bail!(PdiskError::Timeout {
                action: action.to_string(),
                secs: timeout.as_secs(),
            })
        }

        thread::sleep(POLL_INTERVAL);
    }
}
