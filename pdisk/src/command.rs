use anyhow::Result;
use regex::Regex;
use tracing::{debug, info, trace};

use crate::{Action, Executor, PdiskError, SubAction, OUTPUT_END, OUTPUT_START, STATUS_MISMATCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    NonZeroExit,
    PatternMismatch,
    SpawnError,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Created,
    Executing,
    Succeeded,
    Failed(FailureReason),
}

/// One fully substituted filer command and how to tell it succeeded.
#[derive(Debug)]
pub struct Command {
    action: Action,
    sub_action: SubAction,
    argv: Vec<String>,
    patterns: Option<Vec<Regex>>,
    state: CommandState,
}

impl Command {
    pub fn new(
        action: Action,
        sub_action: SubAction,
        argv: Vec<String>,
        patterns: Option<&[&str]>,
    ) -> Result<Self> {
        let patterns = match patterns {
            Some(p) => Some(
                p.iter()
                    .map(|s| Regex::new(s))
                    .collect::<Result<Vec<Regex>, regex::Error>>()?,
            ),
            None => None,
        };

        Ok(Command {
            action,
            sub_action,
            argv,
            patterns,
            state: CommandState::Created,
        })
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    /// Runs the command and returns its status: 0 on success,
    /// [`STATUS_MISMATCH`] when the filer exited cleanly but its output
    /// does not prove success.
    ///
    /// A command that cannot be started, exits non-zero or times out is
    /// an error.
    pub fn execute(&mut self, executor: &dyn Executor) -> Result<i32> {
        let label = self.label();
        debug!("Executing command: '{}'", self.argv.join(" "));
        self.state = CommandState::Executing;

        let execution = match executor.run(&label, &self.argv) {
            Ok(execution) => execution,
            Err(e) => {
                let reason = match e.downcast_ref::<PdiskError>() {
                    Some(PdiskError::Timeout { .. }) => FailureReason::Timeout,
                    _ => FailureReason::SpawnError,
                };
                self.state = CommandState::Failed(reason);
                return Err(e);
            }
        };

        if !execution.success() {
            self.state = CommandState::Failed(FailureReason::NonZeroExit);
            anyhow::bail!(PdiskError::CommandFailed {
                action: label,
                code: execution.code_str(),
                output: execution.output,
            })
        }

        let output = execution.output;
        if self.classify(&output) {
            self.state = CommandState::Succeeded;
            debug!("{} action completed successfully.", label);
            if !output.is_empty() {
                trace!(
                    "Command output:\n{}\n{}\n{}",
                    OUTPUT_START,
                    output,
                    OUTPUT_END
                );
            }
            Ok(0)
        } else {
            self.state = CommandState::Failed(FailureReason::PatternMismatch);
            info!(
                "An error occured during {} action. Command output:\n{}\n{}\n{}",
                label, OUTPUT_START, output, OUTPUT_END
            );
            Ok(STATUS_MISMATCH)
        }
    }

    /// With success patterns, any match is a success; without, only an
    /// empty output is.
    pub fn classify(&self, output: &str) -> bool {
        match &self.patterns {
            Some(patterns) => patterns.iter().any(|re| re.is_match(output)),
            None => output.is_empty(),
        }
    }

    fn label(&self) -> String {
        if self.action.name() == self.sub_action.name() {
            self.action.to_string()
        } else {
            format!("{} ({})", self.action, self.sub_action)
        }
    }
}
