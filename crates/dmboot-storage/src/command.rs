//! External command execution.

use std::fmt;

use async_trait::async_trait;
use dmboot_common::{BootError, BootResult};

/// Exit code and combined output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// Standard output followed by standard error.
    pub output: String,
}

impl CommandOutput {
    /// Successful output with the given text.
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            output: output.into(),
        }
    }

    /// Failed output with the given exit code and text.
    pub fn failed(code: i32, output: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            output: output.into(),
        }
    }

    /// Whether the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Convert a non-zero exit into [`BootError::Provision`] carrying the output.
    ///
    /// # Errors
    ///
    /// Returns an error if the command did not succeed.
    pub fn check(self, operation: &str) -> BootResult<Self> {
        if self.success() {
            return Ok(self);
        }
        tracing::warn!(operation, status = %self.status(), output = %self.output, "Command failed");
        Err(BootError::Provision {
            operation: operation.to_string(),
            status: self.status().to_string(),
            output: self.output,
        })
    }

    fn status(&self) -> ExitDescription {
        ExitDescription(self.code)
    }
}

struct ExitDescription(Option<i32>);

impl fmt::Display for ExitDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "exit status: {code}"),
            None => write!(f, "terminated by signal"),
        }
    }
}

/// Runs external commands to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, capturing combined output.
    ///
    /// Only a failure to execute the program is an error; a non-zero exit is
    /// reported through [`CommandOutput::code`].
    async fn run(&self, program: &str, args: &[String]) -> BootResult<CommandOutput>;
}

/// Runs commands on the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> BootResult<CommandOutput> {
        tracing::debug!(program, ?args, "Running command");

        let output = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| BootError::Provision {
                operation: program.to_string(),
                status: "not executed".to_string(),
                output: e.to_string(),
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            code: output.status.code(),
            output: combined,
        })
    }
}
