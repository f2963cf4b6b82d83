//! Running external tools (git, site generators) and judging their output

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Output, Stdio};
use std::str::FromStr;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::error::DeployerError;

/// How the output of an external tool decides success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Anything written to stderr is a failure, warnings included.
    #[default]
    StderrIsFailure,
    /// Only a non-zero exit status is a failure.
    ExitCode,
}

impl FailurePolicy {
    pub fn judge(&self, output: &Output) -> Result<(), ToolFailure> {
        let rejected = match self {
            FailurePolicy::StderrIsFailure => {
                !output.stderr.is_empty() || !output.status.success()
            }
            FailurePolicy::ExitCode => !output.status.success(),
        };
        if rejected {
            return Err(ToolFailure::Rejected {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
            });
        }
        Ok(())
    }
}

impl FromStr for FailurePolicy {
    type Err = DeployerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stderr" => Ok(FailurePolicy::StderrIsFailure),
            "exit-code" => Ok(FailurePolicy::ExitCode),
            other => Err(DeployerError::ConfigError(format!(
                "cycle.failurePolicy must be 'stderr' or 'exit-code' (got '{}')",
                other
            ))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolFailure {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("{status}: {stderr}")]
    Rejected { status: ExitStatus, stderr: String },
}

/// Runs one external command to completion under a failure policy.
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    policy: FailurePolicy,
    timeout: Option<Duration>,
    envs: Vec<(String, String)>,
}

impl ToolRunner {
    pub fn new(policy: FailurePolicy, timeout: Option<Duration>) -> Self {
        Self {
            policy,
            timeout,
            envs: Vec::new(),
        }
    }

    /// Set an environment variable for every command this runner starts.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Run `program args..` in `cwd` and return its stdout.
    ///
    /// Arguments are never logged; callers log a redacted description.
    pub async fn run<S: AsRef<str>>(
        &self,
        cwd: &Path,
        program: &str,
        args: &[S],
    ) -> Result<String, ToolFailure> {
        debug!("Running {} (cwd = {:?})", program, cwd);
        let mut command = Command::new(program);
        command
            .args(args.iter().map(|a| a.as_ref()))
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        let child = command.output();

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child)
                .await
                .map_err(|_| ToolFailure::TimedOut(limit))?,
            None => child.await,
        };
        let output = result.map_err(|source| ToolFailure::Spawn {
            program: program.to_string(),
            source,
        })?;

        self.policy.judge(&output)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
