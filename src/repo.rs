//! Working copy of the source repository

use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, error, info};

use crate::config::DeployConfig;
use crate::error::{DeployerError, Result};
use crate::process::ToolRunner;
use crate::remote::RemoteUrl;

const GIT: &str = "git";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoState {
    Uninitialized,
    Ready,
    Error,
}

/// Result of a successful `update`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    UpToDate,
    Updated { from: String, to: String },
}

/// The local clone bound to `repo_dir`.
#[derive(Debug)]
pub struct Repository {
    repo_dir: PathBuf,
    remote: RemoteUrl,
    runner: ToolRunner,
    state: RepoState,
}

impl Repository {
    pub fn new(repo_dir: impl Into<PathBuf>, remote: RemoteUrl, runner: ToolRunner) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            remote,
            // never block on a credential prompt
            runner: runner.with_env("GIT_TERMINAL_PROMPT", "0"),
            state: RepoState::Uninitialized,
        }
    }

    pub fn from_config(config: &DeployConfig) -> Self {
        let remote = RemoteUrl::new(
            &config.source_url,
            config.git_username.as_deref(),
            config.git_token.as_ref(),
        );
        let runner = ToolRunner::new(config.failure_policy, config.command_timeout);
        Self::new(config.repo_dir.clone(), remote, runner)
    }

    pub fn state(&self) -> RepoState {
        self.state
    }

    /// Make sure `repo_dir` holds a clone of the configured source.
    ///
    /// An existing clone of the same remote is reused. A missing or empty
    /// directory is cloned into. Any other content is left untouched and
    /// reported as `RepoInitError`.
    pub async fn ensure_initialized(&mut self) -> Result<()> {
        if self.state == RepoState::Ready {
            return Ok(());
        }

        if let Some(origin) = self.existing_origin().await {
            if self.remote.same_remote(&origin) {
                if origin != self.remote.expose() {
                    self.git("remote set-url", &["remote", "set-url", "origin", self.remote.expose()])
                        .await?;
                    info!("Refreshed origin credentials in {:?}", self.repo_dir);
                }
                info!(
                    "Reusing existing clone of {} at {:?}",
                    self.remote.public(),
                    self.repo_dir
                );
                self.state = RepoState::Ready;
                return Ok(());
            }
            debug!("Clone at {:?} tracks a different remote", self.repo_dir);
        }

        let empty = match fs::read_dir(&self.repo_dir).await {
            Ok(mut entries) => entries.next_entry().await?.is_none(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(&self.repo_dir).await?;
                true
            }
            Err(e) => {
                self.state = RepoState::Error;
                return Err(DeployerError::RepoInitError(format!(
                    "cannot read {}: {}",
                    self.repo_dir.display(),
                    e
                )));
            }
        };
        if !empty {
            self.state = RepoState::Error;
            return Err(DeployerError::RepoInitError(format!(
                "{} exists and is not an empty directory",
                self.repo_dir.display()
            )));
        }

        info!("Cloning {} into {:?}", self.remote.redacted(), self.repo_dir);
        match self
            .git("clone", &["clone", "-q", "--recursive", self.remote.expose(), "."])
            .await
        {
            Ok(_) => {
                self.state = RepoState::Ready;
                Ok(())
            }
            Err(e) => {
                error!("Clone into {:?} failed", self.repo_dir);
                self.state = RepoState::Error;
                Err(e)
            }
        }
    }

    /// Pull new commits from the remote.
    pub async fn update(&mut self) -> Result<SyncOutcome> {
        if self.state != RepoState::Ready {
            self.ensure_initialized().await?;
        }

        let before = self.head().await?;
        info!("Running (cwd = {:?}): git pull -q", self.repo_dir);
        self.git("pull", &["pull", "-q"]).await?;
        let after = self.head().await?;

        if before == after {
            debug!("Already up to date at {}", after);
            Ok(SyncOutcome::UpToDate)
        } else {
            info!("Updated {} -> {}", before, after);
            Ok(SyncOutcome::Updated {
                from: before,
                to: after,
            })
        }
    }

    async fn head(&self) -> Result<String> {
        let out = self.git("rev-parse", &["rev-parse", "HEAD"]).await?;
        Ok(out.trim().to_string())
    }

    /// The fetch URL of `origin`, if `repo_dir` is a git clone with one.
    async fn existing_origin(&self) -> Option<String> {
        if !self.repo_dir.join(".git").exists() {
            return None;
        }
        let out = self.runner.run(&self.repo_dir, GIT, &["remote", "-v"]).await.ok()?;
        parse_origin_fetch_url(&out)
    }

    async fn git(&self, operation: &str, args: &[&str]) -> Result<String> {
        self.runner
            .run(&self.repo_dir, GIT, args)
            .await
            .map_err(|e| DeployerError::RepoOperationError {
                operation: format!("git {}", operation),
                message: self.remote.scrub(&e.to_string()),
            })
    }
}

/// Extract the origin fetch URL from `git remote -v` output.
///
/// Lines look like `origin<TAB><url> (fetch)`; the url may contain spaces.
fn parse_origin_fetch_url(remote_v: &str) -> Option<String> {
    remote_v.lines().find_map(|line| {
        let url = line
            .strip_prefix("origin\t")?
            .strip_suffix("(fetch)")?
            .trim();
        (!url.is_empty()).then(|| url.to_string())
    })
}
