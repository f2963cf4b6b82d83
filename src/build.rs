//! Static site generation

use std::path::PathBuf;
use tracing::info;

use crate::config::{BlogApp, DeployConfig};
use crate::error::{DeployerError, Result};
use crate::process::ToolRunner;

/// Invokes the configured generator inside the working copy.
#[derive(Debug)]
pub struct StaticBuilder {
    repo_dir: PathBuf,
    blog_app: BlogApp,
    command: Vec<String>,
    runner: ToolRunner,
}

impl StaticBuilder {
    pub fn new(repo_dir: impl Into<PathBuf>, blog_app: BlogApp, runner: ToolRunner) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            blog_app,
            command: blog_app.default_command(),
            runner,
        }
    }

    pub fn from_config(config: &DeployConfig) -> Self {
        let runner = ToolRunner::new(config.failure_policy, config.command_timeout);
        let builder = Self::new(config.repo_dir.clone(), config.blog_app, runner);
        match &config.build_command {
            Some(argv) => builder.with_command(argv.clone()),
            None => builder,
        }
    }

    /// Replace the generator invocation. The output directory still follows `blog_app`.
    pub fn with_command(mut self, argv: Vec<String>) -> Self {
        if !argv.is_empty() {
            self.command = argv;
        }
        self
    }

    /// Where the generated tree lands.
    pub fn output_dir(&self) -> PathBuf {
        self.repo_dir.join(self.blog_app.output_dir())
    }

    pub async fn gen_static(&self) -> Result<()> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| DeployerError::BuildError("empty build command".to_string()))?;

        info!(
            "Running (cwd = {:?}): {}",
            self.repo_dir,
            self.command.join(" ")
        );
        self.runner
            .run(&self.repo_dir, program, args)
            .await
            .map_err(|e| DeployerError::BuildError(format!("{} {}", self.blog_app, e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::FailurePolicy;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn test_default_commands_and_output_dirs() {
        let hugo = StaticBuilder::new("/r", BlogApp::Hugo, ToolRunner::default());
        assert_eq!(hugo.command, vec!["hugo", "--quiet"]);
        assert_eq!(hugo.output_dir(), PathBuf::from("/r/public"));

        let hexo = StaticBuilder::new("/r", BlogApp::Hexo, ToolRunner::default());
        assert_eq!(hexo.command, vec!["hexo", "--silent", "g"]);
        assert_eq!(hexo.output_dir(), PathBuf::from("/r/public"));

        let jekyll = StaticBuilder::new("/r", BlogApp::Jekyll, ToolRunner::default());
        assert_eq!(jekyll.command, vec!["jekyll", "build", "-q"]);
        assert_eq!(jekyll.output_dir(), PathBuf::from("/r/_site"));
    }

    #[tokio::test]
    async fn test_gen_static_runs_in_repo_dir() {
        let dir = tempfile::tempdir().unwrap();
        let builder = StaticBuilder::new(dir.path(), BlogApp::Jekyll, ToolRunner::default())
            .with_command(sh("mkdir -p _site && echo '<h1>hi</h1>' > _site/index.html"));

        builder.gen_static().await.unwrap();
        let page = std::fs::read_to_string(builder.output_dir().join("index.html")).unwrap();
        assert_eq!(page, "<h1>hi</h1>\n");
    }

    #[tokio::test]
    async fn test_stderr_output_is_build_error() {
        let dir = tempfile::tempdir().unwrap();
        let builder = StaticBuilder::new(dir.path(), BlogApp::Hugo, ToolRunner::default())
            .with_command(sh("mkdir -p public; echo 'WARN deprecated option' >&2"));

        let err = builder.gen_static().await.unwrap_err();
        assert!(matches!(err, DeployerError::BuildError(ref m) if m.contains("deprecated option")));
    }

    #[tokio::test]
    async fn test_exit_code_policy_accepts_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ToolRunner::new(FailurePolicy::ExitCode, None);
        let builder = StaticBuilder::new(dir.path(), BlogApp::Hugo, runner)
            .with_command(sh("mkdir -p public; echo 'WARN deprecated option' >&2"));

        builder.gen_static().await.unwrap();
        assert!(builder.output_dir().is_dir());
    }
}
