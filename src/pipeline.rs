//! One synchronize → build → deploy cycle

use std::time::{Duration, Instant};
use tracing::info;

use crate::build::StaticBuilder;
use crate::config::DeployConfig;
use crate::deploy::Publisher;
use crate::error::Result;
use crate::repo::{Repository, SyncOutcome};

/// What a finished cycle did.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub sync: SyncOutcome,
    pub elapsed: Duration,
}

/// The repository, builder and publisher of one deploy target.
///
/// Callers serialize access through the `Mutex` held in `AppState`.
#[derive(Debug)]
pub struct Pipeline {
    repo: Repository,
    builder: StaticBuilder,
    publisher: Publisher,
}

impl Pipeline {
    pub fn new(repo: Repository, builder: StaticBuilder, publisher: Publisher) -> Self {
        Self {
            repo,
            builder,
            publisher,
        }
    }

    pub fn from_config(config: &DeployConfig) -> Self {
        Self::new(
            Repository::from_config(config),
            StaticBuilder::from_config(config),
            Publisher::from_config(config),
        )
    }

    /// Clone the source if needed; fails if `repo_dir` holds something else.
    pub async fn initialize(&mut self) -> Result<()> {
        self.repo.ensure_initialized().await
    }

    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let start = Instant::now();

        let sync = self.repo.update().await?;
        self.builder.gen_static().await?;
        self.publisher.deploy().await?;

        let elapsed = start.elapsed();
        info!(
            "Cycle finished in {:?} ({})",
            elapsed,
            match &sync {
                SyncOutcome::UpToDate => "no upstream changes".to_string(),
                SyncOutcome::Updated { to, .. } => format!("now at {}", to),
            }
        );
        Ok(CycleReport { sync, elapsed })
    }
}
