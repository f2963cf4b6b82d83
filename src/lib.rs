pub mod api;
pub mod build;
pub mod config;
pub mod deploy;
pub mod error;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod process;
pub mod remote;
pub mod repo;
pub mod utils;

use std::sync::Arc;
use tokio::sync::Mutex;

pub use config::{BlogApp, DeployConfig, load_config};
pub use error::{DeployerError, Result};

use job::{Job, JobQueue, Trigger};
use pipeline::{CycleReport, Pipeline};

/// Everything a request handler needs, built once at startup.
pub struct AppState {
    pub config: DeployConfig,
    /// Held for the whole of every cycle, startup included.
    pub pipeline: Arc<Mutex<Pipeline>>,
    pub jobs: JobQueue,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Build the pipeline and start the job worker. Requires a tokio runtime.
    pub fn new(config: DeployConfig) -> Self {
        let pipeline = Arc::new(Mutex::new(Pipeline::from_config(&config)));
        let jobs = JobQueue::start(pipeline.clone(), config.queue_capacity);
        Self {
            config,
            pipeline,
            jobs,
        }
    }

    /// Initialize the working copy and run the first cycle.
    ///
    /// Any error here should stop the process before it starts serving.
    pub async fn startup(&self) -> Result<CycleReport> {
        self.pipeline.lock().await.initialize().await?;
        job::run_job(self.pipeline.clone(), Job::new(Trigger::Startup)).await
    }
}
