//! Queued deploy jobs and the worker that runs them

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{DeployerError, Result};
use crate::pipeline::{CycleReport, Pipeline};

/// What caused a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Startup,
    Webhook { delivery: Option<String> },
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Startup => f.write_str("startup"),
            Trigger::Webhook {
                delivery: Some(id),
            } => write!(f, "webhook {}", id),
            Trigger::Webhook { delivery: None } => f.write_str("webhook"),
        }
    }
}

/// One requested deploy cycle
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub trigger: Trigger,
    pub queued_at: DateTime<Utc>,
}

impl Job {
    pub fn new(trigger: Trigger) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            trigger,
            queued_at: Utc::now(),
        }
    }
}

/// Counters for jobs the worker has finished
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobStats {
    pub finished: u64,
    pub failed: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("job queue is full ({0} pending)")]
    Full(usize),

    #[error("job worker has stopped")]
    Closed,
}

/// Bounded queue in front of a single worker that runs jobs one at a time.
pub struct JobQueue {
    tx: mpsc::Sender<Job>,
    depth: Arc<AtomicUsize>,
    stats: watch::Receiver<JobStats>,
}

impl JobQueue {
    /// Spawn the worker. Must be called from within a tokio runtime.
    pub fn start(pipeline: Arc<Mutex<Pipeline>>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (stats_tx, stats) = watch::channel(JobStats::default());
        let depth = Arc::new(AtomicUsize::new(0));

        tokio::spawn(worker(rx, pipeline, depth.clone(), stats_tx));

        Self { tx, depth, stats }
    }

    /// Queue a cycle without waiting for it. Returns the job id.
    pub fn submit(&self, trigger: Trigger) -> std::result::Result<String, SubmitError> {
        let job = Job::new(trigger);
        let id = job.id.clone();

        self.depth.fetch_add(1, Ordering::SeqCst);
        match self.tx.try_send(job) {
            Ok(()) => Ok(id),
            Err(e) => {
                let pending = self.depth.fetch_sub(1, Ordering::SeqCst) - 1;
                match e {
                    mpsc::error::TrySendError::Full(_) => Err(SubmitError::Full(pending)),
                    mpsc::error::TrySendError::Closed(_) => Err(SubmitError::Closed),
                }
            }
        }
    }

    /// Jobs accepted but not yet picked up by the worker.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> watch::Receiver<JobStats> {
        self.stats.clone()
    }
}

async fn worker(
    mut rx: mpsc::Receiver<Job>,
    pipeline: Arc<Mutex<Pipeline>>,
    depth: Arc<AtomicUsize>,
    stats: watch::Sender<JobStats>,
) {
    while let Some(job) = rx.recv().await {
        depth.fetch_sub(1, Ordering::SeqCst);
        let ok = run_job(pipeline.clone(), job).await.is_ok();
        stats.send_modify(|s| {
            s.finished += 1;
            if !ok {
                s.failed += 1;
            }
        });
    }
    warn!("Job worker stopped");
}

/// Run one job under the pipeline lock.
///
/// The cycle runs in its own task so a panic is reported as an error here
/// and the lock guard is released during unwinding.
pub async fn run_job(pipeline: Arc<Mutex<Pipeline>>, job: Job) -> Result<CycleReport> {
    let Job {
        id,
        trigger,
        queued_at,
    } = job;

    let handle = tokio::spawn(async move {
        let mut guard = pipeline.lock().await;
        let waited = Utc::now().signed_duration_since(queued_at);
        info!(
            "Job {} ({}) starting after {}ms in queue",
            id,
            trigger,
            waited.num_milliseconds()
        );
        let result = guard.run_cycle().await;
        drop(guard);

        match &result {
            Ok(report) => info!("Job {} completed in {:?}", id, report.elapsed),
            Err(e) => error!("Job {} failed: {}", id, e),
        }
        result
    });

    match handle.await {
        Ok(result) => result,
        Err(e) => {
            error!("Job task aborted: {}", e);
            Err(DeployerError::CycleAborted(e.to_string()))
        }
    }
}
