use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::LogConfig;

const DEFAULT_MAX_LOG_FILES: usize = 5;
const DEFAULT_LOG_LEVEL: &str = "info";
const LOG_FILE_PREFIX: &str = "deploy_logs";

pub struct FileLogger {
    log_directory: PathBuf,
    max_files: usize,
    rotation: Rotation,
}

impl FileLogger {
    pub fn new(log_directory: PathBuf) -> Self {
        Self {
            log_directory,
            max_files: DEFAULT_MAX_LOG_FILES,
            rotation: Rotation::DAILY,
        }
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files;
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Create the log directory and a non-blocking rolling writer into it.
    ///
    /// The returned guard flushes pending lines when dropped; keep it alive
    /// for the life of the process.
    pub fn setup_file_logging(&self) -> io::Result<(NonBlocking, WorkerGuard)> {
        std::fs::create_dir_all(&self.log_directory)?;

        let file_appender = RollingFileAppender::builder()
            .rotation(self.rotation.clone())
            .filename_prefix(LOG_FILE_PREFIX)
            .max_log_files(self.max_files)
            .build(&self.log_directory)
            .map_err(io::Error::other)?;

        Ok(tracing_appender::non_blocking(file_appender))
    }
}

/// Install the global subscriber: console output plus an optional log file.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn setup_logging(config: &LogConfig) -> io::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL))
    });

    let (file_layer, guard) = match &config.dir {
        Some(dir) => {
            let (writer, guard) = FileLogger::new(dir.clone()).setup_file_logging()?;
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer()) // Console output
        .with(file_layer)
        .init();

    Ok(guard)
}
