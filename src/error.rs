use std::io;

/// Error type for every stage of a deploy cycle
#[derive(Debug, thiserror::Error)]
pub enum DeployerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Repository init failed: {0}")]
    RepoInitError(String),

    #[error("Git operation failed: {operation}\n{message}")]
    RepoOperationError { operation: String, message: String },

    #[error("Static build failed: {0}")]
    BuildError(String),

    #[error("Deploy failed: {0}")]
    DeployError(String),

    #[error("Cycle aborted: {0}")]
    CycleAborted(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Helper type for Results that use DeployerError
pub type Result<T> = std::result::Result<T, DeployerError>;
