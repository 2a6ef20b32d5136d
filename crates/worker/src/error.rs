use cardsync_core::CoreError;

/// Failures that stop the worker as a whole. Per-episode problems are
/// reported as blocked outcomes instead.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot read batch file {path}: {source}")]
    BatchRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid batch file {path}: {source}")]
    BatchParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Task failed: {0}")]
    Task(String),
}
