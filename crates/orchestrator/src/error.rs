use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Every way a graph request can fail between the HTTP boundary and the engine.
///
/// None of these are retried. The HTTP layer turns each variant into exactly one
/// JSON error response carrying an `error` field.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Malformed upload, missing JSON fields, bad parameters or session names.
    #[error("{0}")]
    Input(String),

    /// The engine ran and exited non-zero. `stderr` is surfaced verbatim.
    #[error("{stderr}")]
    EngineFailure {
        /// Exit code, `None` when the process was terminated by a signal.
        code: Option<i32>,
        stderr: String,
    },

    /// The engine binary could not be started at all.
    #[error("Failed to launch engine {program}: {source}")]
    Launch {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The engine did not finish before the configured deadline and was killed.
    #[error("Engine did not finish within {}s and was terminated", .after.as_secs())]
    Timeout { after: Duration },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Filesystem work moved off the async workers panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl OrchestratorError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// HTTP status the service answers with for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            OrchestratorError::Input(_) => 400,
            OrchestratorError::Timeout { .. } => 504,
            OrchestratorError::EngineFailure { .. }
            | OrchestratorError::Launch { .. }
            | OrchestratorError::Io { .. }
            | OrchestratorError::Task(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
