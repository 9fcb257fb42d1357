use std::io;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReplayError>;

/// Request rejections. The display strings are shown to the operator as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Log content is empty.")]
    EmptyContent,
    #[error("Log type is required.")]
    EmptyLogType,
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The executable could not be started at all. Distinct from a process
    /// that ran and exited non-zero, which is reported as data.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` did not finish within {}s", timeout.as_secs_f64())]
    Timeout { command: String, timeout: Duration },

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode replay result: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("output reader task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ReplayError {
    pub(crate) fn spawn(program: &str, source: io::Error) -> Self {
        Self::Spawn {
            program: program.to_string(),
            source,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, ReplayError::Validation(_))
    }
}
