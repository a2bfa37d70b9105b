//! Error types shared across the engine boundary and the orchestrator.

use thiserror::Error;

use crate::job::JobId;
use crate::orchestrator::EnginePhase;

/// Errors that can occur at the conversion engine boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The engine could not be loaded. Fatal for the session.
    #[error("engine failed to initialize: {0}")]
    Init(String),
    /// A single remux operation failed.
    #[error("conversion failed: {0}")]
    Conversion(String),
    /// A scratch entry expected by the engine does not exist.
    #[error("engine entry not found: {0}")]
    MissingEntry(String),
    /// Filesystem or process I/O failed.
    #[error("engine I/O error: {0}")]
    Io(String),
}

impl EngineError {
    /// Whether this error ends the session rather than a single job.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Init(_))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}

/// Errors returned by the orchestrator's public operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("no job with id {0}")]
    UnknownJob(JobId),
    #[error("job {0} has no artifact to download")]
    NotCompleted(JobId),
    #[error("cannot change the target format while {0:?}")]
    Busy(EnginePhase),
    #[error("artifact delivery failed: {0}")]
    Delivery(String),
}
