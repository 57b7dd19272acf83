//! Pipeline-level error type.

use uuid::Uuid;

use lookbook_clients::JobError;
use lookbook_core::CoreError;

/// Failures surfaced by pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Validation or guard violation from the domain layer.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("pipeline run {0} not found")]
    RunNotFound(Uuid),

    /// A fan-out batch is already in flight for this run.
    #[error("a generation batch is already running for this run")]
    Busy,

    /// The operation does not apply to the run's current stage.
    #[error("{0}")]
    WrongStage(String),

    /// Every key of a fan-out batch failed; the stage did not advance.
    #[error("{0}")]
    BatchFailed(String),

    /// A job failure that escaped per-key isolation.
    #[error(transparent)]
    Job(#[from] JobError),
}
