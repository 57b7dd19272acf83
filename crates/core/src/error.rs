/// Errors produced by the pure domain layer.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Stage guard not satisfied: {0}")]
    Guard(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
