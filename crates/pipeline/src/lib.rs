//! Pipeline orchestration: live photoshoot runs, stage navigation, and
//! the sequential fan-out batches against the generation services.

pub mod error;
pub mod orchestrator;
pub mod run;
pub mod services;

pub use error::PipelineError;
pub use orchestrator::StageOrchestrator;
pub use run::{PipelineRun, RunSnapshot, TagOutcome};
pub use services::Services;
