//! HTTP boundary to the generation providers: model generation,
//! virtual try-on, background replacement, image tagging, and the
//! public-URL upload used to repair inputs the providers cannot fetch.
//!
//! Each service is a trait plus one `reqwest`-backed implementation so
//! the orchestrator can be exercised against mocks.

pub mod background;
pub mod job;
pub mod model_generation;
pub mod tagging;
pub mod try_on;
pub mod upload;

pub use background::{BackgroundRequest, BackgroundService, HttpBackgroundClient};
pub use job::{JobError, PollOutcome, ProgressSink, RetryPolicy, SubmitOutcome};
pub use model_generation::{
    HttpModelGenerationClient, ModelGenerationRequest, ModelGenerationService,
};
pub use tagging::{HttpTaggingClient, TagAnalysis, TaggingRequest, TaggingService};
pub use try_on::{HttpTryOnClient, TryOnRequest, TryOnService};
pub use upload::{HttpUploadClient, UploadService};
