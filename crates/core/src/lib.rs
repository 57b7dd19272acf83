//! Pure domain logic for the Lookbook virtual photoshoot pipeline.
//!
//! No I/O lives here: combination keys and variant grids, the wizard
//! stage machine with its guards, provider response normalization,
//! progress estimation, and the detail-view viewport.

pub mod error;
pub mod garment;
pub mod normalize;
pub mod progress;
pub mod settings;
pub mod stage;
pub mod types;
pub mod variants;
pub mod viewport;

pub use error::CoreError;
