//! Saved-artifact gallery: an append-only JSON store with URL
//! deduplication, and a broadcast bus that fans out new saves.

pub mod bus;
pub mod item;
pub mod store;

pub use bus::GalleryBus;
pub use item::{GalleryItem, GalleryKind};
pub use store::{GalleryError, GalleryStore, JsonFileStore, SaveOutcome};
