//! Request handlers, grouped by resource.

pub mod gallery;
pub mod pipeline;
pub mod proxy;
