//! HTTP handlers for the resource surface and the entry point.

pub mod entry;
pub mod resource;

pub use entry::discover;
pub use resource::{index, member};
