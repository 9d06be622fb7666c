//! File-backed four-stage pipeline and its HTTP surface.

pub mod handlers;
pub mod stages;
pub mod store;

pub use stages::Pipeline;
pub use store::PipelineStore;
