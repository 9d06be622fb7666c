//! Remote job orchestration against the browser-automation platform.
//!
//! `launcher -> waiter -> retriever -> reconciler`, driven by [`engine`].

pub mod engine;
pub mod error;
pub mod job;
pub mod launcher;
pub mod platform;
pub mod probes;
pub mod reconciler;
pub mod replies;
pub mod retriever;
pub mod retry;
pub mod topics;
pub mod waiter;

#[cfg(test)]
pub mod testing;

pub use engine::{Outcome, SourcingEngine};
pub use error::OrchestrationError;
