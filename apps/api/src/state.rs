use std::sync::Arc;

use crate::notifications::Notifier;
use crate::phantom::SourcingEngine;
use crate::pipeline::Pipeline;
use crate::scoring::CandidateScorer;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SourcingEngine>,
    /// Pluggable scorer. Default: `LlmCandidateScorer`.
    pub scorer: Arc<dyn CandidateScorer>,
    pub notifier: Arc<dyn Notifier>,
    /// Owns the stage files and the single-stage busy flag.
    pub pipeline: Arc<Pipeline>,
}
