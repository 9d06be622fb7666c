use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::models::assessment::CandidateAssessment;
use crate::models::candidate::CandidateProfile;
use crate::notifications::poller::notify_inbound;
use crate::pipeline::stages::{SourcingRequest, StageJob, StageRequest, StartError};
use crate::pipeline::store::{Artifact, PipelineStore};
use crate::scoring::prompts::fallback_message;
use crate::state::AppState;

/// Strength quoted for a candidate that was deep-scraped but never assessed.
const DEFAULT_STRENGTH: &str = "impressive background";

#[derive(Serialize)]
pub struct StartedResponse {
    pub status: &'static str,
    pub message: &'static str,
}

fn start(
    state: &AppState,
    job: StageJob,
    message: &'static str,
) -> Result<Json<StartedResponse>, AppError> {
    match state.pipeline.start(job) {
        Ok(()) => Ok(Json(StartedResponse {
            status: "started",
            message,
        })),
        Err(StartError::MissingPrerequisite(msg)) => Err(AppError::Validation(msg.to_string())),
        Err(StartError::Busy) => Err(AppError::Conflict(
            "Another pipeline stage is still running.".to_string(),
        )),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Stage triggers
// ────────────────────────────────────────────────────────────────────────────

/// POST /start-sourcing
pub async fn handle_start_sourcing(
    State(state): State<AppState>,
    Json(req): Json<SourcingRequest>,
) -> Result<Json<StartedResponse>, AppError> {
    if req.role.trim().is_empty() {
        return Err(AppError::Validation("role must not be empty".to_string()));
    }
    start(
        &state,
        StageJob::Source(req),
        "Sourcing started. Searching LinkedIn for Open-to-Work candidates...",
    )
}

/// POST /start-ranking
pub async fn handle_start_ranking(
    State(state): State<AppState>,
    Json(req): Json<StageRequest>,
) -> Result<Json<StartedResponse>, AppError> {
    start(
        &state,
        StageJob::Rank(req),
        "AI is ranking candidates against your persona...",
    )
}

/// POST /start-deep-scrape
pub async fn handle_start_deep_scrape(
    State(state): State<AppState>,
    Json(req): Json<StageRequest>,
) -> Result<Json<StartedResponse>, AppError> {
    start(
        &state,
        StageJob::DeepScrape(req),
        "Deep scraping top candidate profiles...",
    )
}

/// POST /start-analyze
pub async fn handle_start_analyze(
    State(state): State<AppState>,
    Json(req): Json<StageRequest>,
) -> Result<Json<StartedResponse>, AppError> {
    start(
        &state,
        StageJob::Analyze(req),
        "Running final AI assessment on deep-scraped profiles...",
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Stage outputs
// ────────────────────────────────────────────────────────────────────────────

fn listing(store: &PipelineStore, artifact: Artifact, key: &str) -> Json<Value> {
    let items: Vec<Value> = store.read(artifact);
    Json(json!({ key: items }))
}

/// GET /sourced
pub async fn handle_get_sourced(State(state): State<AppState>) -> Json<Value> {
    listing(state.pipeline.store(), Artifact::Sourced, "sourced")
}

/// GET /ranked
pub async fn handle_get_ranked(State(state): State<AppState>) -> Json<Value> {
    listing(state.pipeline.store(), Artifact::Ranked, "ranked")
}

/// GET /deep-scraped
pub async fn handle_get_deep_scraped(State(state): State<AppState>) -> Json<Value> {
    listing(state.pipeline.store(), Artifact::DeepScraped, "deep_scraped")
}

/// GET /results
pub async fn handle_get_results(State(state): State<AppState>) -> Json<Value> {
    listing(state.pipeline.store(), Artifact::Results, "results")
}

/// GET /status
pub async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(
            header::CACHE_CONTROL,
            "no-store, no-cache, must-revalidate, max-age=0",
        )],
        Json(state.pipeline.store().status()),
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Outreach and replies
// ────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct OutreachRequest {
    /// The candidate's profile URL.
    pub candidate_id: String,
    pub personalized_message: String,
}

/// POST /send-outreach
pub async fn handle_send_outreach(
    State(state): State<AppState>,
    Json(req): Json<OutreachRequest>,
) -> Result<Json<Value>, AppError> {
    if req.personalized_message.trim().is_empty() {
        return Err(AppError::Validation(
            "personalized_message must not be empty".to_string(),
        ));
    }
    let outcome = state
        .engine
        .outreach(&req.candidate_id, &req.personalized_message)
        .await?;
    if !outcome.value {
        return Err(AppError::Upstream(outcome.message));
    }
    Ok(Json(json!({
        "status": "success",
        "message": format!("Message sent to {}", req.candidate_id)
    })))
}

#[derive(Deserialize)]
pub struct MessageQuery {
    pub candidate_id: String,
    pub role: String,
}

/// GET /generate-message
pub async fn handle_generate_message(
    State(state): State<AppState>,
    Query(params): Query<MessageQuery>,
) -> Json<Value> {
    let message = match strength_for(state.pipeline.store(), &params.candidate_id) {
        Some(strength) => state.scorer.draft_message(&params.role, &strength).await,
        None => fallback_message(&params.role),
    };
    Json(json!({ "message": message }))
}

/// The assessed first strength, or a generic one for a candidate that was
/// only deep-scraped. `None` when the candidate is unknown.
fn strength_for(store: &PipelineStore, candidate_id: &str) -> Option<String> {
    let results: Vec<CandidateAssessment> = store.read(Artifact::Results);
    if let Some(assessment) = results.iter().find(|a| a.candidate_id == candidate_id) {
        let strength = assessment.role_fit_analysis.strengths.first();
        return Some(strength.map_or(DEFAULT_STRENGTH, String::as_str).to_string());
    }
    let scraped: Vec<CandidateProfile> = store.read(Artifact::DeepScraped);
    scraped
        .iter()
        .any(|c| c.id == candidate_id)
        .then(|| DEFAULT_STRENGTH.to_string())
}

/// POST /check-replies
pub async fn handle_check_replies(
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let found = notify_inbound(&state.engine, state.notifier.as_ref()).await?;
    Ok(Json(json!({ "status": "success", "replies_found": found })))
}
