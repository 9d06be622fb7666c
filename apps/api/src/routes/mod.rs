pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::pipeline::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Pipeline stages
        .route("/start-sourcing", post(handlers::handle_start_sourcing))
        .route("/start-ranking", post(handlers::handle_start_ranking))
        .route("/start-deep-scrape", post(handlers::handle_start_deep_scrape))
        .route("/start-analyze", post(handlers::handle_start_analyze))
        // Stage outputs
        .route("/sourced", get(handlers::handle_get_sourced))
        .route("/ranked", get(handlers::handle_get_ranked))
        .route("/deep-scraped", get(handlers::handle_get_deep_scraped))
        .route("/results", get(handlers::handle_get_results))
        .route("/status", get(handlers::handle_get_status))
        // Outreach
        .route("/send-outreach", post(handlers::handle_send_outreach))
        .route("/generate-message", get(handlers::handle_generate_message))
        .route("/check-replies", post(handlers::handle_check_replies))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::{AgentIds, OrchestrationPolicy};
    use crate::models::assessment::CandidateAssessment;
    use crate::notifications::testing::RecordingNotifier;
    use crate::phantom::testing::FakePlatform;
    use crate::phantom::SourcingEngine;
    use crate::pipeline::stages::testing::StubScorer;
    use crate::pipeline::store::Artifact;
    use crate::pipeline::{Pipeline, PipelineStore};
    use crate::scoring::CandidateScorer;

    fn test_state(dir: &tempfile::TempDir) -> AppState {
        let store = PipelineStore::new(dir.path());
        let engine = Arc::new(SourcingEngine::new(
            Arc::new(FakePlatform::new()),
            AgentIds {
                search: "search".to_string(),
                scraper: "scraper".to_string(),
                message: None,
                inbox: None,
            },
            OrchestrationPolicy::default(),
            store.topics_path(),
        ));
        let scorer: Arc<dyn CandidateScorer> = Arc::new(StubScorer { scores: Vec::new() });
        let pipeline = Arc::new(Pipeline::new(store, engine.clone(), scorer.clone()));
        AppState {
            engine,
            scorer,
            notifier: Arc::new(RecordingNotifier::default()),
            pipeline,
        }
    }

    async fn send(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = build_router(state).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = send(test_state(&dir), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], json!("scout"));
    }

    #[tokio::test]
    async fn test_status_is_idle_and_uncached() {
        let dir = tempfile::tempdir().unwrap();
        let response = build_router(test_state(&dir))
            .oneshot(get("/status"))
            .await
            .unwrap();

        let cache = response.headers()[header::CACHE_CONTROL].to_str().unwrap();
        assert!(cache.contains("no-store"));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["stage"], json!("idle"));
    }

    #[tokio::test]
    async fn test_stage_without_prerequisite_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = send(
            test_state(&dir),
            post_json("/start-ranking", json!({ "role": "Rust Engineer" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
    }

    #[tokio::test]
    async fn test_stage_while_busy_is_409() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        state
            .pipeline
            .store()
            .write(Artifact::Sourced, &[json!({ "id": "a", "name": "A" })])
            .unwrap();
        let _guard = state.pipeline.try_begin().unwrap();

        let (status, _) = send(
            state,
            post_json("/start-ranking", json!({ "role": "Rust Engineer" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_empty_role_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (status, _) = send(
            test_state(&dir),
            post_json("/start-sourcing", json!({ "role": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_outputs_list_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = send(test_state(&dir), get("/deep-scraped")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "deep_scraped": [] }));
    }

    #[tokio::test]
    async fn test_generate_message_falls_back_for_unknown_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let (_, body) = send(
            test_state(&dir),
            get("/generate-message?candidate_id=nobody&role=Designer"),
        )
        .await;
        assert_eq!(
            body["message"],
            json!("Hi, I saw your profile for the Designer role and would love to chat!")
        );
    }

    #[tokio::test]
    async fn test_generate_message_quotes_first_strength() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let mut assessment = CandidateAssessment::fallback("ada", "Ada", "n/a");
        assessment.role_fit_analysis.strengths = vec!["compiler work".to_string()];
        state
            .pipeline
            .store()
            .write(Artifact::Results, &[assessment])
            .unwrap();

        let (_, body) = send(state, get("/generate-message?candidate_id=ada&role=Engineer")).await;
        assert_eq!(
            body["message"],
            json!("Hi! Your compiler work fits our Engineer role.")
        );
    }

    #[tokio::test]
    async fn test_outreach_without_message_job_is_502() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = send(
            test_state(&dir),
            post_json(
                "/send-outreach",
                json!({ "candidate_id": "https://linkedin.com/in/ada", "personalized_message": "Hi" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], json!("UPSTREAM_ERROR"));
    }

    #[tokio::test]
    async fn test_check_replies_without_inbox_job_finds_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = send(test_state(&dir), post_json("/check-replies", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["replies_found"], json!(0));
    }
}
