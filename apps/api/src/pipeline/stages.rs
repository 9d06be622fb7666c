//! The four pipeline stages: source -> rank -> deep-scrape -> analyze.
//!
//! Each stage reads the previous stage's file, clears its own output and
//! everything downstream, runs, and reports through the status file. Only
//! one stage runs at a time, enforced by a busy flag rather than a lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use serde::Deserialize;
use tracing::{error, info};

use crate::models::assessment::CandidateAssessment;
use crate::models::candidate::CandidateProfile;
use crate::phantom::{OrchestrationError, SourcingEngine};
use crate::pipeline::store::{Artifact, PipelineStore};
use crate::scoring::{rank, CandidateScorer, ScoredCandidate};

/// Ranked candidates at or above this score are reported as strong.
pub const STRONG_SCORE: u8 = 80;

// ────────────────────────────────────────────────────────────────────────────
// Stage requests
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SourcingRequest {
    pub role: String,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_search_depth")]
    pub search_depth: usize,
}

fn default_location() -> String {
    "United States".to_string()
}

fn default_search_depth() -> usize {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct StageRequest {
    pub role: String,
    #[serde(default)]
    pub persona: Option<String>,
    /// Deep-scrape a single profile instead of the top ranked candidates.
    #[serde(default)]
    pub url: Option<String>,
}

impl StageRequest {
    fn persona(&self) -> Option<&str> {
        self.persona.as_deref().filter(|p| !p.trim().is_empty())
    }

    fn single_url(&self) -> Option<&str> {
        self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Clone)]
pub enum StageJob {
    Source(SourcingRequest),
    Rank(StageRequest),
    DeepScrape(StageRequest),
    Analyze(StageRequest),
}

impl StageJob {
    fn label(&self) -> &'static str {
        match self {
            StageJob::Source(_) => "Sourcing",
            StageJob::Rank(_) => "Ranking",
            StageJob::DeepScrape(_) => "Deep scrape",
            StageJob::Analyze(_) => "Analysis",
        }
    }

    /// Status written the moment the stage is accepted, so pollers never
    /// see the previous run's terminal state.
    fn initial_status(&self) -> (&'static str, String) {
        match self {
            StageJob::Source(req) => ("sourcing", format!("Initializing search for '{}'...", req.role)),
            StageJob::Rank(_) => ("ranking", "Initializing AI Ranking...".to_string()),
            StageJob::DeepScrape(_) => ("deep_scraping", "Initializing Deep Scrape...".to_string()),
            StageJob::Analyze(_) => ("analyzing", "Initializing Final Analysis...".to_string()),
        }
    }

    /// Input file that must exist before the stage may start.
    fn prerequisite(&self) -> Option<(Artifact, &'static str)> {
        match self {
            StageJob::Source(_) => None,
            StageJob::Rank(_) => Some((
                Artifact::Sourced,
                "No sourced candidates. Run Sourcing first.",
            )),
            StageJob::DeepScrape(req) if req.single_url().is_some() => None,
            StageJob::DeepScrape(_) => Some((
                Artifact::Ranked,
                "No ranked candidates. Run AI Ranking first.",
            )),
            StageJob::Analyze(_) => Some((
                Artifact::DeepScraped,
                "No deep-scraped candidates. Run Deep Profile Search first.",
            )),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum StartError {
    MissingPrerequisite(&'static str),
    Busy,
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

pub struct Pipeline {
    store: PipelineStore,
    engine: Arc<SourcingEngine>,
    scorer: Arc<dyn CandidateScorer>,
    busy: AtomicBool,
}

/// Clears the busy flag when the running stage ends, however it ends.
pub struct StageGuard {
    pipeline: Arc<Pipeline>,
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        self.pipeline.busy.store(false, Ordering::Release);
    }
}

impl Pipeline {
    pub fn new(
        store: PipelineStore,
        engine: Arc<SourcingEngine>,
        scorer: Arc<dyn CandidateScorer>,
    ) -> Self {
        Self {
            store,
            engine,
            scorer,
            busy: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &PipelineStore {
        &self.store
    }

    pub fn try_begin(self: &Arc<Self>) -> Option<StageGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| StageGuard {
                pipeline: Arc::clone(self),
            })
    }

    /// Validates and claims the pipeline, then runs `job` in the background.
    pub fn start(self: &Arc<Self>, job: StageJob) -> Result<(), StartError> {
        if let Some((artifact, message)) = job.prerequisite() {
            if !self.store.exists(artifact) {
                return Err(StartError::MissingPrerequisite(message));
            }
        }
        let guard = self.try_begin().ok_or(StartError::Busy)?;

        let (stage, message) = job.initial_status();
        self.store.set_status(stage, message);

        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            pipeline.run(job).await;
        });
        Ok(())
    }

    pub async fn run(&self, job: StageJob) {
        let label = job.label();
        info!("{label} stage started");
        let result = match job {
            StageJob::Source(req) => self.source(req).await,
            StageJob::Rank(req) => self.rank(req).await,
            StageJob::DeepScrape(req) => self.deep_scrape(req).await,
            StageJob::Analyze(req) => self.analyze(req).await,
        };
        if let Err(e) = result {
            error!("{label} stage failed: {e:#}");
            self.store.set_status("error", format!("{label} Failed: {e:#}"));
        }
    }

    fn halt(&self, e: OrchestrationError) {
        error!("Stage halted: {e}");
        let stage = if e.is_session_expired() {
            "session_expired"
        } else {
            "error"
        };
        self.store.set_status(stage, e.status_message());
    }

    async fn source(&self, req: SourcingRequest) -> Result<()> {
        self.store.clear_from(Artifact::Sourced)?;
        let cap = self.engine.policy().search_result_cap;
        self.store.set_status(
            "sourcing",
            format!(
                "Searching for '{}' in '{}' (top {cap})...",
                req.role, req.location
            ),
        );

        let outcome = match self
            .engine
            .search(&req.role, &req.location, req.search_depth)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.halt(e);
                return Ok(());
            }
        };

        self.store.write(Artifact::Sourced, &outcome.value)?;
        let message = if outcome.value.is_empty() {
            format!(
                "Sourcing complete, but NO candidates found for '{}'. {}",
                req.role, outcome.message
            )
        } else {
            format!(
                "Sourcing complete. {} candidates found. Click 'Start AI Ranking' to continue.",
                outcome.value.len()
            )
        };
        self.store.set_status("sourcing_done", message);
        Ok(())
    }

    async fn rank(&self, req: StageRequest) -> Result<()> {
        self.store.clear_from(Artifact::Ranked)?;
        let candidates: Vec<CandidateProfile> = self.store.read(Artifact::Sourced);
        info!("Loaded {} sourced candidates for ranking", candidates.len());
        self.store.set_status(
            "ranking",
            format!("AI is scoring {} candidates...", candidates.len()),
        );

        let ranked = self
            .scorer
            .score(candidates, &req.role, req.persona())
            .await?;
        self.store.write(Artifact::Ranked, &ranked)?;

        let strong = ranked.iter().filter(|c| c.ai_score >= STRONG_SCORE).count();
        self.store.set_status(
            "ranking_done",
            format!(
                "Ranking complete. {strong} candidates scored ≥{STRONG_SCORE}%. \
                 Click 'Start Deep Scrape' to continue."
            ),
        );
        Ok(())
    }

    async fn deep_scrape(&self, req: StageRequest) -> Result<()> {
        self.store.clear_from(Artifact::DeepScraped)?;

        let targets = match req.single_url() {
            Some(url) => {
                self.store
                    .set_status("deep_scraping", format!("Deep scraping profile: {url}..."));
                vec![CandidateProfile::from_url(url)]
            }
            None => {
                let cap = self.engine.policy().enrich_cap;
                let ranked: Vec<ScoredCandidate> = self.store.read(Artifact::Ranked);
                let top: Vec<CandidateProfile> = rank(ranked)
                    .into_iter()
                    .take(cap)
                    .map(|scored| scored.candidate)
                    .collect();
                if top.is_empty() {
                    self.store.set_status(
                        "error",
                        "No qualified candidates found. Nothing to deep scrape.",
                    );
                    return Ok(());
                }
                self.store.set_status(
                    "deep_scraping",
                    format!("Deep scraping top {} profiles...", top.len()),
                );
                top
            }
        };

        let outcome = match self.engine.enrich(targets).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.halt(e);
                return Ok(());
            }
        };
        self.store.write(Artifact::DeepScraped, &outcome.value)?;
        self.store.set_status(
            "deep_scrape_done",
            format!(
                "Deep scrape complete! {} Click 'AI Analyze' to continue.",
                outcome.message
            ),
        );
        Ok(())
    }

    async fn analyze(&self, req: StageRequest) -> Result<()> {
        self.store.clear_from(Artifact::Results)?;
        let candidates: Vec<CandidateProfile> = self.store.read(Artifact::DeepScraped);
        let total = candidates.len();

        let mut results: Vec<CandidateAssessment> = Vec::with_capacity(total);
        for (i, candidate) in candidates.iter().enumerate() {
            self.store.set_status(
                "analyzing",
                format!("Assessing {}/{total}: {}...", i + 1, candidate.name),
            );
            results.push(self.scorer.assess(candidate, &req.role, req.persona()).await);
        }

        self.store.write(Artifact::Results, &results)?;
        self.store.set_status(
            "done",
            format!("Analysis complete! {} candidates assessed.", results.len()),
        );
        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use async_trait::async_trait;

    use super::*;
    use crate::llm_client::LlmError;

    /// Deterministic scorer: a candidate's score is looked up by name.
    pub struct StubScorer {
        pub scores: Vec<(&'static str, u8)>,
    }

    #[async_trait]
    impl CandidateScorer for StubScorer {
        async fn score(
            &self,
            candidates: Vec<CandidateProfile>,
            _role: &str,
            _persona: Option<&str>,
        ) -> Result<Vec<ScoredCandidate>, LlmError> {
            let scored = candidates
                .into_iter()
                .map(|candidate| {
                    let ai_score = self
                        .scores
                        .iter()
                        .find(|(name, _)| *name == candidate.name)
                        .map_or(0, |(_, score)| *score);
                    ScoredCandidate {
                        candidate,
                        ai_score,
                    }
                })
                .collect();
            Ok(rank(scored))
        }

        async fn assess(
            &self,
            candidate: &CandidateProfile,
            _role: &str,
            _persona: Option<&str>,
        ) -> CandidateAssessment {
            CandidateAssessment {
                overall_score: 75,
                tier: 2,
                reasoning_summary: format!("{} looks solid.", candidate.name),
                ..CandidateAssessment::fallback(&candidate.id, &candidate.name, "stub")
            }
        }

        async fn draft_message(&self, role: &str, strength: &str) -> String {
            format!("Hi! Your {strength} fits our {role} role.")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StubScorer;
    use super::*;
    use crate::config::{AgentIds, OrchestrationPolicy};
    use crate::phantom::testing::{agent_with_session, errored, finished, CallKind, FakePlatform};
    use serde_json::{json, Value};

    fn pipeline(platform: FakePlatform, dir: &tempfile::TempDir) -> Arc<Pipeline> {
        let store = PipelineStore::new(dir.path());
        let engine = SourcingEngine::new(
            Arc::new(platform),
            AgentIds {
                search: "search".to_string(),
                scraper: "scraper".to_string(),
                message: None,
                inbox: None,
            },
            OrchestrationPolicy::default(),
            store.topics_path(),
        );
        let scorer = StubScorer {
            scores: vec![("Ada", 95), ("Linus", 85), ("Grace", 60), ("Ken", 20)],
        };
        Arc::new(Pipeline::new(store, Arc::new(engine), Arc::new(scorer)))
    }

    fn ready() -> FakePlatform {
        FakePlatform::new()
            .with_agent(agent_with_session())
            .with_statuses(vec![Ok(finished())])
    }

    fn request(url: Option<&str>) -> StageRequest {
        StageRequest {
            role: "Rust Engineer".to_string(),
            persona: None,
            url: url.map(String::from),
        }
    }

    fn seed_sourced(pipeline: &Pipeline) {
        let candidates: Vec<CandidateProfile> = ["Ken", "Ada", "Grace", "Linus"]
            .iter()
            .map(|name| {
                CandidateProfile::new(*name, Some(format!("https://linkedin.com/in/{name}")))
            })
            .collect();
        pipeline.store().write(Artifact::Sourced, &candidates).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_writes_candidates_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let platform = ready().with_artifacts(vec![Ok(json!([
            { "fullName": "Ada", "profileUrl": "https://linkedin.com/in/ada", "isOpenToWork": true, "timestamp": "2099-01-01T00:00:00Z" }
        ]))]);
        let pipeline = pipeline(platform, &dir);
        pipeline.store().write(Artifact::Results, &[json!({ "old": true })]).unwrap();

        pipeline
            .run(StageJob::Source(SourcingRequest {
                role: "Rust Engineer".to_string(),
                location: "Berlin".to_string(),
                search_depth: 10,
            }))
            .await;

        let sourced: Vec<CandidateProfile> = pipeline.store().read(Artifact::Sourced);
        assert_eq!(sourced.len(), 1);
        assert!(!pipeline.store().exists(Artifact::Results));
        assert_eq!(pipeline.store().status().stage, "sourcing_done");
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_session_expired_sets_distinct_status() {
        let dir = tempfile::tempdir().unwrap();
        let platform = FakePlatform::new()
            .with_agent(agent_with_session())
            .with_statuses(vec![Ok(errored("stopped"))])
            .with_console("Error: cookie-missing");
        let pipeline = pipeline(platform, &dir);

        pipeline
            .run(StageJob::Source(SourcingRequest {
                role: "r".to_string(),
                location: "l".to_string(),
                search_depth: 5,
            }))
            .await;

        let status = pipeline.store().status();
        assert_eq!(status.stage, "session_expired");
        assert!(status.message.contains("Refresh"));
        assert!(!pipeline.store().exists(Artifact::Sourced));
    }

    #[tokio::test]
    async fn test_rank_sorts_and_counts_strong_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(FakePlatform::new(), &dir);
        seed_sourced(&pipeline);

        pipeline.run(StageJob::Rank(request(None))).await;

        let ranked: Vec<ScoredCandidate> = pipeline.store().read(Artifact::Ranked);
        let names: Vec<&str> = ranked.iter().map(|r| r.candidate.name.as_str()).collect();
        assert_eq!(names, vec!["Ada", "Linus", "Grace", "Ken"]);
        let status = pipeline.store().status();
        assert_eq!(status.stage, "ranking_done");
        assert!(status.message.contains("2 candidates"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deep_scrape_takes_top_ranked_only() {
        let dir = tempfile::tempdir().unwrap();
        let platform = Arc::new(ready());
        let pipeline = {
            let store = PipelineStore::new(dir.path());
            let engine = SourcingEngine::new(
                platform.clone(),
                AgentIds {
                    search: "search".to_string(),
                    scraper: "scraper".to_string(),
                    message: None,
                    inbox: None,
                },
                OrchestrationPolicy::default(),
                store.topics_path(),
            );
            let scorer = StubScorer {
                scores: vec![("Ada", 95), ("Linus", 85), ("Grace", 60), ("Ken", 20)],
            };
            Arc::new(Pipeline::new(store, Arc::new(engine), Arc::new(scorer)))
        };
        seed_sourced(&pipeline);
        pipeline.run(StageJob::Rank(request(None))).await;

        pipeline.run(StageJob::DeepScrape(request(None))).await;

        let scraped: Vec<CandidateProfile> = pipeline.store().read(Artifact::DeepScraped);
        let names: Vec<&str> = scraped.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Ada", "Linus", "Grace"]);
        assert_eq!(platform.count(|k| matches!(k, CallKind::Launch { .. })), 3);
        assert_eq!(pipeline.store().status().stage, "deep_scrape_done");
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_url_deep_scrape_needs_no_ranking() {
        let dir = tempfile::tempdir().unwrap();
        let platform = ready().with_artifacts(vec![Ok(json!([
            { "fullName": "Grace Hopper", "profileUrl": "https://linkedin.com/in/grace" }
        ]))]);
        let pipeline = pipeline(platform, &dir);

        pipeline
            .run(StageJob::DeepScrape(request(Some("https://linkedin.com/in/grace"))))
            .await;

        let scraped: Vec<CandidateProfile> = pipeline.store().read(Artifact::DeepScraped);
        assert_eq!(scraped.len(), 1);
        assert_eq!(scraped[0].name, "Grace Hopper");
    }

    #[tokio::test]
    async fn test_analyze_assesses_every_deep_scraped_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(FakePlatform::new(), &dir);
        let candidates = vec![
            CandidateProfile::new("Ada", Some("https://linkedin.com/in/ada".to_string())),
            CandidateProfile::new("Linus", None),
        ];
        pipeline
            .store()
            .write(Artifact::DeepScraped, &candidates)
            .unwrap();

        pipeline.run(StageJob::Analyze(request(None))).await;

        let results: Vec<Value> = pipeline.store().read(Artifact::Results);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["candidate_id"], json!("https://linkedin.com/in/ada"));
        assert_eq!(pipeline.store().status().stage, "done");
    }

    #[tokio::test]
    async fn test_start_checks_prerequisite_and_busy_flag() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(FakePlatform::new(), &dir);

        assert_eq!(
            pipeline.start(StageJob::Rank(request(None))),
            Err(StartError::MissingPrerequisite(
                "No sourced candidates. Run Sourcing first."
            ))
        );

        seed_sourced(&pipeline);
        let guard = pipeline.try_begin().unwrap();
        assert_eq!(
            pipeline.start(StageJob::Rank(request(None))),
            Err(StartError::Busy)
        );
        drop(guard);
        assert!(pipeline.try_begin().is_some());
    }
}
