//! Sourcing engine: the caller-facing surface over the job lifecycle.
//!
//! Each operation runs `launch -> await -> fetch -> reconcile` for one job
//! target, one job at a time. Runs against the same agent are serialized,
//! since they share one result artifact. Failures become an empty `Outcome` with a
//! status message; only `SessionExpired` escapes as an error, because every
//! further job would fail the same way until credentials are refreshed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::config::{AgentIds, OrchestrationPolicy};
use crate::models::candidate::{CandidateProfile, ThreadSummary};
use crate::phantom::error::OrchestrationError;
use crate::phantom::job::{JobHandle, JobRequest, SESSION_COOKIE};
use crate::phantom::launcher::launch;
use crate::phantom::platform::PhantomPlatform;
use crate::phantom::probes::OpenToWorkClassifier;
use crate::phantom::reconciler::{reconcile, ReconcileMode};
use crate::phantom::replies::threads_from_payload;
use crate::phantom::retriever::{fetch_results, RawResultPayload};
use crate::phantom::retry::retry;
use crate::phantom::topics::{SearchTopicTracker, TopicKey};
use crate::phantom::waiter::await_job;

/// Result of one engine operation plus an operator-facing status line.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub message: String,
}

impl<T> Outcome<T> {
    fn new(value: T, message: impl Into<String>) -> Self {
        Self {
            value,
            message: message.into(),
        }
    }
}

pub struct SourcingEngine {
    platform: Arc<dyn PhantomPlatform>,
    agents: AgentIds,
    policy: OrchestrationPolicy,
    classifier: OpenToWorkClassifier,
    topics_path: PathBuf,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SourcingEngine {
    pub fn new(
        platform: Arc<dyn PhantomPlatform>,
        agents: AgentIds,
        policy: OrchestrationPolicy,
        topics_path: impl Into<PathBuf>,
    ) -> Self {
        let classifier = policy.classifier();
        Self {
            platform,
            agents,
            policy,
            classifier,
            topics_path: topics_path.into(),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &OrchestrationPolicy {
        &self.policy
    }

    /// Runs one search job. `limit` is clamped to the configured result cap.
    pub async fn search(
        &self,
        role: &str,
        location: &str,
        limit: usize,
    ) -> Result<Outcome<Vec<CandidateProfile>>, OrchestrationError> {
        let limit = limit.clamp(1, self.policy.search_result_cap.max(1));
        let key = TopicKey::new(role, location);
        let mut topics = SearchTopicTracker::load(&self.topics_path);
        if let Some(history) = topics.history(&key) {
            info!("Topic '{key}' last searched at {}", history.last_run);
        }
        let cutoff = topics.cutoff_for(&key, Utc::now());

        info!("Searching '{role}' in '{location}' (limit {limit}, fresh since {cutoff})");
        let result = self.search_job(role, location, limit, cutoff).await;
        if result.is_ok() {
            topics.record(&key, Utc::now());
        }
        settle("search", result)
    }

    async fn search_job(
        &self,
        role: &str,
        location: &str,
        limit: usize,
        cutoff: DateTime<Utc>,
    ) -> Result<Outcome<Vec<CandidateProfile>>, OrchestrationError> {
        let mut argument = self.stored_argument(&self.agents.search).await?;
        argument.insert(
            "search".to_string(),
            json!(format!("{} {}", role.trim(), location.trim()).trim()),
        );
        argument.insert("numberOfProfiles".to_string(), json!(limit));
        argument.insert("numberOfResultsPerSearch".to_string(), json!(limit));

        let request = JobRequest::new(&self.agents.search, argument).require(SESSION_COOKIE);
        let payload = self.run_job(request).await?;
        let received = payload.len();

        let mode = ReconcileMode::Search {
            min_freshness: self.policy.freshness_filter.then_some(cutoff),
            require_open_to_work: self.policy.require_open_to_work,
            max_results: Some(limit),
        };
        let mut reconciled = reconcile(payload, mode, &self.classifier);
        let candidates: Vec<CandidateProfile> = reconciled.by_ref().collect();
        let stats = reconciled.stats();
        info!(
            "Search kept {} of {received} records (malformed {}, stale {}, not open to work {})",
            candidates.len(),
            stats.malformed,
            stats.stale,
            stats.not_open_to_work
        );

        let message = if candidates.is_empty() {
            format!(
                "Search returned {received} records but none qualified ({} dropped).",
                stats.dropped()
            )
        } else {
            format!("Found {} candidates.", candidates.len())
        };
        Ok(Outcome::new(candidates, message))
    }

    /// Deep-scrapes each candidate that has a profile URL, one job per
    /// candidate, and merges the identity-verified record onto it. A
    /// candidate whose scrape fails keeps its pre-job profile.
    pub async fn enrich(
        &self,
        candidates: Vec<CandidateProfile>,
    ) -> Result<Outcome<Vec<CandidateProfile>>, OrchestrationError> {
        let total = candidates.len();
        let mut enriched = Vec::with_capacity(total);
        let mut verified = 0usize;

        for candidate in candidates {
            let Some(url) = candidate.profile_url.clone() else {
                enriched.push(candidate);
                continue;
            };
            match self.scrape_profile(&url).await {
                Ok(fresh) => {
                    verified += 1;
                    enriched.push(candidate.absorb(fresh));
                }
                Err(OrchestrationError::SessionExpired) => {
                    return Err(OrchestrationError::SessionExpired)
                }
                Err(e) => {
                    warn!("Keeping unenriched profile for {url}: {e}");
                    enriched.push(candidate);
                }
            }
        }

        info!("Enriched {verified} of {total} candidates");
        Ok(Outcome::new(
            enriched,
            format!("Deep-scraped {verified} of {total} candidates."),
        ))
    }

    async fn scrape_profile(&self, url: &str) -> Result<CandidateProfile, OrchestrationError> {
        let mut argument = self.stored_argument(&self.agents.scraper).await?;
        argument.insert("spreadsheetUrl".to_string(), json!(url));
        argument.insert("numberOfAddsPerLaunch".to_string(), json!(1));

        let request = JobRequest::new(&self.agents.scraper, argument).require(SESSION_COOKIE);
        let payload = self.run_job(request).await?;

        let mode = ReconcileMode::SingleTarget {
            target_url: url.to_string(),
        };
        let mut reconciled = reconcile(payload, mode, &self.classifier);
        let profile = reconciled.next();
        let stats = reconciled.stats();
        if stats.identity_mismatch > 0 {
            info!(
                "Discarded {} stale records while scraping {url}",
                stats.identity_mismatch
            );
        }
        profile.ok_or_else(|| OrchestrationError::IdentityMismatch(url.to_string()))
    }

    /// Sends one message. Submitted exactly once; `value` is true only when
    /// the message job finished cleanly.
    pub async fn outreach(
        &self,
        target_url: &str,
        text: &str,
    ) -> Result<Outcome<bool>, OrchestrationError> {
        let Some(agent_id) = self.agents.message.as_deref() else {
            return Ok(Outcome::new(false, "No message job is configured."));
        };

        let result = async {
            let mut argument = self.stored_argument(agent_id).await?;
            argument.insert("spreadsheetUrl".to_string(), json!(target_url));
            argument.insert("message".to_string(), json!(text));

            let request = JobRequest::new(agent_id, argument)
                .require(SESSION_COOKIE)
                .single_shot();
            let _claim = self.claim(agent_id).await;
            self.execute(&request).await?;
            info!("Message delivered to {target_url}");
            Ok::<_, OrchestrationError>(Outcome::new(
                true,
                format!("Message sent to {target_url}."),
            ))
        }
        .await;
        settle("outreach", result)
    }

    /// Runs the inbox job once and returns every thread it reported.
    pub async fn check_replies(&self) -> Result<Outcome<Vec<ThreadSummary>>, OrchestrationError> {
        let Some(agent_id) = self.agents.inbox.as_deref() else {
            return Ok(Outcome::new(Vec::new(), "No inbox job is configured."));
        };

        let result = async {
            let argument = self.stored_argument(agent_id).await?;
            let request = JobRequest::new(agent_id, argument).require(SESSION_COOKIE);
            let threads = threads_from_payload(self.run_job(request).await?);
            let message = format!("Inbox reported {} threads.", threads.len());
            Ok::<_, OrchestrationError>(Outcome::new(threads, message))
        }
        .await;
        settle("reply check", result)
    }

    /// The agent's stored launch argument, which carries the session cookie.
    async fn stored_argument(
        &self,
        agent_id: &str,
    ) -> Result<Map<String, Value>, OrchestrationError> {
        let platform = self.platform.as_ref();
        let label = format!("fetch stored argument of {agent_id}");
        retry(self.policy.artifact_policy(), &label, move |_| {
            platform.fetch_agent(agent_id)
        })
        .await
        .map(|metadata| metadata.argument)
        .map_err(|e| {
            OrchestrationError::LaunchRejected(format!(
                "could not read the stored argument of {agent_id}: {}",
                e.into_inner()
            ))
        })
    }

    async fn execute(&self, request: &JobRequest) -> Result<JobHandle, OrchestrationError> {
        let platform = self.platform.as_ref();
        let handle = launch(platform, request, self.policy.launch_policy()).await?;
        await_job(platform, &handle, &self.policy.wait_policy()).await?;
        Ok(handle)
    }

    /// Waits until no other job is running on `agent_id`; the agent stays
    /// claimed until the guard drops.
    async fn claim(&self, agent_id: &str) -> OwnedMutexGuard<()> {
        let slot = self
            .in_flight
            .lock()
            .await
            .entry(agent_id.to_string())
            .or_default()
            .clone();
        if let Ok(guard) = slot.clone().try_lock_owned() {
            return guard;
        }
        debug!("Agent {agent_id} is busy; waiting for its current job");
        slot.lock_owned().await
    }

    async fn run_job(&self, request: JobRequest) -> Result<RawResultPayload, OrchestrationError> {
        let _claim = self.claim(&request.agent_id).await;
        let handle = self.execute(&request).await?;
        fetch_results(self.platform.as_ref(), handle, self.policy.artifact_policy())
            .await
            .ok_or(OrchestrationError::RetrievalExhausted)
    }
}

/// Folds every failure except `SessionExpired` into an empty outcome.
fn settle<T: Default>(
    operation: &str,
    result: Result<Outcome<T>, OrchestrationError>,
) -> Result<Outcome<T>, OrchestrationError> {
    match result {
        Ok(outcome) => Ok(outcome),
        Err(OrchestrationError::SessionExpired) => {
            warn!("{operation} halted: platform session expired");
            Err(OrchestrationError::SessionExpired)
        }
        Err(e) => {
            warn!("{operation} produced no results: {e}");
            Ok(Outcome::new(T::default(), e.status_message()))
        }
    }
}
