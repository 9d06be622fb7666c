//! LLM-backed scorer over the OpenAI-compatible client.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::llm_client::prompts::JSON_ONLY_SYSTEM;
use crate::llm_client::{LlmClient, LlmError};
use crate::models::assessment::CandidateAssessment;
use crate::models::candidate::CandidateProfile;
use crate::scoring::prompts::{
    assess_prompt, fallback_message, outreach_prompt, rank_prompt, RANK_SYSTEM,
};
use crate::scoring::{rank, CandidateScorer, ScoredCandidate};

/// Candidates per quick-filter prompt.
pub const BATCH_SIZE: usize = 20;

pub struct LlmCandidateScorer {
    llm: LlmClient,
}

impl LlmCandidateScorer {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl CandidateScorer for LlmCandidateScorer {
    async fn score(
        &self,
        candidates: Vec<CandidateProfile>,
        role: &str,
        persona: Option<&str>,
    ) -> Result<Vec<ScoredCandidate>, LlmError> {
        if !self.llm.is_configured() {
            return Err(LlmError::NotConfigured);
        }
        info!("AI filtering {} candidates for '{role}'", candidates.len());

        let mut scored = Vec::with_capacity(candidates.len());
        for batch in candidates.chunks(BATCH_SIZE) {
            let scores = match self
                .llm
                .call_text(&rank_prompt(role, persona, batch), Some(RANK_SYSTEM))
                .await
            {
                Ok(reply) => parse_scores(&reply, batch.len()),
                Err(e) => {
                    warn!("Scoring batch of {} failed: {e}", batch.len());
                    vec![0; batch.len()]
                }
            };
            scored.extend(batch.iter().cloned().zip(scores).map(|(candidate, ai_score)| {
                ScoredCandidate {
                    candidate,
                    ai_score,
                }
            }));
        }
        Ok(rank(scored))
    }

    async fn assess(
        &self,
        candidate: &CandidateProfile,
        role: &str,
        persona: Option<&str>,
    ) -> CandidateAssessment {
        let prompt = assess_prompt(candidate, role, persona);
        match self
            .llm
            .call_json::<CandidateAssessment>(&prompt, JSON_ONLY_SYSTEM)
            .await
        {
            Ok(mut assessment) => {
                // The model may echo a different id or none at all.
                assessment.candidate_id = candidate.id.clone();
                if assessment.candidate_name.trim().is_empty() {
                    assessment.candidate_name = candidate.name.clone();
                }
                assessment.model_used = self.llm.model().to_string();
                assessment
            }
            Err(e) => {
                warn!("Assessment of {} failed: {e}", candidate.name);
                CandidateAssessment::fallback(&candidate.id, &candidate.name, &e.to_string())
            }
        }
    }

    async fn draft_message(&self, role: &str, strength: &str) -> String {
        match self.llm.call_text(&outreach_prompt(role, strength), None).await {
            Ok(message) => message.trim_matches('"').to_string(),
            Err(e) => {
                warn!("Message drafting failed: {e}");
                fallback_message(role)
            }
        }
    }
}

/// Reads one score per candidate from a model reply.
///
/// Prefers the first `[...]` span as JSON (numbers, or objects with a
/// `score`); otherwise takes every integer in the text. Missing scores are 0,
/// extras are ignored.
pub fn parse_scores(reply: &str, expected: usize) -> Vec<u8> {
    let listed = match (reply.find('['), reply.rfind(']')) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str::<Vec<Value>>(&reply[start..=end]).ok()
        }
        _ => None,
    };

    let mut scores: Vec<u8> = match listed {
        Some(items) => items.iter().map(score_of).collect(),
        None => reply
            .split(|c: char| !c.is_ascii_digit())
            .filter(|run| !run.is_empty())
            .map(|run| run.parse::<u64>().map_or(100, |n| n.min(100)) as u8)
            .collect(),
    };
    scores.resize(expected, 0);
    scores
}

fn score_of(item: &Value) -> u8 {
    let raw = match item {
        Value::Object(map) => map.get("score").and_then(Value::as_f64),
        other => other.as_f64(),
    };
    raw.map_or(0, |n| n.clamp(0.0, 100.0) as u8)
}
