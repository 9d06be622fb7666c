//! Candidate Scoring: pluggable, trait-based LLM collaborator.
//!
//! Two passes: a cheap batch score over search snippets (to pick who gets a
//! deep scrape) and a full structured assessment per deep-scraped profile.
//! Failures here never touch orchestration state; the worst case is a zero
//! score or a fallback assessment.
//!
//! `AppState` holds an `Arc<dyn CandidateScorer>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::llm_client::LlmError;
use crate::models::assessment::CandidateAssessment;
use crate::models::candidate::CandidateProfile;

pub mod llm;
pub mod prompts;

pub use llm::LlmCandidateScorer;

/// A candidate with its quick-filter score, stored flat in the ranked file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub candidate: CandidateProfile,
    #[serde(default)]
    pub ai_score: u8,
}

#[async_trait]
pub trait CandidateScorer: Send + Sync {
    /// Scores every candidate 0–100 and returns them best first.
    /// Fails only when the scorer cannot run at all.
    async fn score(
        &self,
        candidates: Vec<CandidateProfile>,
        role: &str,
        persona: Option<&str>,
    ) -> Result<Vec<ScoredCandidate>, LlmError>;

    /// Never fails: errors yield `CandidateAssessment::fallback`.
    async fn assess(
        &self,
        candidate: &CandidateProfile,
        role: &str,
        persona: Option<&str>,
    ) -> CandidateAssessment;

    /// A short outreach message; falls back to a fixed template.
    async fn draft_message(&self, role: &str, strength: &str) -> String;
}

/// Best first. Equal scores keep their input order.
pub fn rank(mut scored: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
    scored.sort_by(|a, b| b.ai_score.cmp(&a.ai_score));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scored_candidate_is_flat_on_disk() {
        let scored = ScoredCandidate {
            candidate: CandidateProfile::new("Ada", Some("https://linkedin.com/in/ada".to_string())),
            ai_score: 91,
        };
        let value = serde_json::to_value(&scored).unwrap();
        assert_eq!(value["name"], json!("Ada"));
        assert_eq!(value["ai_score"], json!(91));

        let back: ScoredCandidate = serde_json::from_value(value).unwrap();
        assert_eq!(back, scored);
    }

    #[test]
    fn test_rank_is_descending_and_stable() {
        let scored = |name: &str, ai_score| ScoredCandidate {
            candidate: CandidateProfile::new(name, None),
            ai_score,
        };
        let ranked = rank(vec![scored("a", 40), scored("b", 90), scored("c", 40)]);
        let names: Vec<&str> = ranked.iter().map(|s| s.candidate.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }
}
