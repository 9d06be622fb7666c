//! Structured LLM assessment output.
//!
//! Model replies drift from the requested schema: lists come back as comma
//! separated strings or lists of objects, free text as nested JSON, scores as
//! strings. The `lenient` deserializers accept all of those.

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Output data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RecommendedAction {
    Shortlist,
    #[default]
    Review,
    Hold,
    Reject,
}

impl RecommendedAction {
    /// Case-insensitive; anything unrecognized means a human should look.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "shortlist" => Self::Shortlist,
            "hold" => Self::Hold,
            "reject" => Self::Reject,
            _ => Self::Review,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RoleFitScore {
    #[serde(default, deserialize_with = "lenient::score")]
    pub score: u8, // 0 – 100
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub strengths: Vec<String>,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub gaps: Vec<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub evidence: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub explanation: Option<String>,
}

/// Deep assessment of one candidate against a role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateAssessment {
    #[serde(default)]
    pub candidate_id: String,
    #[serde(default)]
    pub candidate_name: String,
    #[serde(default, deserialize_with = "lenient::score")]
    pub overall_score: u8, // 0 – 100
    #[serde(default = "lowest_tier", deserialize_with = "lenient::tier")]
    pub tier: u8, // 1 = best, 3 = mismatch
    #[serde(default, deserialize_with = "lenient::action")]
    pub recommended_action: RecommendedAction,
    #[serde(default)]
    pub role_fit_analysis: RoleFitScore,
    #[serde(default, deserialize_with = "lenient::required_text")]
    pub reasoning_summary: String,
    #[serde(default, deserialize_with = "lenient::string_list")]
    pub risk_flags: Vec<String>,
    #[serde(default)]
    pub model_used: String,
}

fn lowest_tier() -> u8 {
    3
}

impl CandidateAssessment {
    /// Stand-in used when the model call or its reply fails, so one bad
    /// candidate never stops an analysis run.
    pub fn fallback(candidate_id: &str, candidate_name: &str, error: &str) -> Self {
        let error: String = error.chars().take(100).collect();
        Self {
            candidate_id: candidate_id.to_string(),
            candidate_name: candidate_name.to_string(),
            overall_score: 0,
            tier: 3,
            recommended_action: RecommendedAction::Review,
            role_fit_analysis: RoleFitScore {
                score: 0,
                strengths: Vec::new(),
                gaps: vec!["AI Analysis Failed".to_string()],
                evidence: Some(format!("Error: {error}")),
                explanation: Some("Automated assessment encountered an error.".to_string()),
            },
            reasoning_summary: "AI Assessment failed due to technical error. Please review manually."
                .to_string(),
            risk_flags: vec!["AI Error".to_string()],
            model_used: String::new(),
        }
    }
}

mod lenient {
    use serde::de::{Deserializer, Error};
    use serde::Deserialize;
    use serde_json::Value;

    use super::RecommendedAction;

    fn number(value: &Value) -> Option<f64> {
        match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
            _ => None,
        }
    }

    pub fn score<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
        let value = Value::deserialize(d)?;
        if value.is_null() {
            return Ok(0);
        }
        number(&value)
            .map(|n| n.round().clamp(0.0, 100.0) as u8)
            .ok_or_else(|| D::Error::custom(format!("expected a 0-100 score, got {value}")))
    }

    pub fn tier<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(number(&value)
            .map(|n| n.round().clamp(1.0, 3.0) as u8)
            .unwrap_or(3))
    }

    pub fn action<'de, D: Deserializer<'de>>(d: D) -> Result<RecommendedAction, D::Error> {
        let value = Value::deserialize(d)?;
        Ok(value
            .as_str()
            .map(RecommendedAction::parse)
            .unwrap_or_default())
    }

    fn render(value: Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            structured @ (Value::Array(_) | Value::Object(_)) => {
                serde_json::to_string_pretty(&structured).ok()
            }
            other => Some(other.to_string()),
        }
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(render(Value::deserialize(d)?))
    }

    pub fn required_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(render(Value::deserialize(d)?).unwrap_or_default())
    }

    fn split(s: &str) -> Vec<String> {
        s.split([',', ';', '\n'])
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect()
    }

    fn item_text(item: Value) -> String {
        match item {
            Value::String(s) => s,
            Value::Object(map) => ["requirement", "value", "item"]
                .iter()
                .find_map(|key| map.get(*key).cloned())
                .or_else(|| map.values().next().cloned())
                .map(|v| match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .unwrap_or_default(),
            other => other.to_string(),
        }
    }

    pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Null => Vec::new(),
            Value::Array(items) => items
                .into_iter()
                .map(item_text)
                .filter(|s| !s.trim().is_empty())
                .collect(),
            Value::String(s) => split(&s),
            other => vec![item_text(other)],
        })
    }
}
