use serde::{Deserialize, Serialize};

/// Canonical candidate entity. Constructed only from a complete record, so
/// `id` is never empty: it is the profile URL, or the name when no URL exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub profile_url: Option<String>,
    #[serde(default)]
    pub about: Option<String>,
    /// Experience entries serialized as JSON text.
    #[serde(default)]
    pub experience_text: Option<String>,
    #[serde(default)]
    pub education_text: Option<String>,
    #[serde(default)]
    pub is_open_to_work: bool,
}

/// Name used for a candidate known only by URL.
pub const UNKNOWN_NAME: &str = "Unknown";

impl CandidateProfile {
    pub fn new(name: impl Into<String>, profile_url: Option<String>) -> Self {
        let name = name.into();
        let profile_url = profile_url.filter(|u| !u.trim().is_empty());
        let id = profile_url.clone().unwrap_or_else(|| name.clone());
        Self {
            id,
            name,
            headline: None,
            location: None,
            profile_url,
            about: None,
            experience_text: None,
            education_text: None,
            is_open_to_work: false,
        }
    }

    /// A target known only by URL, before any enrichment.
    pub fn from_url(url: &str) -> Self {
        Self::new(UNKNOWN_NAME, Some(url.trim().to_string()))
    }

    /// Overlays an identity-verified enrichment result onto this pre-job profile.
    /// Fresh fields win when present; the id and URL are kept.
    pub fn absorb(self, fresh: CandidateProfile) -> CandidateProfile {
        let name = if self.name == UNKNOWN_NAME || self.name.trim().is_empty() {
            fresh.name
        } else {
            self.name
        };
        CandidateProfile {
            id: self.id,
            name,
            headline: fresh.headline.or(self.headline),
            location: fresh.location.or(self.location),
            profile_url: self.profile_url.or(fresh.profile_url),
            about: fresh.about.or(self.about),
            experience_text: fresh.experience_text.or(self.experience_text),
            education_text: fresh.education_text.or(self.education_text),
            is_open_to_work: fresh.is_open_to_work || self.is_open_to_work,
        }
    }
}

/// The most recent message in an inbox thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub id: String,
    pub text: String,
    pub from_me: bool,
    pub timestamp: Option<String>,
}

/// One inbox conversation as reported by the inbox job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread_id: String,
    pub full_name: String,
    pub profile_url: Option<String>,
    pub last_message: LastMessage,
}

impl ThreadSummary {
    pub fn is_inbound(&self) -> bool {
        !self.last_message.from_me
    }
}
