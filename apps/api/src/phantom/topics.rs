//! Search Topic Tracker: remembers when each (role, location) topic was first
//! searched so repeated searches accumulate results instead of re-isolating.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::json_file;

/// Lowercase-normalized `role|location`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TopicKey(String);

impl TopicKey {
    pub fn new(role: &str, location: &str) -> Self {
        Self(format!(
            "{}|{}",
            role.trim().to_lowercase(),
            location.trim().to_lowercase()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicHistory {
    pub first_seen: DateTime<Utc>,
    pub last_run: DateTime<Utc>,
}

/// File-backed topic history. Persisted after every mutation.
#[derive(Debug)]
pub struct SearchTopicTracker {
    path: PathBuf,
    topics: BTreeMap<String, TopicHistory>,
}

impl SearchTopicTracker {
    /// Missing or corrupt state loads as empty history.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let topics = json_file::read_json(&path).unwrap_or_default();
        Self { path, topics }
    }

    pub fn history(&self, key: &TopicKey) -> Option<TopicHistory> {
        self.topics.get(key.as_str()).copied()
    }

    /// Freshness cutoff for a search launched at `launch_at`.
    ///
    /// A new topic is isolated to this run: the cutoff is `launch_at`, and
    /// that instant becomes its first-seen. A known topic returns its
    /// first-seen, whatever `launch_at` is.
    pub fn cutoff_for(&mut self, key: &TopicKey, launch_at: DateTime<Utc>) -> DateTime<Utc> {
        if let Some(history) = self.topics.get(key.as_str()) {
            return history.first_seen;
        }

        info!("New search topic '{key}'; isolating results to this run");
        self.topics.insert(
            key.as_str().to_string(),
            TopicHistory {
                first_seen: launch_at,
                last_run: launch_at,
            },
        );
        self.save();
        launch_at
    }

    /// Updates last-run. First-seen is never rewritten.
    pub fn record(&mut self, key: &TopicKey, run_at: DateTime<Utc>) {
        self.topics
            .entry(key.as_str().to_string())
            .and_modify(|history| history.last_run = run_at)
            .or_insert(TopicHistory {
                first_seen: run_at,
                last_run: run_at,
            });
        self.save();
    }

    fn save(&self) {
        if let Err(e) = json_file::write_json(&self.path, &self.topics) {
            warn!("Could not persist search topics to {}: {e:#}", self.path.display());
        }
    }
}
