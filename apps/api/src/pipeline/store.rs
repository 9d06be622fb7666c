//! On-disk pipeline state: one JSON file per stage output plus a status file
//! the frontend polls.

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::json_file;

const STATUS_FILE: &str = "pipeline_status.json";
const TOPICS_FILE: &str = "topics.json";
const SEEN_REPLIES_FILE: &str = "seen_replies.json";

/// Stage outputs, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Artifact {
    Sourced,
    Ranked,
    DeepScraped,
    Results,
}

impl Artifact {
    pub const ALL: [Artifact; 4] = [
        Artifact::Sourced,
        Artifact::Ranked,
        Artifact::DeepScraped,
        Artifact::Results,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Artifact::Sourced => "sourced_candidates.json",
            Artifact::Ranked => "ranked_candidates.json",
            Artifact::DeepScraped => "deep_scraped_candidates.json",
            Artifact::Results => "results.json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    pub stage: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl PipelineStatus {
    pub fn idle() -> Self {
        Self {
            stage: "idle".to_string(),
            message: "No analysis running.".to_string(),
            timestamp: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineStore {
    dir: PathBuf,
}

impl PipelineStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }

    pub fn topics_path(&self) -> PathBuf {
        self.dir.join(TOPICS_FILE)
    }

    pub fn seen_replies_path(&self) -> PathBuf {
        self.dir.join(SEEN_REPLIES_FILE)
    }

    fn status_path(&self) -> PathBuf {
        self.dir.join(STATUS_FILE)
    }

    pub fn exists(&self, artifact: Artifact) -> bool {
        self.path(artifact).is_file()
    }

    /// Missing or unreadable files read as empty.
    pub fn read<T: DeserializeOwned>(&self, artifact: Artifact) -> Vec<T> {
        json_file::read_json(&self.path(artifact)).unwrap_or_default()
    }

    pub fn write<T: Serialize>(&self, artifact: Artifact, items: &[T]) -> Result<()> {
        json_file::write_json(&self.path(artifact), items)
    }

    /// Removes `from` and every later stage's output, so no stale results
    /// from an earlier run survive a rerun.
    pub fn clear_from(&self, from: Artifact) -> Result<()> {
        for artifact in Artifact::ALL.into_iter().filter(|a| *a >= from) {
            json_file::remove(&self.path(artifact))?;
        }
        Ok(())
    }

    pub fn status(&self) -> PipelineStatus {
        json_file::read_json(&self.status_path()).unwrap_or_else(PipelineStatus::idle)
    }

    /// Best effort: a status write failure is logged, never fatal.
    pub fn set_status(&self, stage: &str, message: impl Into<String>) {
        let status = PipelineStatus {
            stage: stage.to_string(),
            message: message.into(),
            timestamp: Some(Utc::now()),
        };
        if let Err(e) = json_file::write_json(&self.status_path(), &status) {
            warn!("Could not write pipeline status: {e:#}");
        }
    }
}
