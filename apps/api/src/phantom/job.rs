//! Job-level data: what we submit, the handle we get back, and what the
//! platform tells us about it.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Argument key carrying the operator's platform session.
pub const SESSION_COOKIE: &str = "sessionCookie";

/// How hard the launcher may try to submit a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Retry transient submission failures per the launch policy.
    BestEffort,
    /// Submit once. Used where a duplicate run has visible side effects (messages).
    SingleShot,
}

/// An immutable description of one remote job run.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub request_id: Uuid,
    pub agent_id: String,
    pub argument: Map<String, Value>,
    pub required_keys: Vec<&'static str>,
    pub delivery: Delivery,
}

impl JobRequest {
    pub fn new(agent_id: impl Into<String>, argument: Map<String, Value>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            argument,
            required_keys: Vec::new(),
            delivery: Delivery::BestEffort,
        }
    }

    pub fn require(mut self, key: &'static str) -> Self {
        self.required_keys.push(key);
        self
    }

    pub fn single_shot(mut self) -> Self {
        self.delivery = Delivery::SingleShot;
        self
    }

    /// Required keys absent (or blank) in the argument map.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        self.required_keys
            .iter()
            .copied()
            .filter(|key| match self.argument.get(*key) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            })
            .collect()
    }
}

/// Opaque handle to one in-flight container. Not `Clone`: the retriever
/// consumes it, after which it is gone.
#[derive(Debug)]
pub struct JobHandle {
    pub container_id: String,
    pub agent_id: String,
    pub launched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Finished,
    Errored,
    Unknown(String),
}

/// One status sample for a container, as reported by the platform.
#[derive(Debug, Clone, Default)]
pub struct ContainerState {
    pub status: String,
    pub exit_code: Option<i64>,
    pub exit_message: Option<String>,
    pub raw: Value,
}

impl ContainerState {
    pub fn from_value(raw: Value) -> Self {
        let status = raw
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let exit_code = raw.get("exitCode").and_then(Value::as_i64);
        let exit_message = raw
            .get("exitMessage")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(String::from);
        Self {
            status,
            exit_code,
            exit_message,
            raw,
        }
    }

    pub fn job_status(&self) -> JobStatus {
        match self.status.trim().to_lowercase().as_str() {
            "running" | "starting" | "queued" | "launching" => JobStatus::Running,
            "finished" | "success" | "done" => match self.exit_code {
                Some(code) if code != 0 => JobStatus::Errored,
                _ => JobStatus::Finished,
            },
            "error" | "errored" | "failed" | "aborted" | "timeout" => JobStatus::Errored,
            _ => JobStatus::Unknown(self.status.clone()),
        }
    }
}

/// What the platform knows about a job target (agent).
#[derive(Debug, Clone, Default)]
pub struct AgentMetadata {
    /// The agent's stored launch argument, echoed back.
    pub argument: Map<String, Value>,
    /// Result payload embedded directly in the metadata, if any.
    pub result_object: Option<Value>,
    pub org_s3_folder: Option<String>,
    pub s3_folder: Option<String>,
}

impl AgentMetadata {
    pub fn from_value(raw: &Value) -> Self {
        // The stored argument arrives either as an object or as a JSON string.
        let argument = match raw.get("argument") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            },
            _ => Map::new(),
        };
        let folder = |key: &str| {
            raw.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(String::from)
        };
        Self {
            argument,
            result_object: raw.get("resultObject").filter(|v| !v.is_null()).cloned(),
            org_s3_folder: folder("orgS3Folder"),
            s3_folder: folder("s3Folder"),
        }
    }

    /// Both storage path components, when the platform exposed them.
    pub fn storage_location(&self) -> Option<(&str, &str)> {
        match (&self.org_s3_folder, &self.s3_folder) {
            (Some(org), Some(agent)) => Some((org.as_str(), agent.as_str())),
            _ => None,
        }
    }
}
