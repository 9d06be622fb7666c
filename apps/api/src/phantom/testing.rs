//! Scripted in-memory platform for exercising the engine without the network.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::time::Instant;

use crate::phantom::error::PlatformError;
use crate::phantom::job::{AgentMetadata, ContainerState};
use crate::phantom::platform::PhantomPlatform;

#[derive(Debug, Clone, PartialEq)]
pub enum CallKind {
    Launch {
        agent_id: String,
        argument: Map<String, Value>,
    },
    Status,
    FetchAgent,
    Console,
    Artifact {
        url: String,
    },
}

#[derive(Debug, Clone)]
pub struct Call {
    pub kind: CallKind,
    pub at: Instant,
}

#[derive(Default)]
struct Script {
    launches: VecDeque<Result<String, PlatformError>>,
    statuses: VecDeque<Result<ContainerState, PlatformError>>,
    sticky_status: Option<ContainerState>,
    agents: VecDeque<AgentMetadata>,
    agent_errors: VecDeque<PlatformError>,
    sticky_agent: AgentMetadata,
    console: String,
    artifacts: VecDeque<Result<Value, PlatformError>>,
    calls: Vec<Call>,
}

/// Each queue is consumed in order; once a queue is drained the fake falls
/// back to: a fresh container id, the last scripted status, the last agent
/// metadata, and a 404 artifact. Scripted metadata errors are returned before
/// any metadata.
#[derive(Default)]
pub struct FakePlatform {
    script: Mutex<Script>,
}

pub fn finished() -> ContainerState {
    ContainerState::from_value(json!({ "status": "finished", "exitCode": 0 }))
}

pub fn running() -> ContainerState {
    ContainerState::from_value(json!({ "status": "running" }))
}

pub fn errored(exit_message: &str) -> ContainerState {
    ContainerState::from_value(
        json!({ "status": "error", "exitCode": 1, "exitMessage": exit_message }),
    )
}

pub fn not_found() -> PlatformError {
    PlatformError::Status {
        status: 404,
        body: "NoSuchKey".to_string(),
    }
}

pub fn unavailable() -> PlatformError {
    PlatformError::Status {
        status: 503,
        body: "Service Unavailable".to_string(),
    }
}

/// Agent metadata with a session cookie and both storage folders.
pub fn agent_with_session() -> AgentMetadata {
    let mut argument = Map::new();
    argument.insert("sessionCookie".to_string(), json!("cookie"));
    AgentMetadata {
        argument,
        result_object: None,
        org_s3_folder: Some("org".to_string()),
        s3_folder: Some("agent".to_string()),
    }
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_launches(self, launches: Vec<Result<String, PlatformError>>) -> Self {
        self.script.lock().unwrap().launches = launches.into();
        self
    }

    pub fn with_statuses(self, statuses: Vec<Result<ContainerState, PlatformError>>) -> Self {
        {
            let mut script = self.script.lock().unwrap();
            script.sticky_status = statuses
                .iter()
                .rev()
                .find_map(|s| s.as_ref().ok().cloned());
            script.statuses = statuses.into();
        }
        self
    }

    pub fn with_agent(self, agent: AgentMetadata) -> Self {
        {
            let mut script = self.script.lock().unwrap();
            script.sticky_agent = agent.clone();
            script.agents = VecDeque::from(vec![agent]);
        }
        self
    }

    pub fn with_agent_errors(self, errors: Vec<PlatformError>) -> Self {
        self.script.lock().unwrap().agent_errors = errors.into();
        self
    }

    pub fn with_console(self, console: &str) -> Self {
        self.script.lock().unwrap().console = console.to_string();
        self
    }

    pub fn with_artifacts(self, artifacts: Vec<Result<Value, PlatformError>>) -> Self {
        self.script.lock().unwrap().artifacts = artifacts.into();
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn count(&self, matches: impl Fn(&CallKind) -> bool) -> usize {
        self.calls().iter().filter(|c| matches(&c.kind)).count()
    }

    fn record(&self, kind: CallKind) {
        self.script.lock().unwrap().calls.push(Call {
            kind,
            at: Instant::now(),
        });
    }
}

#[async_trait]
impl PhantomPlatform for FakePlatform {
    async fn launch(
        &self,
        agent_id: &str,
        argument: &Map<String, Value>,
    ) -> Result<String, PlatformError> {
        self.record(CallKind::Launch {
            agent_id: agent_id.to_string(),
            argument: argument.clone(),
        });
        let mut script = self.script.lock().unwrap();
        let n = script.calls.len();
        script
            .launches
            .pop_front()
            .unwrap_or_else(|| Ok(format!("container-{n}")))
    }

    async fn status(&self, _container_id: &str) -> Result<ContainerState, PlatformError> {
        self.record(CallKind::Status);
        let mut script = self.script.lock().unwrap();
        match script.statuses.pop_front() {
            Some(next) => next,
            None => Ok(script.sticky_status.clone().unwrap_or_else(running)),
        }
    }

    async fn fetch_agent(&self, _agent_id: &str) -> Result<AgentMetadata, PlatformError> {
        self.record(CallKind::FetchAgent);
        let mut script = self.script.lock().unwrap();
        if let Some(e) = script.agent_errors.pop_front() {
            return Err(e);
        }
        let sticky = script.sticky_agent.clone();
        Ok(script.agents.pop_front().unwrap_or(sticky))
    }

    async fn fetch_console(&self, _container_id: &str) -> Result<String, PlatformError> {
        self.record(CallKind::Console);
        Ok(self.script.lock().unwrap().console.clone())
    }

    async fn fetch_artifact(&self, url: &str) -> Result<Value, PlatformError> {
        self.record(CallKind::Artifact {
            url: url.to_string(),
        });
        self.script
            .lock()
            .unwrap()
            .artifacts
            .pop_front()
            .unwrap_or_else(|| Err(not_found()))
    }
}
