//! Result Retriever: pulls a finished job's output through an ordered chain
//! of channels, stopping at the first that yields a payload.
//!
//! 1. inline: the result object embedded in the agent metadata
//! 2. artifact: the durable `result.json`, cache-busted, with bounded retries
//!
//! `None` means both channels came up empty. Callers treat it as an empty
//! round, not a failure of the pipeline.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::phantom::error::PlatformError;
use crate::phantom::job::JobHandle;
use crate::phantom::platform::{artifact_url, PhantomPlatform};
use crate::phantom::retry::{retry, RetryPolicy};

/// Heterogeneous records exactly as the job emitted them.
pub type RawResultPayload = Vec<Value>;

/// Consumes `handle`: once results are fetched (or not) it is never reused.
pub async fn fetch_results(
    platform: &dyn PhantomPlatform,
    handle: JobHandle,
    artifact_policy: RetryPolicy,
) -> Option<RawResultPayload> {
    let agent_id = handle.agent_id.as_str();
    let label = format!("metadata fetch for agent {agent_id}");
    let fetched = retry(artifact_policy, &label, move |_| platform.fetch_agent(agent_id)).await;
    let metadata = match fetched {
        Ok(metadata) => metadata,
        Err(e) => {
            warn!(
                "Could not fetch metadata for agent {} after container {}: {e}",
                handle.agent_id, handle.container_id
            );
            return None;
        }
    };

    if let Some(payload) = metadata.result_object.clone().and_then(payload_from_value) {
        if !payload.is_empty() {
            info!(
                "Retrieved {} records inline for container {}",
                payload.len(),
                handle.container_id
            );
            return Some(payload);
        }
    }
    debug!(
        "No inline result for container {}; trying durable artifact",
        handle.container_id
    );

    let Some((org, agent)) = metadata.storage_location() else {
        warn!(
            "Agent {} exposes no storage location; no results for container {}",
            handle.agent_id, handle.container_id
        );
        return None;
    };

    let label = format!("artifact fetch for container {}", handle.container_id);
    let fetched = retry(artifact_policy, &label, move |attempt| async move {
        let body = match platform.fetch_artifact(&artifact_url(org, agent)).await {
            Ok(body) => body,
            Err(e) if e.is_not_found() => {
                debug!("Artifact not in storage yet (attempt {attempt})");
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        payload_from_value(body)
            .ok_or_else(|| PlatformError::Decode("artifact is not a record list".to_string()))
    })
    .await;

    match fetched {
        Ok(payload) => {
            info!(
                "Retrieved {} records from artifact for container {}",
                payload.len(),
                handle.container_id
            );
            Some(payload)
        }
        Err(e) => {
            warn!(
                "All result channels failed for container {}: {e}",
                handle.container_id
            );
            None
        }
    }
}

/// Normalizes the shapes a result payload arrives in: a JSON string, a list
/// of records, an envelope object holding the list, or a single record.
pub fn payload_from_value(value: Value) -> Option<RawResultPayload> {
    match value {
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            serde_json::from_str::<Value>(text)
                .ok()
                .filter(|parsed| !parsed.is_string())
                .and_then(payload_from_value)
        }
        Value::Array(records) => Some(records),
        Value::Object(mut map) => {
            for key in ["data", "results", "items"] {
                if let Some(Value::Array(_)) = map.get(key) {
                    if let Some(Value::Array(records)) = map.remove(key) {
                        return Some(records);
                    }
                }
            }
            if map.is_empty() {
                None
            } else {
                Some(vec![Value::Object(map)])
            }
        }
        _ => None,
    }
}
