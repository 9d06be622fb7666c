//! Job Launcher: submits a `JobRequest` and hands back a `JobHandle`.

use chrono::Utc;
use tracing::info;

use crate::phantom::error::OrchestrationError;
use crate::phantom::job::{Delivery, JobHandle, JobRequest};
use crate::phantom::platform::PhantomPlatform;
use crate::phantom::retry::{retry, RetryError, RetryPolicy};

/// Submits `request`, retrying transient failures per `policy` unless the
/// request is single-shot. An "invalid argument" response is never retried.
pub async fn launch(
    platform: &dyn PhantomPlatform,
    request: &JobRequest,
    policy: RetryPolicy,
) -> Result<JobHandle, OrchestrationError> {
    if request.agent_id.trim().is_empty() {
        return Err(OrchestrationError::LaunchRejected(
            "job target id is empty".to_string(),
        ));
    }

    let missing = request.missing_keys();
    if !missing.is_empty() {
        return Err(OrchestrationError::LaunchRejected(format!(
            "argument is missing required keys: {}",
            missing.join(", ")
        )));
    }

    let policy = match request.delivery {
        Delivery::BestEffort => policy,
        Delivery::SingleShot => RetryPolicy::once(),
    };

    let label = format!("launch {} ({})", request.agent_id, request.request_id);
    let container_id = retry(policy, &label, move |_| {
        platform.launch(&request.agent_id, &request.argument)
    })
    .await
    .map_err(|e| match e {
        RetryError::Aborted(e) => OrchestrationError::LaunchRejected(e.to_string()),
        RetryError::Exhausted { attempts, last } => OrchestrationError::LaunchExhausted {
            attempts,
            last_error: last.to_string(),
        },
    })?;

    info!(
        "Launched job {} on agent {} (container {container_id})",
        request.request_id, request.agent_id
    );

    Ok(JobHandle {
        container_id,
        agent_id: request.agent_id.clone(),
        launched_at: Utc::now(),
    })
}
