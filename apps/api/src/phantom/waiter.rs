//! Job Waiter: polls a container until it finishes, errors, or times out.
//!
//! `Polling -> {Finished, Errored, TimedOut}`. Unrecognized statuses and
//! transport failures keep polling but still consume the time budget.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::phantom::error::OrchestrationError;
use crate::phantom::job::{ContainerState, JobHandle, JobStatus};
use crate::phantom::platform::PhantomPlatform;

/// Number of trailing console lines kept in a failure detail.
const CONSOLE_TAIL_LINES: usize = 5;

#[derive(Debug, Clone)]
pub struct WaitPolicy {
    pub poll_interval: Duration,
    /// Absolute ceiling for one job, measured from the first poll.
    pub timeout: Duration,
    /// Pause after `Finished` so artifact storage can catch up.
    pub grace: Duration,
    /// Lowercase fragments that identify an invalid platform session.
    pub session_signatures: Vec<String>,
}

/// Blocks until the job behind `handle` finishes. Returns only after the
/// grace delay has elapsed.
pub async fn await_job(
    platform: &dyn PhantomPlatform,
    handle: &JobHandle,
    policy: &WaitPolicy,
) -> Result<(), OrchestrationError> {
    let started = Instant::now();
    let mut polls = 0u32;

    loop {
        polls += 1;
        match platform.status(&handle.container_id).await {
            Ok(state) => match state.job_status() {
                JobStatus::Finished => {
                    info!(
                        "Container {} finished after {}s ({polls} polls); waiting {}s grace",
                        handle.container_id,
                        started.elapsed().as_secs(),
                        policy.grace.as_secs()
                    );
                    sleep(policy.grace).await;
                    return Ok(());
                }
                JobStatus::Errored => {
                    return Err(diagnose(platform, handle, &state, policy).await);
                }
                JobStatus::Running => {
                    debug!("Container {} still running", handle.container_id);
                }
                JobStatus::Unknown(raw) => {
                    debug!(
                        "Container {} reported unrecognized status '{raw}'",
                        handle.container_id
                    );
                }
            },
            Err(e) => warn!("Status poll for container {} failed: {e}", handle.container_id),
        }

        if started.elapsed() >= policy.timeout {
            warn!(
                "Container {} (launched {}) did not finish within {}s",
                handle.container_id,
                handle.launched_at.format("%H:%M:%S"),
                policy.timeout.as_secs()
            );
            return Err(OrchestrationError::Timeout(policy.timeout));
        }
        sleep(policy.poll_interval).await;
    }
}

/// Classifies an errored job. A session-invalid signature in the console log
/// or the raw status payload is surfaced as `SessionExpired`.
async fn diagnose(
    platform: &dyn PhantomPlatform,
    handle: &JobHandle,
    state: &ContainerState,
    policy: &WaitPolicy,
) -> OrchestrationError {
    let console = match platform.fetch_console(&handle.container_id).await {
        Ok(console) => console,
        Err(e) => {
            warn!(
                "Could not fetch console log for container {}: {e}",
                handle.container_id
            );
            String::new()
        }
    };

    let haystack = format!("{console}\n{}", state.raw).to_lowercase();
    if policy
        .session_signatures
        .iter()
        .any(|signature| haystack.contains(signature.as_str()))
    {
        warn!(
            "Container {} failed with an invalid platform session",
            handle.container_id
        );
        return OrchestrationError::SessionExpired;
    }

    let detail = state
        .exit_message
        .clone()
        .or_else(|| console_tail(&console))
        .unwrap_or_else(|| format!("status '{}'", state.status));
    warn!("Container {} failed: {detail}", handle.container_id);
    OrchestrationError::RemoteJobFailed(detail)
}

fn console_tail(console: &str) -> Option<String> {
    let lines: Vec<&str> = console
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return None;
    }
    let start = lines.len().saturating_sub(CONSOLE_TAIL_LINES);
    Some(lines[start..].join(" | "))
}
