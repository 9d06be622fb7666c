use std::time::Duration;

use thiserror::Error;

use crate::phantom::retry::Retryable;

/// Failure talking to the remote job platform or its artifact storage.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("platform returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected platform response: {0}")]
    Decode(String),
}

impl PlatformError {
    /// The platform refused the request itself; resubmitting it cannot help.
    pub fn is_invalid_argument(&self) -> bool {
        match self {
            PlatformError::Status { status, body } => {
                matches!(status, 400 | 422) || body.to_lowercase().contains("invalid argument")
            }
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::Status { status: 404, .. })
    }
}

impl Retryable for PlatformError {
    fn is_retryable(&self) -> bool {
        !self.is_invalid_argument()
    }
}

/// Every way a remote job can fail to produce candidates.
///
/// All variants except `SessionExpired` are folded into "zero results plus a
/// status message" at the engine boundary.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("launch failed after {attempts} attempts: {last_error}")]
    LaunchExhausted { attempts: u32, last_error: String },

    #[error("launch rejected: {0}")]
    LaunchRejected(String),

    #[error("platform session is invalid or expired")]
    SessionExpired,

    #[error("remote job failed: {0}")]
    RemoteJobFailed(String),

    #[error("remote job did not finish within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("no result payload could be retrieved")]
    RetrievalExhausted,

    #[error("no result record corresponds to {0}")]
    IdentityMismatch(String),

    #[error("malformed result record: {0}")]
    MalformedRecord(String),
}

impl OrchestrationError {
    pub fn is_session_expired(&self) -> bool {
        matches!(self, OrchestrationError::SessionExpired)
    }

    /// Operator-facing one-liner for the status surface.
    pub fn status_message(&self) -> String {
        match self {
            OrchestrationError::LaunchExhausted { last_error, .. }
                if last_error.to_lowercase().contains("parallel executions") =>
            {
                "Maximum parallel executions reached on the job platform. \
                 Please wait a few minutes and try again."
                    .to_string()
            }
            OrchestrationError::SessionExpired => {
                "The platform session cookie is invalid or expired. \
                 Refresh the credentials before running this stage again."
                    .to_string()
            }
            OrchestrationError::RetrievalExhausted => {
                "The job finished but its results could not be retrieved. No candidates this round."
                    .to_string()
            }
            other => format!("{other}. No candidates this round."),
        }
    }
}
