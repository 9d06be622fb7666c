//! Operator alerts for inbound candidate replies.

use async_trait::async_trait;
use thiserror::Error;

pub mod poller;
pub mod twilio;

pub use twilio::TwilioNotifier;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification provider returned status {status}: {body}")]
    Provider { status: u16, body: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

/// Alert text for a new reply from `name`.
pub fn reply_alert(name: &str, snippet: &str) -> String {
    let snippet = match snippet.trim() {
        "" => "No text",
        s => s,
    };
    format!(
        "*Scout alert*\n\nNew reply from *{name}*:\n\"{snippet}\"\n\nCheck your LinkedIn inbox!"
    )
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_alert_quotes_snippet() {
        let text = reply_alert("Jane Doe", "Happy to chat");
        assert!(text.contains("*Jane Doe*"));
        assert!(text.contains("\"Happy to chat\""));
        assert!(reply_alert("Jane", "  ").contains("\"No text\""));
    }
}
