//! Reply polling.
//!
//! The background poller is the only writer of the seen-replies file: each
//! tick reads it, adds the ids it alerted on, and writes it back.
//! Request-triggered checks never touch it.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::json_file;
use crate::models::candidate::ThreadSummary;
use crate::notifications::{reply_alert, Notifier};
use crate::phantom::{OrchestrationError, SourcingEngine};

/// Message ids already alerted on, persisted as a JSON list.
#[derive(Debug)]
pub struct SeenReplies {
    path: PathBuf,
    ids: BTreeSet<String>,
}

impl SeenReplies {
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let ids = json_file::read_json(&path).unwrap_or_default();
        Self { path, ids }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn insert(&mut self, id: String) -> bool {
        self.ids.insert(id)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        json_file::write_json(&self.path, &self.ids)
    }
}

async fn alert(notifier: &dyn Notifier, thread: &ThreadSummary) -> bool {
    info!("New reply from {}; sending alert", thread.full_name);
    let text = reply_alert(&thread.full_name, &thread.last_message.text);
    match notifier.send(&text).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Alert for {} failed: {e}", thread.full_name);
            false
        }
    }
}

/// One background tick: alerts on inbound messages not seen before and
/// persists their ids. Returns how many alerts were sent.
pub async fn poll_once(
    engine: &SourcingEngine,
    notifier: &dyn Notifier,
    seen_path: &Path,
) -> Result<usize, OrchestrationError> {
    let mut seen = SeenReplies::load(seen_path);
    let threads = engine.check_replies().await?.value;

    let mut alerted = 0;
    for thread in threads.iter().filter(|t| t.is_inbound()) {
        if seen.contains(&thread.last_message.id) {
            continue;
        }
        // Unsent alerts stay unseen so the next tick retries them.
        if alert(notifier, thread).await {
            seen.insert(thread.last_message.id.clone());
            alerted += 1;
        }
    }

    if alerted > 0 {
        if let Err(e) = seen.save() {
            error!("Could not persist seen replies: {e:#}");
        }
    }
    Ok(alerted)
}

/// On-demand check: alerts on every inbound thread, without persisting anything.
pub async fn notify_inbound(
    engine: &SourcingEngine,
    notifier: &dyn Notifier,
) -> Result<usize, OrchestrationError> {
    let threads = engine.check_replies().await?.value;
    let mut alerted = 0;
    for thread in threads.iter().filter(|t| t.is_inbound()) {
        if alert(notifier, thread).await {
            alerted += 1;
        }
    }
    Ok(alerted)
}

pub fn spawn_reply_poller(
    engine: Arc<SourcingEngine>,
    notifier: Arc<dyn Notifier>,
    seen_path: PathBuf,
    interval: Duration,
) -> JoinHandle<()> {
    info!(
        "Background reply polling started (every {}s)",
        interval.as_secs()
    );
    tokio::spawn(async move {
        loop {
            match poll_once(&engine, notifier.as_ref(), &seen_path).await {
                Ok(0) => {}
                Ok(n) => info!("Sent {n} reply alerts"),
                Err(e) => error!("Reply poll failed: {}", e.status_message()),
            }
            tokio::time::sleep(interval).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentIds, OrchestrationPolicy};
    use crate::notifications::testing::RecordingNotifier;
    use crate::phantom::testing::{agent_with_session, errored, finished, FakePlatform};
    use serde_json::{json, Value};

    fn inbox() -> Value {
        json!([
            { "threadId": "t-1", "fullName": "Jane", "lastMessage": { "id": "m-1", "text": "Interested!", "fromMe": false } },
            { "threadId": "t-2", "fullName": "Me", "lastMessage": { "id": "m-2", "text": "Ping", "fromMe": true } },
            { "threadId": "t-3", "fullName": "Sam", "lastMessage": { "id": "m-3", "text": "Tell me more", "fromMe": false } }
        ])
    }

    fn engine(platform: FakePlatform, dir: &tempfile::TempDir) -> SourcingEngine {
        SourcingEngine::new(
            Arc::new(platform),
            AgentIds {
                search: "s".to_string(),
                scraper: "p".to_string(),
                message: None,
                inbox: Some("inbox".to_string()),
            },
            OrchestrationPolicy::default(),
            dir.path().join("topics.json"),
        )
    }

    fn ready(artifacts: usize) -> FakePlatform {
        FakePlatform::new()
            .with_agent(agent_with_session())
            .with_statuses(vec![Ok(finished())])
            .with_artifacts((0..artifacts).map(|_| Ok(inbox())).collect())
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_alerts_once_per_inbound_message() {
        let dir = tempfile::tempdir().unwrap();
        let seen_path = dir.path().join("seen_replies.json");
        let engine = engine(ready(2), &dir);
        let notifier = RecordingNotifier::default();

        assert_eq!(poll_once(&engine, &notifier, &seen_path).await.unwrap(), 2);
        assert_eq!(poll_once(&engine, &notifier, &seen_path).await.unwrap(), 0);

        assert_eq!(notifier.sent().len(), 2);
        let seen = SeenReplies::load(&seen_path);
        assert!(seen.contains("m-1") && seen.contains("m-3"));
        assert!(!seen.contains("m-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_alert_stays_unseen() {
        let dir = tempfile::tempdir().unwrap();
        let seen_path = dir.path().join("seen_replies.json");
        let engine = engine(ready(1), &dir);

        let sent = poll_once(&engine, &RecordingNotifier::failing(), &seen_path)
            .await
            .unwrap();

        assert_eq!(sent, 0);
        assert!(!seen_path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_demand_check_ignores_seen_set() {
        let dir = tempfile::tempdir().unwrap();
        let seen_path = dir.path().join("seen_replies.json");
        let mut seen = SeenReplies::load(&seen_path);
        seen.insert("m-1".to_string());
        seen.save().unwrap();
        let engine = engine(ready(1), &dir);
        let notifier = RecordingNotifier::default();

        assert_eq!(notify_inbound(&engine, &notifier).await.unwrap(), 2);

        let reloaded = SeenReplies::load(&seen_path);
        assert!(reloaded.contains("m-1"));
        assert!(!reloaded.contains("m-3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let platform = FakePlatform::new()
            .with_agent(agent_with_session())
            .with_statuses(vec![Ok(errored("stopped"))])
            .with_console("cookie-missing");
        let engine = engine(platform, &dir);

        let result = poll_once(&engine, &RecordingNotifier::default(), &dir.path().join("s.json")).await;
        assert!(matches!(result, Err(OrchestrationError::SessionExpired)));
    }
}
