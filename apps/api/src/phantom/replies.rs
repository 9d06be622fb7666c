//! Inbox job output → `ThreadSummary`.

use serde_json::{Map, Value};
use tracing::debug;

use crate::models::candidate::{LastMessage, ThreadSummary};
use crate::phantom::probes::{first_text, Record, URL_KEYS};

const THREAD_KEYS: &[&str] = &["threadId", "threadUrl", "profileUrl"];
const SENDER_KEYS: &[&str] = &["fullName", "senderName", "name"];
const MESSAGE_TEXT_KEYS: &[&str] = &["text", "message", "body"];
const MESSAGE_TIME_KEYS: &[&str] = &["timestamp", "date", "sentAt"];
const FROM_ME_KEYS: &[&str] = &["fromMe", "isFromMe", "lastMessageFromMe"];

/// Display name used when a thread names nobody.
pub const UNNAMED_SENDER: &str = "A candidate";

/// Parses every record that identifies a thread; others are skipped.
pub fn threads_from_payload(payload: Vec<Value>) -> Vec<ThreadSummary> {
    payload
        .into_iter()
        .filter_map(|record| match record {
            Value::Object(record) => thread_from_record(&record),
            _ => None,
        })
        .collect()
}

pub fn thread_from_record(record: &Record) -> Option<ThreadSummary> {
    let Some(thread_id) = first_text(record, THREAD_KEYS) else {
        debug!("Skipping inbox record without a thread identifier");
        return None;
    };

    let last_message = match record.get("lastMessage") {
        Some(Value::Object(message)) => message_from_object(&thread_id, message),
        Some(Value::String(text)) => {
            // Flat layout: the snippet inline, metadata on the thread record.
            let timestamp = first_text(record, &["lastMessageDate", "timestamp"]);
            LastMessage {
                id: first_text(record, &["lastMessageId", "messageId"])
                    .unwrap_or_else(|| fallback_id(&thread_id, timestamp.as_deref())),
                text: text.trim().to_string(),
                from_me: from_me(record),
                timestamp,
            }
        }
        _ => message_from_object(&thread_id, &Map::new()),
    };

    Some(ThreadSummary {
        full_name: first_text(record, SENDER_KEYS).unwrap_or_else(|| UNNAMED_SENDER.to_string()),
        profile_url: first_text(record, URL_KEYS),
        thread_id,
        last_message,
    })
}

fn message_from_object(thread_id: &str, message: &Record) -> LastMessage {
    let timestamp = first_text(message, MESSAGE_TIME_KEYS);
    LastMessage {
        id: first_text(message, &["id", "messageId"])
            .unwrap_or_else(|| fallback_id(thread_id, timestamp.as_deref())),
        text: first_text(message, MESSAGE_TEXT_KEYS).unwrap_or_default(),
        from_me: from_me(message),
        timestamp,
    }
}

fn from_me(record: &Record) -> bool {
    FROM_ME_KEYS
        .iter()
        .filter_map(|key| record.get(*key))
        .any(|value| match value {
            Value::Bool(b) => *b,
            Value::String(s) => s.eq_ignore_ascii_case("true"),
            _ => false,
        })
}

fn fallback_id(thread_id: &str, timestamp: Option<&str>) -> String {
    format!("{thread_id}_{}", timestamp.unwrap_or("unknown"))
}
