//! Field probes for loosely-schema'd result records.
//!
//! Different job templates name the same logical field differently. Each
//! field is an ordered list of candidate keys; the first present, non-empty
//! value wins.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

pub type Record = Map<String, Value>;

pub const NAME_KEYS: &[&str] = &["fullName", "name", "full_name", "profileName"];
pub const FIRST_NAME_KEYS: &[&str] = &["firstName", "first_name"];
pub const LAST_NAME_KEYS: &[&str] = &["lastName", "last_name"];
pub const HEADLINE_KEYS: &[&str] = &["headline", "occupation", "jobTitle", "title"];
pub const URL_KEYS: &[&str] = &[
    "profileUrl",
    "linkedinProfileUrl",
    "linkedInProfileUrl",
    "url",
    "profileLink",
];
pub const LOCATION_KEYS: &[&str] = &["location", "locationName", "geoLocation", "addressWithCountry"];
pub const ABOUT_KEYS: &[&str] = &["summary", "about", "description", "additionalInfo"];
pub const EXPERIENCE_KEYS: &[&str] = &["experience", "experiences", "positions", "jobs"];
pub const EDUCATION_KEYS: &[&str] = &["education", "educations", "schools"];
pub const COMPANY_KEYS: &[&str] = &["company", "companyName"];
pub const OPEN_TO_WORK_KEYS: &[&str] = &["isOpenToWork", "openToWork", "open_to_work"];
pub const TIMESTAMP_KEYS: &[&str] = &["timestamp", "scrapedAt", "addedAt", "date"];

/// Intent phrases that mark a candidate as open to work.
pub const DEFAULT_OPEN_TO_WORK_KEYWORDS: &[&str] = &[
    "open to work",
    "opentowork",
    "actively seeking",
    "actively looking",
    "looking for new",
    "looking for a new",
    "seeking new",
    "seeking opportunities",
    "open to opportunities",
    "open for opportunities",
    "immediate joiner",
    "available immediately",
    "in transition",
];

/// First probed key with a usable scalar value, rendered as text.
pub fn first_text(record: &Record, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| record.get(*key).and_then(text_of))
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(block) => ["name", "linkedinText", "default"]
            .iter()
            .find_map(|key| block.get(*key).and_then(Value::as_str).and_then(non_empty))
            .or_else(|| {
                let parts: Vec<&str> = ["city", "region", "country"]
                    .iter()
                    .filter_map(|key| block.get(*key).and_then(Value::as_str))
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect();
                (!parts.is_empty()).then(|| parts.join(", "))
            }),
        _ => None,
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

pub fn name_of(record: &Record) -> Option<String> {
    first_text(record, NAME_KEYS).or_else(|| {
        let parts: Vec<String> = [FIRST_NAME_KEYS, LAST_NAME_KEYS]
            .iter()
            .filter_map(|keys| first_text(record, keys))
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    })
}

/// A nested block (list or object) serialized as JSON text; plain strings pass through.
pub fn block_text(record: &Record, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match record.get(*key)? {
        Value::String(s) => non_empty(s),
        Value::Array(items) if items.is_empty() => None,
        Value::Object(map) if map.is_empty() => None,
        block @ (Value::Array(_) | Value::Object(_)) => serde_json::to_string(block).ok(),
        _ => None,
    })
}

/// Experience block, or a one-line "<title> at <company>" when only the
/// current position is known.
pub fn experience_of(record: &Record) -> Option<String> {
    block_text(record, EXPERIENCE_KEYS).or_else(|| {
        match (first_text(record, &["jobTitle"]), first_text(record, COMPANY_KEYS)) {
            (Some(title), Some(company)) => Some(format!("{title} at {company}")),
            (None, Some(company)) => Some(company),
            _ => None,
        }
    })
}

pub fn timestamp_of(record: &Record) -> Option<DateTime<Utc>> {
    TIMESTAMP_KEYS
        .iter()
        .find_map(|key| record.get(*key).and_then(parse_timestamp))
}

/// Epoch values above this are milliseconds, below it seconds.
const EPOCH_MILLIS_FLOOR: i64 = 100_000_000_000;

/// Accepts RFC 3339, ISO-8601 with a `+hhmm` offset, naive ISO-8601 (taken as
/// UTC), or integer/fractional epoch seconds/millis.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .ok()
                .or_else(|| {
                    ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"]
                        .iter()
                        .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
                })
                .map(|dt| dt.with_timezone(&Utc))
                .or_else(|| {
                    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                        .iter()
                        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                        .map(|naive| naive.and_utc())
                })
        }
        Value::Number(n) => {
            let millis = match n.as_i64() {
                Some(raw) if raw > EPOCH_MILLIS_FLOOR => raw,
                Some(raw) => raw.checked_mul(1000)?,
                None => {
                    let raw = n.as_f64().filter(|f| f.is_finite())?;
                    let millis = if raw > EPOCH_MILLIS_FLOOR as f64 { raw } else { raw * 1000.0 };
                    millis.round() as i64
                }
            };
            Utc.timestamp_millis_opt(millis).single()
        }
        _ => None,
    }
}

/// Lowercase, scheme-less, `www.`-less, query-less, without trailing slash.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim().to_lowercase();
    let url = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(&url);
    let url = url.strip_prefix("www.").unwrap_or(url);
    let url = url.split(['?', '#']).next().unwrap_or_default();
    url.trim_end_matches('/').to_string()
}

/// Either-direction substring match after normalization. Empty never matches.
pub fn urls_correspond(a: &str, b: &str) -> bool {
    let (a, b) = (normalize_url(a), normalize_url(b));
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.contains(&b) || b.contains(&a)
}

/// Fuses the explicit open-to-work flag with intent phrases in free text.
#[derive(Debug, Clone)]
pub struct OpenToWorkClassifier {
    keywords: Vec<String>,
}

impl Default for OpenToWorkClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_OPEN_TO_WORK_KEYWORDS.iter().copied())
    }
}

impl OpenToWorkClassifier {
    pub fn new<S: AsRef<str>>(keywords: impl IntoIterator<Item = S>) -> Self {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn mentions_intent(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }

    fn flag(&self, value: &Value) -> bool {
        match value {
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
            Value::String(s) => {
                matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1")
                    || self.mentions_intent(s)
            }
            _ => false,
        }
    }

    /// Positive if any explicit signal is true, or headline/about text
    /// contains an intent phrase.
    pub fn classify(&self, record: &Record) -> bool {
        let flagged = OPEN_TO_WORK_KEYS
            .iter()
            .filter_map(|key| record.get(*key))
            .any(|value| self.flag(value));
        flagged
            || [HEADLINE_KEYS, ABOUT_KEYS]
                .iter()
                .filter_map(|keys| first_text(record, keys))
                .any(|text| self.mentions_intent(&text))
    }
}
