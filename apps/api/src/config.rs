use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::phantom::probes::{OpenToWorkClassifier, DEFAULT_OPEN_TO_WORK_KEYWORDS};
use crate::phantom::retry::{Backoff, RetryPolicy};
use crate::phantom::waiter::WaitPolicy;

const DEFAULT_LLM_BASE_URL: &str = "https://api.cerebras.ai/v1";
const DEFAULT_LLM_MODEL: &str = "llama3.1-8b";

/// Console/status fragments that mean the platform session cookie is dead.
pub const DEFAULT_SESSION_SIGNATURES: &[&str] = &[
    "cookie-missing",
    "cookie is invalid",
    "invalid cookie",
    "session cookie",
    "cookie expired",
    "invalid session",
    "not logged in",
    "disconnected from linkedin",
];

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub phantombuster_api_key: String,
    pub agents: AgentIds,
    pub llm: LlmSettings,
    pub twilio: Option<TwilioSettings>,
    pub data_dir: PathBuf,
    pub port: u16,
    pub rust_log: String,
    /// Serverless deployments cannot keep a background task alive.
    pub serverless: bool,
    pub policy: OrchestrationPolicy,
}

/// Platform job targets. Message and inbox jobs are optional features.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIds {
    pub search: String,
    pub scraper: String,
    pub message: Option<String>,
    pub inbox: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    /// `None` disables AI scoring; every call falls back.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct TwilioSettings {
    pub account_sid: String,
    pub auth_token: String,
    pub from: String,
    pub to: String,
}

/// Every tunable value of the job orchestration, overridable from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestrationPolicy {
    pub launch_attempts: u32,
    /// Linear base: the n-th failed launch waits `n * launch_backoff`.
    pub launch_backoff: Duration,
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    pub grace: Duration,
    pub artifact_attempts: u32,
    pub artifact_backoff: Duration,
    /// Hard ceiling on search results per run.
    pub search_result_cap: usize,
    /// How many top-ranked candidates get a deep scrape.
    pub enrich_cap: usize,
    pub require_open_to_work: bool,
    pub freshness_filter: bool,
    pub open_to_work_keywords: Vec<String>,
    pub session_signatures: Vec<String>,
    pub reply_poll_interval: Duration,
}

impl Default for OrchestrationPolicy {
    fn default() -> Self {
        Self {
            launch_attempts: 3,
            launch_backoff: Duration::from_secs(10),
            poll_interval: Duration::from_secs(5),
            job_timeout: Duration::from_secs(900),
            grace: Duration::from_secs(10),
            artifact_attempts: 3,
            artifact_backoff: Duration::from_secs(3),
            search_result_cap: 10,
            enrich_cap: 3,
            require_open_to_work: true,
            freshness_filter: true,
            open_to_work_keywords: owned(DEFAULT_OPEN_TO_WORK_KEYWORDS),
            session_signatures: owned(DEFAULT_SESSION_SIGNATURES),
            reply_poll_interval: Duration::from_secs(600),
        }
    }
}

impl OrchestrationPolicy {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            launch_attempts: env_or("PHANTOM_LAUNCH_ATTEMPTS", defaults.launch_attempts)?,
            launch_backoff: secs_or("PHANTOM_LAUNCH_BACKOFF_SECS", defaults.launch_backoff)?,
            poll_interval: secs_or("PHANTOM_POLL_INTERVAL_SECS", defaults.poll_interval)?,
            job_timeout: secs_or("PHANTOM_TIMEOUT_SECS", defaults.job_timeout)?,
            grace: secs_or("PHANTOM_GRACE_SECS", defaults.grace)?,
            artifact_attempts: env_or("PHANTOM_ARTIFACT_ATTEMPTS", defaults.artifact_attempts)?,
            artifact_backoff: secs_or("PHANTOM_ARTIFACT_BACKOFF_SECS", defaults.artifact_backoff)?,
            search_result_cap: env_or("SEARCH_RESULT_CAP", defaults.search_result_cap)?,
            enrich_cap: env_or("ENRICH_CAP", defaults.enrich_cap)?,
            require_open_to_work: env_or("REQUIRE_OPEN_TO_WORK", defaults.require_open_to_work)?,
            freshness_filter: env_or("FRESHNESS_FILTER", defaults.freshness_filter)?,
            open_to_work_keywords: list_or("OTW_KEYWORDS", defaults.open_to_work_keywords),
            session_signatures: list_or("SESSION_INVALID_SIGNATURES", defaults.session_signatures),
            reply_poll_interval: secs_or(
                "REPLY_POLL_INTERVAL_SECS",
                defaults.reply_poll_interval,
            )?,
        })
    }

    pub fn launch_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.launch_attempts.max(1), Backoff::Linear(self.launch_backoff))
    }

    pub fn artifact_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.artifact_attempts.max(1),
            Backoff::Linear(self.artifact_backoff),
        )
    }

    pub fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            poll_interval: self.poll_interval,
            timeout: self.job_timeout,
            grace: self.grace,
            session_signatures: self
                .session_signatures
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
        }
    }

    pub fn classifier(&self) -> OpenToWorkClassifier {
        OpenToWorkClassifier::new(&self.open_to_work_keywords)
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            phantombuster_api_key: require_env("PHANTOMBUSTER_API_KEY")?,
            agents: AgentIds {
                search: require_env("PHANTOM_ID")?,
                scraper: require_env("PHANTOM_SCRAPER_ID")?,
                message: optional_env("PHANTOM_MESSAGE_ID"),
                inbox: optional_env("PHANTOM_INBOX_ID"),
            },
            llm: LlmSettings {
                api_key: optional_env("CEREBRAS_API_KEY"),
                base_url: optional_env("LLM_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
                model: optional_env("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            },
            twilio: twilio_from_env(),
            data_dir: PathBuf::from(optional_env("DATA_DIR").unwrap_or_else(|| ".".to_string())),
            port: env_or("PORT", 8000u16).context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            serverless: optional_env("VERCEL").is_some(),
            policy: OrchestrationPolicy::from_env()?,
        })
    }
}

/// All four Twilio variables, or nothing.
fn twilio_from_env() -> Option<TwilioSettings> {
    Some(TwilioSettings {
        account_sid: optional_env("TWILIO_ACCOUNT_SID")?,
        auth_token: optional_env("TWILIO_AUTH_TOKEN")?,
        from: optional_env("TWILIO_WHATSAPP_FROM")?,
        to: optional_env("TWILIO_WHATSAPP_TO")?,
    })
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Environment variable '{key}' has invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn secs_or(key: &str, default: Duration) -> Result<Duration> {
    env_or(key, default.as_secs()).map(Duration::from_secs)
}

fn list_or(key: &str, default: Vec<String>) -> Vec<String> {
    match optional_env(key) {
        Some(raw) => parse_list(&raw),
        None => default,
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
