mod config;
mod errors;
mod json_file;
mod llm_client;
mod models;
mod notifications;
mod phantom;
mod pipeline;
mod routes;
mod scoring;
mod state;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::notifications::poller::spawn_reply_poller;
use crate::notifications::{Notifier, TwilioNotifier};
use crate::phantom::platform::PhantomBusterClient;
use crate::phantom::SourcingEngine;
use crate::pipeline::{Pipeline, PipelineStore};
use crate::routes::build_router;
use crate::scoring::{CandidateScorer, LlmCandidateScorer};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Scout API v{}", env!("CARGO_PKG_VERSION"));

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Could not create data dir {}", config.data_dir.display()))?;
    let store = PipelineStore::new(&config.data_dir);

    // Remote job platform
    let platform = Arc::new(PhantomBusterClient::new(
        config.phantombuster_api_key.clone(),
    ));
    let engine = Arc::new(SourcingEngine::new(
        platform,
        config.agents.clone(),
        config.policy.clone(),
        store.topics_path(),
    ));
    info!(
        "Sourcing engine ready (search: {}, scraper: {})",
        config.agents.search, config.agents.scraper
    );

    // LLM scorer
    let llm = LlmClient::new(&config.llm);
    if llm.is_configured() {
        info!("LLM client initialized (model: {})", llm.model());
    } else {
        tracing::warn!("No LLM API key configured; ranking will fail and assessments fall back");
    }
    let scorer: Arc<dyn CandidateScorer> = Arc::new(LlmCandidateScorer::new(llm));

    let notifier: Arc<dyn Notifier> = Arc::new(TwilioNotifier::new(config.twilio.clone()));

    if config.serverless {
        info!("Serverless deployment: background reply polling disabled, use /check-replies");
    } else {
        spawn_reply_poller(
            engine.clone(),
            notifier.clone(),
            store.seen_replies_path(),
            config.policy.reply_poll_interval,
        );
    }

    let pipeline = Arc::new(Pipeline::new(store, engine.clone(), scorer.clone()));

    // Build app state
    let state = AppState {
        engine,
        scorer,
        notifier,
        pipeline,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
