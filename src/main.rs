use anyhow::Context;
use clap::Parser; // for cli
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use tools_gateway::admission::AdmissionController;
use tools_gateway::completion::OpenAiClient;
use tools_gateway::config::{Args, LogFormat};
use tools_gateway::quota::{self, MemoryQuotaStore};
use tools_gateway::state::AppState;

fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().flatten_event(true))
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

// this is main async function with tokio
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let args = Args::parse();
    init_logging(args.log_format);

    // in-memory counters, fallback for the durable store (or the only store)
    let memory = Arc::new(MemoryQuotaStore::new());
    let store = quota::build_store(args.durable_settings(), memory.clone())
        .context("failed to build the durable quota store client")?;

    let sweeper = tokio::spawn(quota::sweeper(memory.clone(), args.sweep_interval()));

    let tokens = args.privileged_tokens();
    let limits = args.limits();
    info!(
        per_identity = limits.per_identity,
        global = limits.global,
        vip_keys = tokens.len(),
        "Quota: per client per 24h, global per UTC day"
    );

    if args.openai_api_key.is_empty() {
        warn!("OPENAI_API_KEY is not set, every tool call will fail upstream");
    }
    let completion = OpenAiClient::new(args.completion_settings())
        .context("failed to build the completion client")?;
    info!(base_url = %args.openai_base_url, model = %args.model, "Completion service configured");

    // creating shared state
    let state = Arc::new(AppState {
        admission: AdmissionController::new(store, tokens, limits),
        completion: Arc::new(completion),
    });

    let app = tools_gateway::build_router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Gateway running on http://localhost:{}", args.port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    sweeper.abort();
    Ok(())
}
