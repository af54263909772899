//! `ProMoAI` - AI-assisted process modeling server
//!
//! Turns a text description, an event log or an existing model into a
//! process model, refines it with feedback and serves BPMN and Petri net
//! views of it.

mod api;
mod convert;
mod engine;
mod ingest;
mod llm;
mod process;
mod runtime;
mod state_machine;

use api::{create_router, AppState};
use engine::{AiEngine, PlayoutLimits};
use llm::LlmConfig;
use runtime::{EngineGateway, RuntimeSettings, SessionManager};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "promoai=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let port: u16 = env_or("PROMOAI_PORT", 8000);
    let max_repair_attempts: u32 = env_or("PROMOAI_MAX_REPAIR_ATTEMPTS", 3);
    let settings = RuntimeSettings {
        upload_dir: std::env::var("PROMOAI_UPLOAD_DIR")
            .map_or_else(|_| RuntimeSettings::default().upload_dir, PathBuf::from),
        gateway_timeout: Duration::from_secs(env_or("PROMOAI_GATEWAY_TIMEOUT_SECS", 600)),
    };
    std::fs::create_dir_all(&settings.upload_dir)?;

    let llm_config = LlmConfig::from_env();
    if llm_config.api_keys.is_empty() && llm_config.gateway.is_none() {
        tracing::warn!("No server API keys configured; requests must carry their own key");
    } else {
        tracing::info!(
            providers = ?llm_config.api_keys.keys().collect::<Vec<_>>(),
            gateway = ?llm_config.gateway,
            default = %llm_config.default_provider,
            "LLM configuration loaded"
        );
    }

    let ai = AiEngine::new(llm_config.clone(), max_repair_attempts)?;
    let gateway = Arc::new(EngineGateway::new(ai, PlayoutLimits::default()));
    tracing::info!(
        upload_dir = %settings.upload_dir.display(),
        gateway_timeout_secs = settings.gateway_timeout.as_secs(),
        max_repair_attempts,
        "Runtime configured"
    );

    let sessions = Arc::new(SessionManager::new(gateway, settings));
    let state = AppState::new(sessions, Arc::new(llm_config));

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("ProMoAI server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
