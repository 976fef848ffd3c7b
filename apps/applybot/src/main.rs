mod automation;
mod config;
mod errors;
mod llm_client;
mod profile;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting applybot v{}", env!("CARGO_PKG_VERSION"));
    info!(
        rules = config.engine.classifier_rules.rules().len(),
        "Classifier rules loaded"
    );

    // The field resolver owns the retry budget for AI calls.
    let llm = LlmClient::new(config.anthropic_api_key.clone())?.with_max_attempts(1);
    info!("LLM client initialized (model: {})", llm_client::MODEL);
    info!(
        webdriver_url = %config.webdriver_url,
        headless = config.headless,
        sheets = config.sheets_token.is_some(),
        "Browser automation configured"
    );

    let state = AppState::new(Arc::new(llm), config.clone());

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
