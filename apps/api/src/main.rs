mod config;
mod errors;
mod evaluation;
mod gateway;
mod models;
mod pipeline;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::evaluation::client::HttpEvaluationClient;
use crate::gateway::http::HttpPipelineGateway;
use crate::routes::build_router;
use crate::state::{AppState, SessionRegistry};

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

    info!("Starting Pipeline API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the recruiting gateway client
    let gateway = HttpPipelineGateway::new(
        config.gateway_base_url.clone(),
        config.gateway_api_key.clone(),
    )?;
    info!("Pipeline gateway client initialized ({})", config.gateway_base_url);

    // Initialize the evaluation service client
    let evaluator = HttpEvaluationClient::new(
        config.evaluation_base_url.clone(),
        config.evaluation_api_key.clone(),
    )?;
    info!(
        "Evaluation client initialized ({})",
        config.evaluation_base_url
    );

    // Build app state
    let state = AppState {
        gateway: Arc::new(gateway),
        evaluator: Arc::new(evaluator),
        sessions: SessionRegistry::new(),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
