use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::api::{self, AppState, SERVICE_NAME, SharedState};
use crate::config::ServiceConfig;
use crate::db::{DbHandle, TaskStore};
use crate::github::GitHubPublisher;
use crate::llm::GeminiGenerator;
use crate::notify::EvaluationNotifier;
use crate::pipeline::Pipeline;

/// Configuration for the webhook server.
pub struct ServerConfig {
    pub port: u16,
    pub db_path: std::path::PathBuf,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            db_path: std::path::PathBuf::from("data/deployments.db"),
            dev_mode: false,
        }
    }
}

/// Build the application router.
pub fn build_router(state: SharedState) -> Router {
    api::api_router().with_state(state)
}

/// Construct shared state from configuration, marking collaborators
/// unavailable (rather than failing startup) when credentials or client
/// construction are missing.
pub fn build_state(config: &ServiceConfig, store: DbHandle) -> AppState {
    let generator = match &config.gemini_api_key {
        Some(key) => match GeminiGenerator::new(key, &config.gemini_model) {
            Ok(generator) => Some(Arc::new(generator)),
            Err(e) => {
                tracing::error!("LLM initialization failed: {:#}", e);
                None
            }
        },
        None => {
            tracing::error!("LLM initialization failed: GEMINI_API_KEY is not set");
            None
        }
    };

    let publisher = match config.github_credentials() {
        Some((token, user)) => match GitHubPublisher::new(token, user) {
            Ok(publisher) => Some(Arc::new(publisher)),
            Err(e) => {
                tracing::error!("GitHub initialization failed: {:#}", e);
                None
            }
        },
        None => {
            tracing::error!(
                "GitHub initialization failed: GITHUB_TOKEN or GITHUB_USERNAME is not set"
            );
            None
        }
    };

    let llm_ready = generator.is_some();
    let github_ready = publisher.is_some();

    let pipeline = match (generator, publisher) {
        (Some(generator), Some(publisher)) => match EvaluationNotifier::new() {
            Ok(notifier) => Some(Pipeline::new(
                store,
                generator,
                publisher,
                Arc::new(notifier),
            )),
            Err(e) => {
                tracing::error!("notifier initialization failed: {:#}", e);
                None
            }
        },
        _ => None,
    };

    if config.webhook_secret.is_none() {
        tracing::warn!("WEBHOOK_SECRET not set; inbound secret check is disabled (dev mode)");
    }

    AppState {
        pipeline,
        webhook_secret: config.webhook_secret.clone(),
        llm_ready,
        github_ready,
    }
}

/// Start the webhook server.
pub async fn start_server(server_config: ServerConfig, service_config: ServiceConfig) -> Result<()> {
    if let Some(parent) = server_config.db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let store = TaskStore::new(&server_config.db_path)
        .context("Failed to initialize deployment store")?;
    let state = Arc::new(build_state(&service_config, DbHandle::new(store)));

    let mut app = build_router(state);
    if server_config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if server_config.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, server_config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!("{} running at http://{}", SERVICE_NAME, local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("shutting down");
}
