// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use axum::{Router, routing::get};
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::application::cache_layer::CacheLayer;
use crate::application::card_binding::CardBinder;
use crate::application::composer::DashboardComposer;
use crate::application::streaming_service::StreamingDashboardService;
use crate::infrastructure::config::{load_dashboard_definition, load_settings};
use crate::infrastructure::file_source::FileSource;
use crate::infrastructure::source_router::SourceRouter;
use crate::infrastructure::sqlite_source::SqliteSource;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{get_dashboard, get_tab, health_check, stream_dashboard};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Configuration errors are fatal before anything binds
    let settings = load_settings()?;
    let definition = Arc::new(load_dashboard_definition(&settings)?);
    tracing::info!(
        title = %definition.title,
        tabs = definition.tabs.len(),
        cards = definition.card_count(),
        "dashboard definition loaded"
    );

    // Infrastructure
    let adapter = Arc::new(SourceRouter::new(
        settings.sources.database.as_ref().map(SqliteSource::new),
        FileSource::new(&settings.sources.data_dir),
    ));
    let cache = Arc::new(CacheLayer::new());

    // Application services
    let binder = Arc::new(CardBinder::new(
        adapter,
        cache,
        settings.sources.fetch_timeout(),
    ));
    let state = Arc::new(AppState {
        composer: DashboardComposer::new(binder.clone(), definition.clone()),
        streaming_service: StreamingDashboardService::new(binder, definition),
    });

    // Compression is applied by the response builders, not a CompressionLayer
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/dashboard", get(get_dashboard))
        .route("/dashboard/tabs/:id", get(get_tab))
        .route("/dashboard/stream", get(stream_dashboard))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = settings.server.bind.parse()?;
    tracing::info!("Starting civic-dashboard on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
