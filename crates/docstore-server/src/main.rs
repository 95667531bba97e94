//! HTTP front for a single JSON document stored in a GitHub repository.
//!
//! This server:
//! - Serves the document from GitHub, or from a local snapshot when GitHub is down
//! - Commits saves against the freshly read blob SHA so concurrent saves conflict
//! - Gates saves behind an admin login session
//! - Relays image uploads and builds transaction message links
//! - Serves the static storefront and admin pages

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use docstore_core::{DocumentService, FallbackCache, RemoteStore};
use docstore_github::GithubContentsStore;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod error;
mod handlers;
mod relay;

use auth::AdminAuth;
use config::Config;
use handlers::{
    data_handler, health_handler, login_handler, save_handler, transaction_handler,
    upload_handler, AppState,
};
use relay::{MessageLinkBuilder, UploadRelay};

/// JSON and multipart body limit.
const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();

    info!("Starting docstore-server v{}", env!("CARGO_PKG_VERSION"));
    info!("  Repo: {} ({})", config.github_repo, config.github_branch);
    info!("  Document: {}", config.data_file_path);
    info!("  Remote timeout: {}s", config.remote_timeout_secs);

    // Fails fast on missing or malformed store credentials
    let store: Arc<dyn RemoteStore> = Arc::new(GithubContentsStore::new(config.github_config())?);

    let fallback = config.effective_fallback_path().map(FallbackCache::new);
    match &fallback {
        Some(cache) => info!("  Fallback snapshot: {}", cache.path().display()),
        None => warn!("  Fallback snapshot: DISABLED"),
    }

    if config.save_requires_auth {
        info!("  Save: requires admin session");
    } else {
        warn!("  Save: OPEN (SAVE_REQUIRES_AUTH=false)");
    }
    if config.admin_password == "admin123" {
        warn!("  ADMIN_PASSWORD is the default, set it before exposing this server");
    }

    let state = AppState {
        documents: Arc::new(DocumentService::new(store, fallback)),
        auth: Arc::new(AdminAuth::new(
            &config.admin_password,
            config.session_ttl_secs,
            config.save_requires_auth,
        )),
        relay: Arc::new(UploadRelay::new(
            config.upload_url.clone(),
            Duration::from_secs(config.remote_timeout_secs.max(30)),
        )?),
        links: Arc::new(MessageLinkBuilder::new(
            config.whatsapp_number.clone(),
            Some(config.message_footer.clone()),
        )),
        save_retry: config.save_retry_policy(),
    };

    let app = build_router(state, &config.static_dir);

    // Bind and serve
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Build the router: API routes, static pages, CORS and tracing.
pub fn build_router(state: AppState, static_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/login", post(login_handler))
        .route("/api/data", get(data_handler))
        .route("/api/save", post(save_handler))
        .route("/api/upload", post(upload_handler))
        .route("/api.php", post(transaction_handler))
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .route_service("/admin", ServeFile::new(static_dir.join("admin.html")))
        .fallback_service(ServeDir::new(static_dir))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Received Ctrl+C, initiating shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
        info!("Received SIGTERM, initiating shutdown");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
