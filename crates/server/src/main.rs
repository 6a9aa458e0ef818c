//! livepoll server entry point.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, middleware, routing::get};
use livepoll_api::{AppState, TokenVerifier, router as api_router, version};
use livepoll_common::Config;
use livepoll_core::{GroupsClient, NotificationsClient, PollService, SseHub, change_feed};
use livepoll_db::PollChangeStream;
use livepoll_db::repositories::PollRepository;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "livepoll=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting livepoll server...");

    // Load configuration
    let config = Config::load()?;

    // Connect to database and run migrations
    let db = livepoll_db::init(&config).await?;
    info!("Connected to database");

    info!("Running database migrations...");
    livepoll_db::migrate(&db).await?;
    info!("Migrations completed");

    // Initialize the repository and its change stream
    let db = Arc::new(db);
    let change_stream = PollChangeStream::default();
    let poll_repo = PollRepository::new(
        Arc::clone(&db),
        change_stream.clone(),
        Duration::from_millis(config.database.query_timeout_ms),
    );

    // Assign the default tenant to legacy records lacking one
    let migrated = poll_repo
        .backfill_missing_org(&config.tenancy.default_org_id)
        .await?;
    if migrated > 0 {
        info!(count = migrated, "Tenancy backfill applied");
    }

    // Shared outbound HTTP client for the collaborator services
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;

    let groups = GroupsClient::new(
        http.clone(),
        config.groups.base_url.clone(),
        config.groups.internal_api_key.clone(),
    );
    let notifications = NotificationsClient::new(
        http,
        config.notifications.base_url.clone(),
        config.notifications.internal_api_key.clone(),
    );

    // Hub and change feed: storage mutations become live SSE updates
    let hub = Arc::new(SseHub::new());
    change_feed::spawn(&change_stream, Arc::clone(&hub));
    info!("Change feed started");

    let poll_service = PollService::new(poll_repo, groups, notifications, hub);

    let state = AppState {
        poll_service,
        token_verifier: TokenVerifier::new(&config.auth.secret),
        internal_api_key: config.auth.internal_api_key.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    // Build router
    let app = Router::new()
        .route("/polls/version", get(version))
        .nest("/polls/api", api_router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            livepoll_api::auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    // Start server with graceful shutdown
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
