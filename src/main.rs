use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use collabhub::application::ports::document_repository::DocumentRepository;
use collabhub::application::ports::user_repository::UserRepository;
use collabhub::bootstrap::app_context::AppContext;
use collabhub::bootstrap::config::Config;
use collabhub::infrastructure::db::repositories::document_repository_sqlx::SqlxDocumentRepository;
use collabhub::infrastructure::db::repositories::user_repository_sqlx::SqlxUserRepository;
use collabhub::infrastructure::db::{connect_pool, migrate};
use collabhub::presentation::http::health;
use collabhub::presentation::ws::entry::axum_ws_entry;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "collabhub=debug,axum=info,tower_http=info".into()),
        )
        .init();

    let cfg = Arc::new(Config::from_env()?);

    let pool = connect_pool(&cfg.database_url).await?;
    migrate(&pool).await?;

    let users: Arc<dyn UserRepository> = Arc::new(SqlxUserRepository::new(pool.clone()));
    let documents: Arc<dyn DocumentRepository> = Arc::new(SqlxDocumentRepository::new(pool.clone()));

    let ctx = AppContext::new(cfg.clone(), users, documents, pool);

    spawn_reaper(ctx.clone());

    let cors = match &cfg.frontend_url {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<http::HeaderValue>()?)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };

    let app = Router::new()
        .route("/health", get(health::health))
        .route("/ws", get(axum_ws_entry))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(ctx.clone());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.listen_port)).await?;
    tracing::info!(port = cfg.listen_port, "collabhub:listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(ctx))
        .await?;

    Ok(())
}

/// §4.3 background reaper: on each `cleanup_check_interval` tick, retires
/// replicas idle longer than `inactive_timeout` whose room has emptied.
fn spawn_reaper(ctx: AppContext) {
    let interval = Duration::from_secs(ctx.cfg.cleanup_check_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let rooms = ctx.rooms.clone();
            let result = ctx
                .replicas
                .reap_idle(|document_id| {
                    let rooms = rooms.clone();
                    async move { rooms.is_empty(document_id).await }
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = ?e, "reaper:tick_failed");
            }
        }
    });
}

/// Graceful shutdown: on SIGINT/SIGTERM, flush a final snapshot for every
/// still-live replica before the process exits (§10.6).
async fn shutdown_signal(ctx: AppContext) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("collabhub:shutting_down");
    if let Err(e) = ctx.replicas.save_all().await {
        tracing::error!(error = ?e, "shutdown:save_all_failed");
    }
}
