use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use support_api::config::Config;
use support_api::payments::ledger::SupportLedger;
use support_api::payments::postgres::PgLedger;
use support_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file; env vars may also be set externally
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    let db = support_api::db::pool::connect(&config.database_url, config.database_pool_size)
        .expect("failed to build database pool");
    let ledger: Arc<dyn SupportLedger> = Arc::new(PgLedger::new(db));

    tracing::info!(
        merchant_code = %config.duitku.merchant_code,
        provider = %config.duitku.base_url,
        callback_url = %config.callback_url(),
        ping_interval = ?config.hub.ping_interval,
        pong_wait = ?config.hub.pong_wait,
        "support-api configured"
    );

    let state = AppState::new(config, ledger);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(support_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "support-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
