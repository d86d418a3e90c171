use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info};

use payzen_gateway::api::{self, AppState};
use payzen_gateway::config::AppConfig;
use payzen_gateway::database::orders::PgOrderStore;
use payzen_gateway::database::{init_pool, PoolConfig};
use payzen_gateway::logging::init_tracing;
use payzen_gateway::middleware::logging::{request_logging_middleware, UuidRequestId};
use payzen_gateway::services::reconciliation::ReconciliationEngine;
use payzen_gateway::services::session::CheckoutSessionStore;

/// Graceful shutdown signal handler
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = AppConfig::from_env()?;
    config.validate()?;
    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        ctx_mode = config.platform.ctx_mode.as_str(),
        site_id = %config.platform.site_id,
        "Starting payment gateway service"
    );

    let pool_config = PoolConfig {
        max_connections: config.database.max_connections,
        min_connections: config.database.min_connections,
        connection_timeout: Duration::from_secs(config.database.connection_timeout),
        ..PoolConfig::default()
    };
    let db_pool = init_pool(&config.database.url, Some(pool_config))
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to initialize database pool");
            anyhow::anyhow!(e)
        })?;
    info!("Database connection pool initialized");

    let orders = Arc::new(PgOrderStore::new(db_pool.clone()));
    let engine = Arc::new(ReconciliationEngine::new(
        orders.clone(),
        config.platform.clone(),
    ));
    let sessions = Arc::new(CheckoutSessionStore::new(
        config.platform.session_ttl_secs,
    ));

    let state = AppState {
        engine,
        sessions,
        orders,
        platform: config.platform.clone(),
        db_pool,
    };

    let app = api::router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
            .layer(axum::middleware::from_fn(request_logging_middleware))
            .layer(PropagateRequestIdLayer::x_request_id()),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!(address = %addr, error = %e, "Failed to bind listener");
        e
    })?;

    info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
