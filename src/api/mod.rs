//! HTTP surface: checkout, platform callbacks and health probes.

pub mod callbacks;
pub mod checkout;
pub mod orders;

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use tracing::{error, info};

use crate::config::PlatformConfig;
use crate::database::orders::PgOrderStore;
use crate::services::reconciliation::ReconciliationEngine;
use crate::services::session::CheckoutSessionStore;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReconciliationEngine>,
    pub sessions: Arc<CheckoutSessionStore>,
    pub orders: Arc<PgOrderStore>,
    pub platform: PlatformConfig,
    pub db_pool: sqlx::PgPool,
}

pub fn router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/health", get(health))
        .route("/health/live", get(liveness))
        .route("/api/orders", post(orders::create_order))
        .route("/api/checkout/{order_id}", post(checkout::create_payment_form))
        .route("/payzen/ipn", post(callbacks::handle_notification))
        .route(
            "/payzen/return",
            get(callbacks::handle_return_get).post(callbacks::handle_return_post),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Result<&'static str, (StatusCode, String)> {
    match sqlx::query("SELECT 1").execute(&state.db_pool).await {
        Ok(_) => {
            info!("health check passed");
            Ok("OK")
        }
        Err(e) => {
            error!(error = %e, "health check failed");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                "Service Unavailable".to_string(),
            ))
        }
    }
}

async fn liveness() -> &'static str {
    "OK"
}
