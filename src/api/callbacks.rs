//! Inbound platform callbacks.
//!
//! Two endpoints feed the same reconciliation engine but answer on different
//! contracts: the server notification gets the acknowledgement line in the
//! response body, the browser return gets a redirect to a shop page. Neither
//! ever returns an error status for a processing outcome; the outcome itself
//! is the answer.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect},
    Form,
};
use tracing::info;

use crate::api::AppState;
use crate::gateway::response::PaymentResponse;

/// POST /payzen/ipn
pub async fn handle_notification(
    State(state): State<AppState>,
    Form(fields): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    info!(field_count = fields.len(), "server notification received");

    let response = PaymentResponse::from_fields(fields);
    let echoed_hash = response.hash.clone().unwrap_or_default();
    let ack = state.engine.notify(&response).await;

    // Always 200: the platform reads the OK/KO line, not the status code.
    ack.render(&echoed_hash)
}

/// GET /payzen/return
pub async fn handle_return_get(
    State(state): State<AppState>,
    Query(fields): Query<HashMap<String, String>>,
) -> Redirect {
    finish_return(state, fields).await
}

/// POST /payzen/return
pub async fn handle_return_post(
    State(state): State<AppState>,
    Form(fields): Form<HashMap<String, String>>,
) -> Redirect {
    finish_return(state, fields).await
}

async fn finish_return(state: AppState, fields: HashMap<String, String>) -> Redirect {
    info!(field_count = fields.len(), "browser return received");

    let response = PaymentResponse::from_fields(fields);
    if let Some(order_id) = response.order_id {
        // The checkout session served its purpose once the browser is back.
        let _ = state.sessions.take(order_id).await;
    }
    let outcome = state.engine.handle_return(&response).await;
    Redirect::to(&outcome.redirect_target(&state.platform))
}
