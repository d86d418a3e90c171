//! Checkout endpoint: turns an order into a signed hosted-page form.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::AppState;
use crate::database::orders::OrderStore;
use crate::error::GatewayError;
use crate::gateway::request::{DisplayMode, OrderInput, RequestBuilder};
use crate::gateway::variants::{self, multi_payment_config};
use crate::services::session::CheckoutSession;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    /// Payment variant code, defaults to the standard card flow.
    pub variant: Option<String>,
    /// "redirect" or "iframe".
    pub display: Option<String>,
    pub customer_first_name: Option<String>,
    pub customer_last_name: Option<String>,
    pub ship_to_city: Option<String>,
    pub ship_to_country: Option<String>,
    /// Installment schedule for the multi variant.
    pub installments: Option<InstallmentRequest>,
}

#[derive(Debug, Deserialize)]
pub struct InstallmentRequest {
    pub count: u32,
    /// Days between installments.
    pub period: Option<u32>,
    /// Share of the total taken by the first installment, in percent.
    pub first_percent: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub platform_url: String,
    pub fields: HashMap<String, String>,
    /// Ready-to-embed hidden inputs for an auto-submitting form.
    pub form_html: String,
}

/// POST /api/checkout/{order_id}
pub async fn create_payment_form(
    State(state): State<AppState>,
    Path(order_id): Path<i64>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, GatewayError> {
    state.sessions.purge_expired().await;

    let order = state
        .orders
        .find_order(order_id)
        .await?
        .ok_or(GatewayError::OrderNotFound(order_id))?;

    let variant_code = payload.variant.as_deref().unwrap_or("standard");
    let variant = variants::descriptor(variant_code)?;

    let display = match payload.display.as_deref() {
        Some("iframe") => DisplayMode::Iframe,
        _ => DisplayMode::Redirect,
    };

    let payment_config = match (&payload.installments, variant.code) {
        (Some(schedule), "multi") => multi_payment_config(
            order.amount,
            schedule.count,
            schedule.period.unwrap_or(30),
            schedule.first_percent.unwrap_or(0),
        ),
        _ => "SINGLE".to_string(),
    };

    let input = OrderInput {
        order_id: order.id,
        secret_token: order.secret_token.clone(),
        amount: order.amount,
        currency: order.currency.clone(),
        country: order.country.clone(),
        customer_email: order.customer_email.clone(),
        customer_first_name: payload.customer_first_name,
        customer_last_name: payload.customer_last_name,
        ship_to_city: payload.ship_to_city,
        ship_to_country: payload.ship_to_country,
    };

    let request = RequestBuilder::new(&state.platform, variant)
        .display(display)
        .payment_config(payment_config)
        .build(&input)?;

    state
        .sessions
        .put(CheckoutSession {
            order_id: order.id,
            trans_id: request.trans_id().to_string(),
            variant: variant.code.to_string(),
        })
        .await;

    info!(
        order_id = order.id,
        variant = variant.code,
        trans_id = request.trans_id(),
        "payment form issued"
    );

    Ok(Json(CheckoutResponse {
        platform_url: request.platform_url().to_string(),
        form_html: request.to_hidden_fields_html(),
        fields: request.fields().clone(),
    }))
}
