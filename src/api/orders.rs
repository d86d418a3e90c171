//! Order intake: creates the order row and issues its secret token, the
//! value every later callback must echo back in `vads_order_info`.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::api::AppState;
use crate::error::GatewayError;
use crate::gateway::fields;

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// Amount in minor units.
    pub amount: i64,
    /// ISO 4217 numeric currency code.
    pub currency: String,
    /// ISO 3166 alpha-2 billing country.
    pub country: String,
    pub customer_email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderCreated {
    pub order_id: i64,
    /// Handed to the storefront once; the request builder sends it to the
    /// platform and the reconciliation engine checks it on every callback.
    pub secret_token: String,
    pub status: String,
}

/// The intake reuses the outbound field catalog: an order that cannot pass
/// these rules could never produce a valid payment request anyway.
fn validate_new_order(payload: &CreateOrderRequest) -> Result<(), GatewayError> {
    fields::validate(fields::AMOUNT, &payload.amount.to_string())?;
    fields::validate(fields::CURRENCY, &payload.currency)?;
    fields::validate(fields::CUST_COUNTRY, &payload.country)?;
    if let Some(email) = &payload.customer_email {
        fields::validate(fields::CUST_EMAIL, email)?;
    }
    Ok(())
}

/// POST /api/orders
pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<Json<OrderCreated>, GatewayError> {
    validate_new_order(&payload)?;

    let order = state
        .orders
        .create_order(
            payload.amount,
            &payload.currency,
            &payload.country,
            payload.customer_email.as_deref(),
        )
        .await?;

    info!(
        order_id = order.id,
        amount = order.amount,
        currency = %order.currency,
        "order created"
    );

    Ok(Json(OrderCreated {
        order_id: order.id,
        secret_token: order.secret_token,
        status: order.status.as_str().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(amount: i64, currency: &str, country: &str) -> CreateOrderRequest {
        CreateOrderRequest {
            amount,
            currency: currency.to_string(),
            country: country.to_string(),
            customer_email: None,
        }
    }

    #[test]
    fn accepts_a_well_formed_order() {
        assert!(validate_new_order(&request(15_990, "978", "FR")).is_ok());
        let with_email = CreateOrderRequest {
            customer_email: Some("buyer@example.com".to_string()),
            ..request(5_000, "840", "US")
        };
        assert!(validate_new_order(&with_email).is_ok());
    }

    #[test]
    fn rejects_non_positive_amounts_and_bad_codes() {
        assert!(validate_new_order(&request(0, "978", "FR")).is_err());
        assert!(validate_new_order(&request(-100, "978", "FR")).is_err());
        assert!(validate_new_order(&request(1_000, "EUR", "FR")).is_err());
        assert!(validate_new_order(&request(1_000, "978", "France")).is_err());
    }

    #[test]
    fn rejects_malformed_email() {
        let payload = CreateOrderRequest {
            customer_email: Some("not-an-address".to_string()),
            ..request(1_000, "978", "FR")
        };
        assert!(validate_new_order(&payload).is_err());
    }
}
