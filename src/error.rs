//! Error taxonomy for the gateway service.
//!
//! Every layer keeps its own error enum (`ConfigError`, `DatabaseError`,
//! `GatewayError`); reconciliation never lets any of them escape to the
//! platform. Inbound callbacks are always answered with a channel-appropriate
//! terminal response instead.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::database::error::DatabaseError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid field {field}: {message}")]
    InvalidField { field: String, message: String },

    #[error("Unknown payment variant: {0}")]
    UnknownVariant(String),

    #[error("Variant {variant} cannot serve this order: {reason}")]
    UnsupportedOrder { variant: String, reason: String },

    #[error("Order not found: {0}")]
    OrderNotFound(i64),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidField { .. } => StatusCode::BAD_REQUEST,
            GatewayError::UnknownVariant(_) => StatusCode::BAD_REQUEST,
            GatewayError::UnsupportedOrder { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Database(e) if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to an API caller; internals stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::InvalidField { field, .. } => {
                format!("Invalid value for field '{}'", field)
            }
            GatewayError::UnknownVariant(code) => format!("Unknown payment variant '{}'", code),
            GatewayError::UnsupportedOrder { variant, reason } => {
                format!("Payment variant '{}' is not available: {}", variant, reason)
            }
            GatewayError::OrderNotFound(id) => format!("Order {} not found", id),
            GatewayError::Database(_) => "The order store is temporarily unavailable".to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = %status.as_u16(), "request failed");
        } else {
            tracing::warn!(error = %self, status = %status.as_u16(), "request rejected");
        }
        let body = Json(serde_json::json!({
            "error": self.user_message(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_is_correct() {
        let err = GatewayError::InvalidField {
            field: "vads_amount".to_string(),
            message: "not numeric".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            GatewayError::OrderNotFound(7).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn user_message_hides_internals() {
        let err =
            GatewayError::Database(DatabaseError::Connection("password=hunter2".to_string()));
        assert!(!err.user_message().contains("hunter2"));
    }
}
