//! Decoded platform callback payload.
//!
//! Both callback channels deliver the same flat `key=value` map. The decoder
//! turns it into a value type with every optional platform field made explicit,
//! so downstream logic never branches on raw field presence. Nothing in a
//! response is trusted until [`PaymentResponse::is_authentified`] returns true.

use serde::Serialize;
use std::collections::HashMap;

use crate::gateway::signature::{self, SignAlgorithm, ALGORITHM_FIELD, SIGNATURE_FIELD};

/// Transaction status vocabulary reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransactionStatus {
    Authorised,
    AuthorisedToValidate,
    Captured,
    WaitingAuthorisation,
    WaitingAuthorisationToValidate,
    UnderVerification,
    Initial,
    WaitingForPayment,
    Abandoned,
    Refused,
    Expired,
    Cancelled,
    /// Unknown or future status; carried verbatim so it can be logged.
    Other(String),
}

impl TransactionStatus {
    pub fn parse(value: &str) -> Self {
        match value {
            "AUTHORISED" => TransactionStatus::Authorised,
            "AUTHORISED_TO_VALIDATE" => TransactionStatus::AuthorisedToValidate,
            "CAPTURED" => TransactionStatus::Captured,
            "WAITING_AUTHORISATION" => TransactionStatus::WaitingAuthorisation,
            "WAITING_AUTHORISATION_TO_VALIDATE" => {
                TransactionStatus::WaitingAuthorisationToValidate
            }
            "UNDER_VERIFICATION" => TransactionStatus::UnderVerification,
            "INITIAL" => TransactionStatus::Initial,
            "WAITING_FOR_PAYMENT" => TransactionStatus::WaitingForPayment,
            "ABANDONED" => TransactionStatus::Abandoned,
            "REFUSED" => TransactionStatus::Refused,
            "EXPIRED" => TransactionStatus::Expired,
            "CANCELLED" => TransactionStatus::Cancelled,
            other => TransactionStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TransactionStatus::Authorised => "AUTHORISED",
            TransactionStatus::AuthorisedToValidate => "AUTHORISED_TO_VALIDATE",
            TransactionStatus::Captured => "CAPTURED",
            TransactionStatus::WaitingAuthorisation => "WAITING_AUTHORISATION",
            TransactionStatus::WaitingAuthorisationToValidate => {
                "WAITING_AUTHORISATION_TO_VALIDATE"
            }
            TransactionStatus::UnderVerification => "UNDER_VERIFICATION",
            TransactionStatus::Initial => "INITIAL",
            TransactionStatus::WaitingForPayment => "WAITING_FOR_PAYMENT",
            TransactionStatus::Abandoned => "ABANDONED",
            TransactionStatus::Refused => "REFUSED",
            TransactionStatus::Expired => "EXPIRED",
            TransactionStatus::Cancelled => "CANCELLED",
            TransactionStatus::Other(value) => value.as_str(),
        }
    }

    /// Provisionally authorised but not yet captured or guaranteed: manual
    /// validation pending, or funds availability still being verified.
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            TransactionStatus::AuthorisedToValidate
                | TransactionStatus::WaitingAuthorisation
                | TransactionStatus::WaitingAuthorisationToValidate
                | TransactionStatus::UnderVerification
                | TransactionStatus::Initial
                | TransactionStatus::WaitingForPayment
        )
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who selected the card brand when several were usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BrandChoice {
    Buyer,
    Platform,
    Unknown,
}

/// One inbound callback, decoded. Constructed fresh per call and discarded
/// after reconciliation.
#[derive(Debug, Clone)]
pub struct PaymentResponse {
    raw: HashMap<String, String>,
    pub result_code: Option<String>,
    pub extra_result: Option<String>,
    pub auth_result: Option<String>,
    pub trans_id: Option<String>,
    pub trans_status: Option<TransactionStatus>,
    pub order_id: Option<i64>,
    pub order_info: Option<String>,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub card_brand: Option<String>,
    pub card_number: Option<String>,
    pub expiry_month: Option<u32>,
    pub expiry_year: Option<u32>,
    pub action_mode: Option<String>,
    pub brand_choice: BrandChoice,
    pub signature: Option<String>,
    /// Transport-level hash attached on the server channel, echoed back in the
    /// acknowledgement line.
    pub hash: Option<String>,
    pub algorithm: SignAlgorithm,
}

impl PaymentResponse {
    /// Decode a flat field map. Total: missing or malformed fields become
    /// `None`, never an error; authenticity and classification decide what to
    /// do with the result.
    pub fn from_fields(fields: HashMap<String, String>) -> Self {
        let get = |name: &str| fields.get(name).map(|v| v.to_string());
        let algorithm = SignAlgorithm::from_field(fields.get(ALGORITHM_FIELD).map(|v| v.as_str()));

        let brand_choice = match fields.get("vads_brand_management") {
            Some(raw) => match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(value) => match value.get("userChoice").and_then(|v| v.as_bool()) {
                    Some(true) => BrandChoice::Buyer,
                    Some(false) => BrandChoice::Platform,
                    None => BrandChoice::Unknown,
                },
                Err(_) => BrandChoice::Unknown,
            },
            None => BrandChoice::Unknown,
        };

        Self {
            result_code: get("vads_result"),
            extra_result: get("vads_extra_result"),
            auth_result: get("vads_auth_result"),
            trans_id: get("vads_trans_id"),
            trans_status: fields
                .get("vads_trans_status")
                .map(|v| TransactionStatus::parse(v)),
            order_id: fields.get("vads_order_id").and_then(|v| v.parse().ok()),
            order_info: get("vads_order_info"),
            amount: fields.get("vads_amount").and_then(|v| v.parse().ok()),
            currency: get("vads_currency"),
            card_brand: get("vads_card_brand"),
            card_number: get("vads_card_number"),
            expiry_month: fields.get("vads_expiry_month").and_then(|v| v.parse().ok()),
            expiry_year: fields.get("vads_expiry_year").and_then(|v| v.parse().ok()),
            action_mode: get("vads_action_mode"),
            brand_choice,
            signature: get(SIGNATURE_FIELD),
            hash: get("vads_hash"),
            algorithm,
            raw: fields,
        }
    }

    /// Signature check gating all other use of the payload.
    pub fn is_authentified(&self, secret: &str) -> bool {
        match self.signature.as_deref() {
            Some(received) => signature::verify(&self.raw, received, secret, self.algorithm),
            None => false,
        }
    }

    /// Whether the payload carries any platform field at all.
    pub fn is_empty(&self) -> bool {
        !self
            .raw
            .keys()
            .any(|k| k.starts_with(signature::FIELD_PREFIX))
    }

    /// Whether the callback was delivered inside an embedded iframe flow.
    pub fn is_iframe(&self) -> bool {
        matches!(self.action_mode.as_deref(), Some("IFRAME"))
    }

    /// Card expiry as `MM/YYYY` when both parts were sent.
    pub fn expiry(&self) -> Option<String> {
        match (self.expiry_month, self.expiry_year) {
            (Some(month), Some(year)) => Some(format!("{:02}/{}", month, year)),
            _ => None,
        }
    }

    /// Amount formatted in currency units for order notes.
    pub fn formatted_amount(&self) -> String {
        match self.amount {
            Some(minor) => format!("{}.{:02}", minor / 100, minor % 100),
            None => "?".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn decodes_typical_callback() {
        let response = PaymentResponse::from_fields(fields(&[
            ("vads_result", "00"),
            ("vads_trans_id", "000123"),
            ("vads_trans_status", "AUTHORISED"),
            ("vads_order_id", "42"),
            ("vads_order_info", "tok_abc"),
            ("vads_amount", "15990"),
            ("vads_currency", "978"),
            ("vads_card_brand", "CB"),
            ("vads_expiry_month", "9"),
            ("vads_expiry_year", "2027"),
            ("vads_brand_management", r#"{"userChoice":true,"brand":"CB"}"#),
            ("signature", "deadbeef"),
        ]));

        assert_eq!(response.result_code.as_deref(), Some("00"));
        assert_eq!(response.order_id, Some(42));
        assert_eq!(response.amount, Some(15990));
        assert_eq!(response.trans_status, Some(TransactionStatus::Authorised));
        assert_eq!(response.brand_choice, BrandChoice::Buyer);
        assert_eq!(response.expiry().as_deref(), Some("09/2027"));
        assert_eq!(response.formatted_amount(), "159.90");
    }

    #[test]
    fn malformed_numerics_become_none() {
        let response = PaymentResponse::from_fields(fields(&[
            ("vads_order_id", "not-a-number"),
            ("vads_amount", ""),
        ]));
        assert_eq!(response.order_id, None);
        assert_eq!(response.amount, None);
    }

    #[test]
    fn unknown_trans_status_is_preserved() {
        let status = TransactionStatus::parse("FUTURE_STATUS");
        assert_eq!(
            status,
            TransactionStatus::Other("FUTURE_STATUS".to_string())
        );
        assert_eq!(status.as_str(), "FUTURE_STATUS");
        assert!(!status.is_waiting());
    }

    #[test]
    fn empty_payload_is_detected() {
        let response = PaymentResponse::from_fields(fields(&[("foo", "bar")]));
        assert!(response.is_empty());
        let response = PaymentResponse::from_fields(fields(&[("vads_result", "00")]));
        assert!(!response.is_empty());
    }

    #[test]
    fn authentification_follows_signature() {
        let mut map = fields(&[("vads_result", "00"), ("vads_trans_id", "000001")]);
        let signature = crate::gateway::signature::sign(
            &map,
            "secret",
            crate::gateway::signature::SignAlgorithm::Sha1,
        );
        map.insert("signature".to_string(), signature);

        let response = PaymentResponse::from_fields(map.clone());
        assert!(response.is_authentified("secret"));
        assert!(!response.is_authentified("wrong"));

        map.remove("signature");
        let unsigned = PaymentResponse::from_fields(map);
        assert!(!unsigned.is_authentified("secret"));
    }
}
