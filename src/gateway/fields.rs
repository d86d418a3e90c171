//! Catalog of outbound request fields and their validation rules.
//!
//! Every value posted to the hosted payment page is validated against a
//! per-field pattern before signing, so a malformed order can never produce a
//! signed request the platform will reject halfway through checkout.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::GatewayError;

pub const SITE_ID: &str = "vads_site_id";
pub const CTX_MODE: &str = "vads_ctx_mode";
pub const AMOUNT: &str = "vads_amount";
pub const CURRENCY: &str = "vads_currency";
pub const TRANS_ID: &str = "vads_trans_id";
pub const TRANS_DATE: &str = "vads_trans_date";
pub const ORDER_ID: &str = "vads_order_id";
pub const ORDER_INFO: &str = "vads_order_info";
pub const URL_RETURN: &str = "vads_url_return";
pub const RETURN_MODE: &str = "vads_return_mode";
pub const LANGUAGE: &str = "vads_language";
pub const CAPTURE_DELAY: &str = "vads_capture_delay";
pub const VALIDATION_MODE: &str = "vads_validation_mode";
pub const PAYMENT_CARDS: &str = "vads_payment_cards";
pub const PAYMENT_CONFIG: &str = "vads_payment_config";
pub const ACTION_MODE: &str = "vads_action_mode";
pub const PAGE_ACTION: &str = "vads_page_action";
pub const VERSION: &str = "vads_version";
pub const CUST_EMAIL: &str = "vads_cust_email";
pub const CUST_FIRST_NAME: &str = "vads_cust_first_name";
pub const CUST_LAST_NAME: &str = "vads_cust_last_name";
pub const CUST_COUNTRY: &str = "vads_cust_country";
pub const SHIP_TO_CITY: &str = "vads_ship_to_city";
pub const SHIP_TO_COUNTRY: &str = "vads_ship_to_country";
pub const SUB_DESC: &str = "vads_sub_desc";
pub const ACQUIRER_TRANSIENT_DATA: &str = "vads_acquirer_transient_data";

/// Validation rule for one outbound field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub pattern: &'static str,
    pub required: bool,
}

/// Rules for every field the request builder may emit. Fields absent from the
/// catalog are rejected outright rather than passed through unchecked.
pub const FIELD_SPECS: &[FieldSpec] = &[
    FieldSpec { name: SITE_ID, pattern: r"^\d{8}$", required: true },
    FieldSpec { name: CTX_MODE, pattern: r"^(TEST|PRODUCTION)$", required: true },
    FieldSpec { name: AMOUNT, pattern: r"^[1-9]\d{0,11}$", required: true },
    FieldSpec { name: CURRENCY, pattern: r"^\d{3}$", required: true },
    FieldSpec { name: TRANS_ID, pattern: r"^[0-9A-Za-z]{6}$", required: true },
    FieldSpec { name: TRANS_DATE, pattern: r"^\d{14}$", required: true },
    FieldSpec { name: ORDER_ID, pattern: r"^[\w\-]{1,64}$", required: true },
    FieldSpec { name: ORDER_INFO, pattern: r"^[^<>]{1,255}$", required: true },
    FieldSpec { name: URL_RETURN, pattern: r"^https?://[^\s]{1,1024}$", required: true },
    FieldSpec { name: RETURN_MODE, pattern: r"^(GET|POST)$", required: false },
    FieldSpec { name: LANGUAGE, pattern: r"^[a-z]{2}$", required: false },
    FieldSpec { name: CAPTURE_DELAY, pattern: r"^\d{1,3}$", required: false },
    FieldSpec { name: VALIDATION_MODE, pattern: r"^[01]?$", required: false },
    FieldSpec { name: PAYMENT_CARDS, pattern: r"^([A-Z0-9_]+(;[A-Z0-9_]+)*)?$", required: false },
    FieldSpec { name: PAYMENT_CONFIG, pattern: r"^(SINGLE|MULTI(:[^=]+=\d+(;[^=]+=\d+)*)?)$", required: true },
    FieldSpec { name: ACTION_MODE, pattern: r"^(INTERACTIVE|IFRAME|SILENT)$", required: true },
    FieldSpec { name: PAGE_ACTION, pattern: r"^(PAYMENT|REGISTER_PAY|REGISTER_UPDATE_PAY)$", required: true },
    FieldSpec { name: VERSION, pattern: r"^V2$", required: true },
    FieldSpec { name: CUST_EMAIL, pattern: r"^[^@\s]+@[^@\s]+\.[^@\s]+$", required: false },
    FieldSpec { name: CUST_FIRST_NAME, pattern: r"^[^<>]{0,63}$", required: false },
    FieldSpec { name: CUST_LAST_NAME, pattern: r"^[^<>]{0,63}$", required: false },
    FieldSpec { name: CUST_COUNTRY, pattern: r"^[A-Z]{2}$", required: false },
    FieldSpec { name: SHIP_TO_CITY, pattern: r"^[^<>]{0,63}$", required: false },
    FieldSpec { name: SHIP_TO_COUNTRY, pattern: r"^[A-Z]{2}$", required: false },
    FieldSpec { name: SUB_DESC, pattern: r"^RRULE:[^<>]{1,255}$", required: false },
    FieldSpec { name: ACQUIRER_TRANSIENT_DATA, pattern: r"^[^<>]{1,255}$", required: false },
];

/// Patterns compiled once, indexed in step with `FIELD_SPECS`. A slot is
/// `None` only if its pattern fails to compile, which the tests rule out.
fn compiled_patterns() -> &'static [Option<Regex>] {
    static PATTERNS: OnceLock<Vec<Option<Regex>>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        FIELD_SPECS
            .iter()
            .map(|spec| Regex::new(spec.pattern).ok())
            .collect()
    })
}

/// Validate one field value against its catalog rule.
pub fn validate(name: &str, value: &str) -> Result<(), GatewayError> {
    let index = FIELD_SPECS
        .iter()
        .position(|spec| spec.name == name)
        .ok_or_else(|| GatewayError::InvalidField {
            field: name.to_string(),
            message: "field is not part of the request catalog".to_string(),
        })?;
    let spec = &FIELD_SPECS[index];

    if value.is_empty() {
        if spec.required {
            return Err(GatewayError::InvalidField {
                field: name.to_string(),
                message: "required field is empty".to_string(),
            });
        }
        return Ok(());
    }

    let matched = compiled_patterns()[index]
        .as_ref()
        .is_some_and(|re| re.is_match(value));
    if !matched {
        return Err(GatewayError::InvalidField {
            field: name.to_string(),
            message: format!("value does not match {}", spec.pattern),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_values() {
        assert!(validate(SITE_ID, "12345678").is_ok());
        assert!(validate(AMOUNT, "15990").is_ok());
        assert!(validate(TRANS_ID, "xrT04p").is_ok());
        assert!(validate(TRANS_DATE, "20260829143015").is_ok());
        assert!(validate(PAYMENT_CONFIG, "SINGLE").is_ok());
        assert!(validate(PAYMENT_CONFIG, "MULTI:first=5000;count=3;period=30").is_ok());
        assert!(validate(PAYMENT_CARDS, "CB;VISA;MASTERCARD").is_ok());
        assert!(validate(URL_RETURN, "https://shop.example/payzen/return").is_ok());
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(validate(SITE_ID, "1234").is_err());
        assert!(validate(AMOUNT, "0").is_err());
        assert!(validate(AMOUNT, "-5").is_err());
        assert!(validate(CURRENCY, "EUR").is_err());
        assert!(validate(TRANS_ID, "toolong1").is_err());
        assert!(validate(CTX_MODE, "test").is_err());
    }

    #[test]
    fn optional_fields_accept_empty_values() {
        assert!(validate(LANGUAGE, "").is_ok());
        assert!(validate(CAPTURE_DELAY, "").is_ok());
        assert!(validate(SITE_ID, "").is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(validate("vads_unknown_field", "x").is_err());
    }

    #[test]
    fn every_catalog_pattern_compiles() {
        for (spec, compiled) in FIELD_SPECS.iter().zip(compiled_patterns()) {
            assert!(compiled.is_some(), "pattern for {} failed to compile", spec.name);
        }
        // Repeated calls hit the same compiled table.
        for _ in 0..3 {
            assert!(validate(AMOUNT, "15990").is_ok());
            assert!(validate(AMOUNT, "0").is_err());
        }
    }
}
