//! Data-driven descriptors for the gateway variants.
//!
//! Each payment means the shop can expose (standard card, installments, SEPA,
//! subscriptions, configured "other" means, Klarna, Franfinance, Choozeo) is
//! one reconciliation engine plus a descriptor record: forced card list,
//! validation/capture overrides, extra request fields and eligibility bounds.

use crate::error::GatewayError;

/// ISO 4217 numeric code for euro, the only currency some variants accept.
const EUR: &str = "978";

#[derive(Debug, Clone)]
pub struct VariantDescriptor {
    pub code: &'static str,
    pub label: &'static str,
    /// Card list forced onto `vads_payment_cards`; empty means the configured
    /// shop default applies.
    pub payment_cards: &'static [&'static str],
    /// Override of the shop validation mode ("0" automatic, "1" manual).
    pub validation_mode: Option<&'static str>,
    /// Override of the shop capture delay, in days.
    pub capture_delay: Option<u32>,
    pub page_action: &'static str,
    /// Extra fields merged into the request after the base set.
    pub extra_fields: &'static [(&'static str, &'static str)],
    /// Numeric currency codes the variant supports; empty means all.
    pub currencies: &'static [&'static str],
    /// Billing countries the variant supports; empty means all.
    pub countries: &'static [&'static str],
    /// Eligible amount window in minor units.
    pub amount_min: Option<i64>,
    pub amount_max: Option<i64>,
}

pub const STANDARD: VariantDescriptor = VariantDescriptor {
    code: "standard",
    label: "Credit card payment",
    payment_cards: &[],
    validation_mode: None,
    capture_delay: None,
    page_action: "PAYMENT",
    extra_fields: &[],
    currencies: &[],
    countries: &[],
    amount_min: None,
    amount_max: None,
};

pub const MULTI: VariantDescriptor = VariantDescriptor {
    code: "multi",
    label: "Payment in installments",
    payment_cards: &[],
    validation_mode: None,
    capture_delay: None,
    page_action: "PAYMENT",
    extra_fields: &[],
    currencies: &[],
    countries: &[],
    amount_min: None,
    amount_max: None,
};

pub const SEPA: VariantDescriptor = VariantDescriptor {
    code: "sepa",
    label: "SEPA direct debit",
    payment_cards: &["SDD"],
    validation_mode: None,
    // SEPA mandates need the platform-side debit lead time.
    capture_delay: Some(3),
    page_action: "REGISTER_PAY",
    extra_fields: &[],
    currencies: &[EUR],
    countries: &[],
    amount_min: None,
    amount_max: None,
};

pub const SUBSCRIPTION: VariantDescriptor = VariantDescriptor {
    code: "subscription",
    label: "Subscription payment",
    payment_cards: &[],
    validation_mode: None,
    capture_delay: None,
    page_action: "REGISTER_PAY",
    extra_fields: &[("vads_sub_desc", "RRULE:FREQ=MONTHLY")],
    currencies: &[],
    countries: &[],
    amount_min: None,
    amount_max: None,
};

pub const OTHER: VariantDescriptor = VariantDescriptor {
    code: "other",
    label: "Other payment means",
    payment_cards: &[],
    validation_mode: None,
    capture_delay: None,
    page_action: "PAYMENT",
    extra_fields: &[],
    currencies: &[],
    countries: &[],
    amount_min: None,
    amount_max: None,
};

pub const KLARNA: VariantDescriptor = VariantDescriptor {
    code: "klarna",
    label: "Klarna payment",
    payment_cards: &["KLARNA"],
    // Klarna orders are confirmed by the acquirer, never auto-captured early.
    validation_mode: Some("1"),
    capture_delay: None,
    page_action: "PAYMENT",
    extra_fields: &[("vads_acquirer_transient_data", r#"{"KLARNA":{"orderId":""}}"#)],
    currencies: &[EUR, "752", "208", "578"],
    countries: &["DE", "AT", "SE", "DK", "NO", "FI", "NL"],
    amount_min: None,
    amount_max: None,
};

pub const FRANFINANCE: VariantDescriptor = VariantDescriptor {
    code: "franfinance",
    label: "Franfinance 3x/4x",
    payment_cards: &["FRANFINANCE_3X", "FRANFINANCE_4X"],
    validation_mode: None,
    capture_delay: None,
    page_action: "PAYMENT",
    extra_fields: &[],
    currencies: &[EUR],
    countries: &["FR"],
    amount_min: Some(10_000),
    amount_max: Some(400_000),
};

pub const CHOOZEO: VariantDescriptor = VariantDescriptor {
    code: "choozeo",
    label: "Choozeo payment",
    payment_cards: &["CHOOZEO_3X", "CHOOZEO_4X"],
    validation_mode: None,
    capture_delay: None,
    page_action: "PAYMENT",
    extra_fields: &[],
    currencies: &[EUR],
    countries: &["FR"],
    amount_min: Some(13_500),
    amount_max: Some(300_000),
};

pub const ALL: &[&VariantDescriptor] = &[
    &STANDARD,
    &MULTI,
    &SEPA,
    &SUBSCRIPTION,
    &OTHER,
    &KLARNA,
    &FRANFINANCE,
    &CHOOZEO,
];

/// Look up a descriptor by its code.
pub fn descriptor(code: &str) -> Result<&'static VariantDescriptor, GatewayError> {
    ALL.iter()
        .find(|variant| variant.code == code)
        .copied()
        .ok_or_else(|| GatewayError::UnknownVariant(code.to_string()))
}

impl VariantDescriptor {
    /// Whether the variant can serve an order in the given currency/country
    /// for the given amount.
    pub fn supports(&self, currency: &str, country: &str, amount_minor: i64) -> bool {
        if !self.currencies.is_empty() && !self.currencies.contains(&currency) {
            return false;
        }
        if !self.countries.is_empty() && !self.countries.contains(&country) {
            return false;
        }
        if self.amount_min.is_some_and(|min| amount_minor < min) {
            return false;
        }
        if self.amount_max.is_some_and(|max| amount_minor > max) {
            return false;
        }
        true
    }
}

/// Build the `vads_payment_config` value for an installment schedule: the first
/// share takes `first_percent` of the total (rounding absorbed there), the rest
/// is split evenly across the remaining installments, `period` days apart.
pub fn multi_payment_config(
    amount_minor: i64,
    count: u32,
    period: u32,
    first_percent: u32,
) -> String {
    if count <= 1 {
        return "SINGLE".to_string();
    }
    let first = if first_percent > 0 {
        (amount_minor * i64::from(first_percent)) / 100
    } else {
        amount_minor - (amount_minor / i64::from(count)) * i64::from(count - 1)
    };
    format!("MULTI:first={first};count={count};period={period}")
}
