//! Assembly of signed outbound payment requests.
//!
//! The builder gathers the base field set from the platform configuration and
//! the order, merges the selected variant's overrides, validates every value
//! against the field catalog and signs the result. A [`SignedRequest`] can
//! then be rendered as an auto-submitting form targeting the hosted page.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::PlatformConfig;
use crate::error::GatewayError;
use crate::gateway::signature::{self, SIGNATURE_FIELD};
use crate::gateway::{fields, variants::VariantDescriptor};

/// Display mode of the hosted payment page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// Full-page redirect to the platform.
    Redirect,
    /// Embedded iframe inside the checkout page.
    Iframe,
}

impl DisplayMode {
    fn action_mode(&self) -> &'static str {
        match self {
            DisplayMode::Redirect => "INTERACTIVE",
            DisplayMode::Iframe => "IFRAME",
        }
    }
}

/// Order-side inputs to a payment request. Amounts are in minor units.
#[derive(Debug, Clone)]
pub struct OrderInput {
    pub order_id: i64,
    pub secret_token: String,
    pub amount: i64,
    pub currency: String,
    pub country: String,
    pub customer_email: Option<String>,
    pub customer_first_name: Option<String>,
    pub customer_last_name: Option<String>,
    pub ship_to_city: Option<String>,
    pub ship_to_country: Option<String>,
}

/// A fully validated and signed field set, ready for the browser.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    fields: HashMap<String, String>,
    platform_url: String,
}

impl SignedRequest {
    /// The flat field set, signature included.
    pub fn fields(&self) -> &HashMap<String, String> {
        &self.fields
    }

    pub fn platform_url(&self) -> &str {
        &self.platform_url
    }

    /// Transaction id the request carries; the shop must remember it to
    /// disambiguate retried attempts when the result comes back.
    pub fn trans_id(&self) -> &str {
        self.fields
            .get(fields::TRANS_ID)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Render the request as hidden form inputs, attribute-escaped, in sorted
    /// field order so the markup is stable across renders.
    pub fn to_hidden_fields_html(&self) -> String {
        let mut names: Vec<&String> = self.fields.keys().collect();
        names.sort_unstable();

        let mut html = String::new();
        for name in names {
            if let Some(value) = self.fields.get(name.as_str()) {
                html.push_str(&format!(
                    "<input type=\"hidden\" name=\"{}\" value=\"{}\" />\n",
                    escape_attribute(name),
                    escape_attribute(value),
                ));
            }
        }
        html
    }
}

fn escape_attribute(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Six alphanumeric characters, unique per attempt within the day as far as
/// the platform is concerned. Random rather than sequential so two checkout
/// sessions for the same order never collide.
pub fn generate_trans_id() -> String {
    const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    Uuid::new_v4()
        .as_bytes()
        .iter()
        .take(6)
        .map(|b| ALPHABET[usize::from(*b) % ALPHABET.len()] as char)
        .collect()
}

pub struct RequestBuilder<'a> {
    platform: &'a PlatformConfig,
    variant: &'a VariantDescriptor,
    display: DisplayMode,
    payment_config: String,
    trans_id: Option<String>,
    now: Option<DateTime<Utc>>,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(platform: &'a PlatformConfig, variant: &'a VariantDescriptor) -> Self {
        Self {
            platform,
            variant,
            display: DisplayMode::Redirect,
            payment_config: "SINGLE".to_string(),
            trans_id: None,
            now: None,
        }
    }

    pub fn display(mut self, display: DisplayMode) -> Self {
        self.display = display;
        self
    }

    /// Installment schedule, as produced by
    /// [`crate::gateway::variants::multi_payment_config`].
    pub fn payment_config(mut self, config: String) -> Self {
        self.payment_config = config;
        self
    }

    /// Fix the transaction id instead of generating one. Used by tests and by
    /// retries that must reuse a previously issued id.
    pub fn trans_id(mut self, trans_id: String) -> Self {
        self.trans_id = Some(trans_id);
        self
    }

    /// Fix the clock used for `vads_trans_date`.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Assemble, validate and sign the request for the given order.
    pub fn build(self, order: &OrderInput) -> Result<SignedRequest, GatewayError> {
        if !self
            .variant
            .supports(&order.currency, &order.country, order.amount)
        {
            return Err(GatewayError::UnsupportedOrder {
                variant: self.variant.code.to_string(),
                reason: "order currency, country or amount is out of range".to_string(),
            });
        }

        let trans_id = self.trans_id.unwrap_or_else(generate_trans_id);
        let trans_date = self
            .now
            .unwrap_or_else(Utc::now)
            .format("%Y%m%d%H%M%S")
            .to_string();

        let mut set = HashMap::new();
        let mut put = |name: &str, value: String| {
            set.insert(name.to_string(), value);
        };

        put(fields::VERSION, "V2".to_string());
        put(fields::PAGE_ACTION, self.variant.page_action.to_string());
        put(fields::ACTION_MODE, self.display.action_mode().to_string());
        put(fields::SITE_ID, self.platform.site_id.clone());
        put(fields::CTX_MODE, self.platform.ctx_mode.as_str().to_string());
        put(fields::AMOUNT, order.amount.to_string());
        put(fields::CURRENCY, order.currency.clone());
        put(fields::TRANS_ID, trans_id);
        put(fields::TRANS_DATE, trans_date);
        put(fields::ORDER_ID, order.order_id.to_string());
        put(fields::ORDER_INFO, order.secret_token.clone());
        put(fields::URL_RETURN, self.platform.url_return.clone());
        put(
            fields::RETURN_MODE,
            self.platform.return_mode.as_str().to_string(),
        );
        put(fields::LANGUAGE, self.platform.language.clone());
        put(fields::PAYMENT_CONFIG, self.payment_config.clone());

        let capture_delay = self
            .variant
            .capture_delay
            .unwrap_or(self.platform.capture_delay);
        put(fields::CAPTURE_DELAY, capture_delay.to_string());
        let validation_mode = self
            .variant
            .validation_mode
            .map(str::to_string)
            .unwrap_or_else(|| self.platform.validation_mode.clone());
        put(fields::VALIDATION_MODE, validation_mode);

        let cards = if self.variant.payment_cards.is_empty() {
            self.platform.payment_cards.join(";")
        } else {
            self.variant.payment_cards.join(";")
        };
        put(fields::PAYMENT_CARDS, cards);

        if let Some(email) = &order.customer_email {
            put(fields::CUST_EMAIL, email.clone());
        }
        if let Some(first) = &order.customer_first_name {
            put(fields::CUST_FIRST_NAME, first.clone());
        }
        if let Some(last) = &order.customer_last_name {
            put(fields::CUST_LAST_NAME, last.clone());
        }
        put(fields::CUST_COUNTRY, order.country.clone());
        if let Some(city) = &order.ship_to_city {
            put(fields::SHIP_TO_CITY, city.clone());
        }
        if let Some(country) = &order.ship_to_country {
            put(fields::SHIP_TO_COUNTRY, country.clone());
        }

        // Variant extras last so they win over the base set.
        for (name, value) in self.variant.extra_fields {
            put(name, (*value).to_string());
        }

        for (name, value) in &set {
            fields::validate(name, value)?;
        }

        let signature = signature::sign(&set, self.platform.secret(), self.platform.sign_algorithm);
        set.insert(SIGNATURE_FIELD.to_string(), signature);

        Ok(SignedRequest {
            fields: set,
            platform_url: self.platform.platform_url.clone(),
        })
    }
}
