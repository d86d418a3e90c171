//! Maps the platform result vocabulary onto the four logical payment outcomes.

use crate::gateway::response::PaymentResponse;

/// Primary result code meaning the payment went through.
pub const RESULT_SUCCESS: &str = "00";
/// Primary result code meaning the buyer interrupted the payment.
pub const RESULT_ABANDONED: &str = "17";

/// Logical outcome of a payment attempt. Pending is a sub-state of Accepted:
/// authorised, but capture/guarantee still requires merchant validation or a
/// funds check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Accepted { pending: bool },
    Cancelled,
    Declined,
}

impl PaymentOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PaymentOutcome::Accepted { .. })
    }
}

/// Classify a verified response. Total over all inputs: any code that is
/// neither the success code nor the buyer-interruption code is Declined, so an
/// unknown code can never leave an order stuck.
pub fn classify(response: &PaymentResponse) -> PaymentOutcome {
    match response.result_code.as_deref() {
        Some(RESULT_SUCCESS) => PaymentOutcome::Accepted {
            pending: response
                .trans_status
                .as_ref()
                .is_some_and(|status| status.is_waiting()),
        },
        Some(RESULT_ABANDONED) => PaymentOutcome::Cancelled,
        _ => PaymentOutcome::Declined,
    }
}
