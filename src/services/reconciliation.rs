//! Reconciliation of inbound payment results against order state.
//!
//! The platform reports each payment twice: an asynchronous server
//! notification and the customer's browser return, in either order, with the
//! server side redelivering on timeout. The engine therefore decides every
//! transition from the order's current persisted state, never from call
//! history: re-entering with the same response yields the same final state and
//! an "already done" answer, and the one mutating path is gated by an atomic
//! compare-and-set so racing deliveries cannot double-apply side effects.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::PlatformConfig;
use crate::database::orders::{Order, OrderStatus, OrderStore, TransactionFacts};
use crate::gateway::classifier::{classify, PaymentOutcome};
use crate::gateway::response::{BrandChoice, PaymentResponse};

/// Delivery channel of an inbound callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Asynchronous server-to-server notification; answered with the
    /// acknowledgement line contract.
    Server,
    /// Customer's browser returning from the hosted page; always answered
    /// with a redirect.
    Browser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckStatus {
    Ok,
    Ko,
}

impl AckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AckStatus::Ok => "OK",
            AckStatus::Ko => "KO",
        }
    }
}

/// Distinct acknowledgement codes, one per terminal outcome, so operators can
/// tell a replay from an integrity violation in the platform logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckCode {
    PaymentOk,
    PaymentOkAlreadyDone,
    PaymentKo,
    PaymentKoAlreadyDone,
    PaymentKoOnOrderOk,
    AuthFail,
    OrderNotFound,
    InvalidCall,
    StoreUnavailable,
}

/// Server-channel answer, rendered byte-for-byte as
/// `STATUS-<echoed-hash>=<message>` for platform compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledgement {
    pub status: AckStatus,
    pub code: AckCode,
}

impl Acknowledgement {
    fn new(status: AckStatus, code: AckCode) -> Self {
        Self { status, code }
    }

    pub fn message(&self) -> &'static str {
        match self.code {
            AckCode::PaymentOk => "Accepted payment, order has been updated.",
            AckCode::PaymentOkAlreadyDone => "Accepted payment, already registered.",
            AckCode::PaymentKo => "Payment failure, order has been cancelled.",
            AckCode::PaymentKoAlreadyDone => "Payment failure, already registered.",
            AckCode::PaymentKoOnOrderOk => {
                "Order status does not match the payment result."
            }
            AckCode::AuthFail => "An error occurred while computing the signature.",
            AckCode::OrderNotFound => "Order not found.",
            AckCode::InvalidCall => "Invalid call received.",
            AckCode::StoreUnavailable => "Order could not be updated, please retry.",
        }
    }

    /// Render the acknowledgement line, echoing the transport hash the
    /// notification carried (empty when absent).
    pub fn render(&self, echoed_hash: &str) -> String {
        format!("{}-{}={}", self.status.as_str(), echoed_hash, self.message())
    }
}

/// Localisable notice shown to the customer after a browser return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    TryAgain,
    Cancelled,
    ProcessingError,
    TemporaryError,
}

impl Notice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Notice::TryAgain => "payment_failed",
            Notice::Cancelled => "payment_cancelled",
            Notice::ProcessingError => "processing_error",
            Notice::TemporaryError => "temporary_error",
        }
    }
}

/// Browser-channel answer: always a redirect to an order-adjacent shop page,
/// never the raw acknowledgement string and never a blank page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserOutcome {
    Success { order_id: i64 },
    Checkout { notice: Notice },
    Cart { notice: Notice },
}

impl BrowserOutcome {
    /// Target URL for the 303 redirect ending the browser request.
    pub fn redirect_target(&self, platform: &PlatformConfig) -> String {
        match self {
            BrowserOutcome::Success { order_id } => {
                format!("{}?order_id={}", platform.url_success, order_id)
            }
            BrowserOutcome::Checkout { notice } => {
                format!("{}?notice={}", platform.url_checkout, notice.as_str())
            }
            BrowserOutcome::Cart { notice } => {
                format!("{}?notice={}", platform.url_cart, notice.as_str())
            }
        }
    }
}

/// Channel-independent result of reconciling one response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Fresh(PaymentOutcome),
    DuplicateSuccess,
    DuplicateFailure,
    /// Verified non-success result for an order already in the paid class.
    Inconsistent,
    AuthFailed,
    NotFound,
    InvalidCall,
    StoreDown,
}

/// Logical classes the engine folds the store status into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogicalState {
    Unprocessed,
    PendingConfirmation,
    Paid,
    TerminallyFailed,
}

fn logical_state(order: &Order, incoming_trans_id: &str) -> LogicalState {
    let same_attempt = order.trans_id.as_deref() == Some(incoming_trans_id);
    if order.status.is_paid() {
        LogicalState::Paid
    } else if order.status == OrderStatus::OnHold && same_attempt {
        LogicalState::PendingConfirmation
    } else if order.status.is_terminal_failure() && same_attempt {
        LogicalState::TerminallyFailed
    } else {
        // A different transaction id under any non-paid status is a fresh
        // payment attempt for the same order.
        LogicalState::Unprocessed
    }
}

pub struct ReconciliationEngine {
    store: Arc<dyn OrderStore>,
    platform: PlatformConfig,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn OrderStore>, platform: PlatformConfig) -> Self {
        Self { store, platform }
    }

    /// Server channel entry point. Always terminates with an acknowledgement.
    pub async fn notify(&self, response: &PaymentResponse) -> Acknowledgement {
        let disposition = self.reconcile(response, Channel::Server).await;
        let ack = match disposition {
            Disposition::Fresh(outcome) if outcome.is_accepted() => {
                Acknowledgement::new(AckStatus::Ok, AckCode::PaymentOk)
            }
            Disposition::Fresh(_) => Acknowledgement::new(AckStatus::Ok, AckCode::PaymentKo),
            Disposition::DuplicateSuccess => {
                Acknowledgement::new(AckStatus::Ok, AckCode::PaymentOkAlreadyDone)
            }
            Disposition::DuplicateFailure => {
                Acknowledgement::new(AckStatus::Ok, AckCode::PaymentKoAlreadyDone)
            }
            Disposition::Inconsistent => {
                Acknowledgement::new(AckStatus::Ko, AckCode::PaymentKoOnOrderOk)
            }
            Disposition::AuthFailed => Acknowledgement::new(AckStatus::Ko, AckCode::AuthFail),
            Disposition::NotFound => Acknowledgement::new(AckStatus::Ko, AckCode::OrderNotFound),
            Disposition::InvalidCall => Acknowledgement::new(AckStatus::Ko, AckCode::InvalidCall),
            Disposition::StoreDown => {
                Acknowledgement::new(AckStatus::Ko, AckCode::StoreUnavailable)
            }
        };
        info!(
            order_id = ?response.order_id,
            trans_id = ?response.trans_id,
            code = ?ack.code,
            "server notification reconciled"
        );
        ack
    }

    /// Browser channel entry point. Always terminates with a redirect target.
    pub async fn handle_return(&self, response: &PaymentResponse) -> BrowserOutcome {
        let disposition = self.reconcile(response, Channel::Browser).await;
        let outcome = match disposition {
            Disposition::Fresh(PaymentOutcome::Accepted { .. })
            | Disposition::DuplicateSuccess => BrowserOutcome::Success {
                order_id: response.order_id.unwrap_or_default(),
            },
            Disposition::Fresh(PaymentOutcome::Declined) | Disposition::DuplicateFailure => {
                BrowserOutcome::Checkout {
                    notice: Notice::TryAgain,
                }
            }
            Disposition::Fresh(PaymentOutcome::Cancelled) => BrowserOutcome::Checkout {
                notice: Notice::Cancelled,
            },
            Disposition::Inconsistent
            | Disposition::AuthFailed
            | Disposition::NotFound
            | Disposition::InvalidCall => BrowserOutcome::Cart {
                notice: Notice::ProcessingError,
            },
            Disposition::StoreDown => BrowserOutcome::Cart {
                notice: Notice::TemporaryError,
            },
        };
        info!(
            order_id = ?response.order_id,
            outcome = ?outcome,
            iframe = response.is_iframe(),
            "browser return reconciled"
        );
        outcome
    }

    async fn reconcile(&self, response: &PaymentResponse, channel: Channel) -> Disposition {
        if response.is_empty() {
            warn!("callback without any platform field");
            return Disposition::InvalidCall;
        }
        if !response.is_authentified(self.platform.secret()) {
            warn!(order_id = ?response.order_id, "callback signature verification failed");
            return Disposition::AuthFailed;
        }
        let Some(trans_id) = response.trans_id.clone() else {
            warn!(order_id = ?response.order_id, "verified callback without transaction id");
            return Disposition::InvalidCall;
        };
        let Some(order_id) = response.order_id else {
            return Disposition::NotFound;
        };

        let order = match self.store.find_order(order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => {
                warn!(order_id, "callback for unknown order");
                return self.lookup_failure(order_id, channel).await;
            }
            Err(e) => {
                error!(order_id, error = %e, "order lookup failed");
                return Disposition::StoreDown;
            }
        };

        if response.order_info.as_deref() != Some(order.secret_token.as_str()) {
            warn!(order_id, "order secret token mismatch, possible forgery");
            return self.lookup_failure(order_id, channel).await;
        }

        let mut order = order;
        // One retry: losing the status compare-and-set means a concurrent
        // delivery finished first; re-read and answer as a duplicate.
        for _ in 0..2 {
            match logical_state(&order, &trans_id) {
                LogicalState::Unprocessed => {
                    let outcome = classify(response);
                    match self.apply_fresh(&order, response, outcome).await {
                        Ok(true) => return Disposition::Fresh(outcome),
                        Ok(false) => match self.store.find_order(order_id).await {
                            Ok(Some(reloaded)) => {
                                order = reloaded;
                                continue;
                            }
                            _ => return Disposition::StoreDown,
                        },
                        Err(_) => return Disposition::StoreDown,
                    }
                }
                LogicalState::PendingConfirmation => {
                    let outcome = classify(response);
                    match outcome {
                        // The confirmation the on-hold order was waiting for.
                        PaymentOutcome::Accepted { pending: false } => {
                            match self.apply_fresh(&order, response, outcome).await {
                                Ok(true) => return Disposition::Fresh(outcome),
                                Ok(false) => match self.store.find_order(order_id).await {
                                    Ok(Some(reloaded)) => {
                                        order = reloaded;
                                        continue;
                                    }
                                    _ => return Disposition::StoreDown,
                                },
                                Err(_) => return Disposition::StoreDown,
                            }
                        }
                        PaymentOutcome::Accepted { pending: true } => {
                            return Disposition::DuplicateSuccess;
                        }
                        // The pending authorization fell through.
                        PaymentOutcome::Declined | PaymentOutcome::Cancelled => {
                            match self.apply_fresh(&order, response, outcome).await {
                                Ok(true) => return Disposition::Fresh(outcome),
                                Ok(false) => match self.store.find_order(order_id).await {
                                    Ok(Some(reloaded)) => {
                                        order = reloaded;
                                        continue;
                                    }
                                    _ => return Disposition::StoreDown,
                                },
                                Err(_) => return Disposition::StoreDown,
                            }
                        }
                    }
                }
                LogicalState::Paid => {
                    if classify(response).is_accepted() {
                        return Disposition::DuplicateSuccess;
                    }
                    error!(
                        order_id,
                        trans_id = %trans_id,
                        result = ?response.result_code,
                        "non-success result for an order already paid"
                    );
                    if channel == Channel::Browser {
                        self.clear_cart_best_effort(order_id).await;
                    }
                    return Disposition::Inconsistent;
                }
                LogicalState::TerminallyFailed => return Disposition::DuplicateFailure,
            }
        }

        error!(order_id, "reconciliation kept losing the status update race");
        Disposition::StoreDown
    }

    /// First processing of a payment attempt: persist transaction facts
    /// (overwriting whatever a prior attempt left), then move the status with
    /// a compare-and-set keyed on the status read at dispatch time and on the
    /// incoming transaction id the facts write just recorded. The audit note
    /// is appended only once the CAS wins, so the loser of a same-attempt
    /// race leaves no duplicate note. Returns Ok(false) when the CAS lost.
    async fn apply_fresh(
        &self,
        order: &Order,
        response: &PaymentResponse,
        outcome: PaymentOutcome,
    ) -> Result<bool, crate::database::error::DatabaseError> {
        let trans_id = response.trans_id.clone().unwrap_or_default();
        let facts = TransactionFacts {
            trans_id: trans_id.clone(),
            card_brand: response.card_brand.clone(),
            card_expiry: response.expiry(),
        };
        self.store.save_transaction_facts(order.id, &facts).await?;

        let next_status = match outcome {
            PaymentOutcome::Accepted { pending: true } => OrderStatus::OnHold,
            // The only transition that may fire paid side effects downstream.
            PaymentOutcome::Accepted { pending: false } => OrderStatus::Completed,
            PaymentOutcome::Declined | PaymentOutcome::Cancelled => OrderStatus::Failed,
        };
        let applied = self
            .store
            .transition_status(order.id, order.status, Some(&trans_id), next_status)
            .await?;
        if applied {
            self.store
                .append_note(order.id, &reconciliation_note(response))
                .await?;
            info!(
                order_id = order.id,
                trans_id = %trans_id,
                from = %order.status,
                to = %next_status,
                "order status updated"
            );
        }
        Ok(applied)
    }

    async fn lookup_failure(&self, order_id: i64, channel: Channel) -> Disposition {
        if channel == Channel::Browser {
            self.clear_cart_best_effort(order_id).await;
        }
        Disposition::NotFound
    }

    async fn clear_cart_best_effort(&self, order_id: i64) {
        if let Err(e) = self.store.clear_cart(order_id).await {
            warn!(order_id, error = %e, "cart clearing failed");
        }
    }
}

/// Human-readable audit line derived from a verified response.
fn reconciliation_note(response: &PaymentResponse) -> String {
    let brand = response.card_brand.as_deref().unwrap_or("unknown brand");
    let chooser = match response.brand_choice {
        BrandChoice::Buyer => " (brand chosen by buyer)",
        BrandChoice::Platform => " (brand chosen by platform)",
        BrandChoice::Unknown => "",
    };
    format!(
        "Payment reconciled: transaction {}, amount {} (currency {}), status {}, {}{}",
        response.trans_id.as_deref().unwrap_or("?"),
        response.formatted_amount(),
        response.currency.as_deref().unwrap_or("?"),
        response
            .trans_status
            .as_ref()
            .map(|s| s.as_str())
            .unwrap_or("?"),
        brand,
        chooser,
    )
}
