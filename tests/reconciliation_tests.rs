//! End-to-end reconciliation scenarios against an in-memory order store.
//!
//! Covers both delivery channels, redelivery, retried payment attempts and
//! the failure modes (bad signature, unknown order, token mismatch, store
//! outage).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use payzen_gateway::config::{CtxMode, PlatformConfig, ReturnMode};
use payzen_gateway::database::error::DatabaseError;
use payzen_gateway::database::orders::{Order, OrderStatus, OrderStore, TransactionFacts};
use payzen_gateway::gateway::response::PaymentResponse;
use payzen_gateway::gateway::signature::{self, SignAlgorithm};
use payzen_gateway::services::reconciliation::{
    AckCode, AckStatus, BrowserOutcome, Notice, ReconciliationEngine,
};

const SECRET: &str = "test-key";
const TOKEN: &str = "tok-42";

struct MockStore {
    orders: Mutex<HashMap<i64, Order>>,
    notes: Mutex<Vec<(i64, String)>>,
    cleared_carts: Mutex<Vec<i64>>,
    fail: AtomicBool,
    // When set, the next status transition behaves as if a concurrent
    // delivery completed the order first: the stored order flips to
    // Completed and the compare-and-set reports a loss.
    deny_next_transition: AtomicBool,
}

impl MockStore {
    fn new() -> Self {
        Self {
            orders: Mutex::new(HashMap::new()),
            notes: Mutex::new(Vec::new()),
            cleared_carts: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            deny_next_transition: AtomicBool::new(false),
        }
    }

    fn with_order(self, order: Order) -> Self {
        self.orders.lock().unwrap().insert(order.id, order);
        self
    }

    fn order(&self, id: i64) -> Order {
        self.orders.lock().unwrap().get(&id).cloned().unwrap()
    }

    fn note_count(&self, id: i64) -> usize {
        self.notes
            .lock()
            .unwrap()
            .iter()
            .filter(|(order_id, _)| *order_id == id)
            .count()
    }

    fn check_available(&self) -> Result<(), DatabaseError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(DatabaseError::Connection("pool timed out".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl OrderStore for MockStore {
    async fn find_order(&self, order_id: i64) -> Result<Option<Order>, DatabaseError> {
        self.check_available()?;
        Ok(self.orders.lock().unwrap().get(&order_id).cloned())
    }

    async fn save_transaction_facts(
        &self,
        order_id: i64,
        facts: &TransactionFacts,
    ) -> Result<(), DatabaseError> {
        self.check_available()?;
        let mut orders = self.orders.lock().unwrap();
        if let Some(order) = orders.get_mut(&order_id) {
            order.trans_id = Some(facts.trans_id.clone());
            order.card_brand = facts.card_brand.clone();
            order.card_expiry = facts.card_expiry.clone();
        }
        Ok(())
    }

    async fn append_note(&self, order_id: i64, note: &str) -> Result<(), DatabaseError> {
        self.check_available()?;
        self.notes.lock().unwrap().push((order_id, note.to_string()));
        Ok(())
    }

    async fn transition_status(
        &self,
        order_id: i64,
        expected_status: OrderStatus,
        expected_trans_id: Option<&str>,
        next_status: OrderStatus,
    ) -> Result<bool, DatabaseError> {
        self.check_available()?;
        let mut orders = self.orders.lock().unwrap();
        if self.deny_next_transition.swap(false, Ordering::SeqCst) {
            if let Some(order) = orders.get_mut(&order_id) {
                order.status = OrderStatus::Completed;
            }
            return Ok(false);
        }
        match orders.get_mut(&order_id) {
            Some(order)
                if order.status == expected_status
                    && order.trans_id.as_deref() == expected_trans_id =>
            {
                order.status = next_status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn clear_cart(&self, order_id: i64) -> Result<(), DatabaseError> {
        self.check_available()?;
        self.cleared_carts.lock().unwrap().push(order_id);
        Ok(())
    }
}

fn pending_order(id: i64) -> Order {
    Order {
        id,
        secret_token: TOKEN.to_string(),
        status: OrderStatus::Pending,
        trans_id: None,
        amount: 15_990,
        currency: "978".to_string(),
        country: "FR".to_string(),
        customer_email: Some("buyer@example.com".to_string()),
        card_brand: None,
        card_expiry: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn platform() -> PlatformConfig {
    PlatformConfig {
        site_id: "12345678".to_string(),
        key_test: SECRET.to_string(),
        key_production: String::new(),
        ctx_mode: CtxMode::Test,
        sign_algorithm: SignAlgorithm::HmacSha256,
        platform_url: "https://secure.payzen.eu/vads-payment/".to_string(),
        capture_delay: 0,
        validation_mode: "0".to_string(),
        payment_cards: vec![],
        return_mode: ReturnMode::Get,
        language: "fr".to_string(),
        url_return: "https://shop.example/payzen/return".to_string(),
        url_success: "/order-received".to_string(),
        url_checkout: "/checkout".to_string(),
        url_cart: "/cart".to_string(),
        session_ttl_secs: 900,
    }
}

fn engine(store: Arc<MockStore>) -> ReconciliationEngine {
    ReconciliationEngine::new(store, platform())
}

/// Build a signed callback payload for order's token.
fn callback(pairs: &[(&str, &str)]) -> PaymentResponse {
    let mut fields: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let sig = signature::sign(&fields, SECRET, SignAlgorithm::Sha1);
    fields.insert("signature".to_string(), sig);
    PaymentResponse::from_fields(fields)
}

fn accepted(order_id: &str, trans_id: &str) -> PaymentResponse {
    callback(&[
        ("vads_result", "00"),
        ("vads_trans_status", "AUTHORISED"),
        ("vads_trans_id", trans_id),
        ("vads_order_id", order_id),
        ("vads_order_info", TOKEN),
        ("vads_amount", "15990"),
        ("vads_currency", "978"),
        ("vads_card_brand", "CB"),
        ("vads_hash", "abc123"),
    ])
}

fn accepted_pending(order_id: &str, trans_id: &str) -> PaymentResponse {
    callback(&[
        ("vads_result", "00"),
        ("vads_trans_status", "AUTHORISED_TO_VALIDATE"),
        ("vads_trans_id", trans_id),
        ("vads_order_id", order_id),
        ("vads_order_info", TOKEN),
        ("vads_amount", "15990"),
        ("vads_currency", "978"),
    ])
}

fn declined(order_id: &str, trans_id: &str) -> PaymentResponse {
    callback(&[
        ("vads_result", "05"),
        ("vads_trans_status", "REFUSED"),
        ("vads_trans_id", trans_id),
        ("vads_order_id", order_id),
        ("vads_order_info", TOKEN),
        ("vads_amount", "15990"),
        ("vads_currency", "978"),
    ])
}

fn cancelled(order_id: &str, trans_id: &str) -> PaymentResponse {
    callback(&[
        ("vads_result", "17"),
        ("vads_trans_id", trans_id),
        ("vads_order_id", order_id),
        ("vads_order_info", TOKEN),
        ("vads_amount", "15990"),
        ("vads_currency", "978"),
    ])
}

#[tokio::test]
async fn accepted_notification_completes_the_order() {
    let store = Arc::new(MockStore::new().with_order(pending_order(1)));
    let engine = engine(store.clone());

    let ack = engine.notify(&accepted("1", "aaa001")).await;
    assert_eq!(ack.status, AckStatus::Ok);
    assert_eq!(ack.code, AckCode::PaymentOk);
    assert_eq!(ack.render("abc123"), format!("OK-abc123={}", ack.message()));

    let order = store.order(1);
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.trans_id.as_deref(), Some("aaa001"));
    assert_eq!(order.card_brand.as_deref(), Some("CB"));
    assert_eq!(store.note_count(1), 1);
}

#[tokio::test]
async fn redelivered_notification_is_a_duplicate() {
    let store = Arc::new(MockStore::new().with_order(pending_order(1)));
    let engine = engine(store.clone());

    let first = engine.notify(&accepted("1", "aaa001")).await;
    assert_eq!(first.code, AckCode::PaymentOk);

    let again = engine.notify(&accepted("1", "aaa001")).await;
    assert_eq!(again.status, AckStatus::Ok);
    assert_eq!(again.code, AckCode::PaymentOkAlreadyDone);

    // The order is untouched by the redelivery.
    assert_eq!(store.order(1).status, OrderStatus::Completed);
    assert_eq!(store.note_count(1), 1);
}

#[tokio::test]
async fn declined_then_retried_attempt_succeeds() {
    let store = Arc::new(MockStore::new().with_order(pending_order(1)));
    let engine = engine(store.clone());

    let ko = engine.notify(&declined("1", "aaa001")).await;
    assert_eq!(ko.status, AckStatus::Ok);
    assert_eq!(ko.code, AckCode::PaymentKo);
    assert_eq!(store.order(1).status, OrderStatus::Failed);

    // Same attempt redelivered: duplicate, no reprocessing.
    let dup = engine.notify(&declined("1", "aaa001")).await;
    assert_eq!(dup.code, AckCode::PaymentKoAlreadyDone);

    // New attempt under a different transaction id: fresh processing.
    let ok = engine.notify(&accepted("1", "bbb002")).await;
    assert_eq!(ok.code, AckCode::PaymentOk);
    let order = store.order(1);
    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.trans_id.as_deref(), Some("bbb002"));
}

#[tokio::test]
async fn pending_acceptance_holds_then_confirms() {
    let store = Arc::new(MockStore::new().with_order(pending_order(1)));
    let engine = engine(store.clone());

    let ack = engine.notify(&accepted_pending("1", "aaa001")).await;
    assert_eq!(ack.code, AckCode::PaymentOk);
    assert_eq!(store.order(1).status, OrderStatus::OnHold);

    // Same pending result again: already registered.
    let dup = engine.notify(&accepted_pending("1", "aaa001")).await;
    assert_eq!(dup.code, AckCode::PaymentOkAlreadyDone);
    assert_eq!(store.order(1).status, OrderStatus::OnHold);

    // The confirmation for the same transaction completes the order.
    let confirm = engine.notify(&accepted("1", "aaa001")).await;
    assert_eq!(confirm.code, AckCode::PaymentOk);
    assert_eq!(store.order(1).status, OrderStatus::Completed);
}

#[tokio::test]
async fn pending_acceptance_can_fall_through() {
    let store = Arc::new(MockStore::new().with_order(pending_order(1)));
    let engine = engine(store.clone());

    engine.notify(&accepted_pending("1", "aaa001")).await;
    assert_eq!(store.order(1).status, OrderStatus::OnHold);

    let ack = engine.notify(&declined("1", "aaa001")).await;
    assert_eq!(ack.code, AckCode::PaymentKo);
    assert_eq!(store.order(1).status, OrderStatus::Failed);
}

#[tokio::test]
async fn non_success_on_paid_order_is_flagged() {
    let store = Arc::new(MockStore::new().with_order(Order {
        status: OrderStatus::Completed,
        trans_id: Some("aaa001".to_string()),
        ..pending_order(1)
    }));
    let engine = engine(store.clone());

    let ack = engine.notify(&declined("1", "aaa001")).await;
    assert_eq!(ack.status, AckStatus::Ko);
    assert_eq!(ack.code, AckCode::PaymentKoOnOrderOk);
    // The paid order is never downgraded.
    assert_eq!(store.order(1).status, OrderStatus::Completed);
}

#[tokio::test]
async fn bad_signature_is_rejected_without_touching_state() {
    let store = Arc::new(MockStore::new().with_order(pending_order(1)));
    let engine = engine(store.clone());

    let mut fields: HashMap<String, String> = [
        ("vads_result", "00"),
        ("vads_trans_id", "aaa001"),
        ("vads_order_id", "1"),
        ("vads_order_info", TOKEN),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    fields.insert("signature".to_string(), "forged".to_string());
    let response = PaymentResponse::from_fields(fields);

    let ack = engine.notify(&response).await;
    assert_eq!(ack.status, AckStatus::Ko);
    assert_eq!(ack.code, AckCode::AuthFail);
    assert_eq!(store.order(1).status, OrderStatus::Pending);
    assert_eq!(store.note_count(1), 0);
}

#[tokio::test]
async fn empty_payload_is_an_invalid_call() {
    let store = Arc::new(MockStore::new());
    let engine = engine(store);

    let response = PaymentResponse::from_fields(HashMap::new());
    let ack = engine.notify(&response).await;
    assert_eq!(ack.status, AckStatus::Ko);
    assert_eq!(ack.code, AckCode::InvalidCall);
}

#[tokio::test]
async fn unknown_order_and_token_mismatch_are_not_found() {
    let store = Arc::new(MockStore::new().with_order(pending_order(1)));
    let engine = engine(store.clone());

    let ack = engine.notify(&accepted("99", "aaa001")).await;
    assert_eq!(ack.code, AckCode::OrderNotFound);

    let forged = callback(&[
        ("vads_result", "00"),
        ("vads_trans_id", "aaa001"),
        ("vads_order_id", "1"),
        ("vads_order_info", "some-other-token"),
    ]);
    let ack = engine.notify(&forged).await;
    assert_eq!(ack.status, AckStatus::Ko);
    assert_eq!(ack.code, AckCode::OrderNotFound);
    assert_eq!(store.order(1).status, OrderStatus::Pending);
}

#[tokio::test]
async fn losing_the_status_race_leaves_no_duplicate_note() {
    let store = Arc::new(MockStore::new().with_order(pending_order(1)));
    store.deny_next_transition.store(true, Ordering::SeqCst);
    let engine = engine(store.clone());

    // The concurrent winner finished first; the loser answers as a
    // duplicate and must not add a second audit note.
    let ack = engine.notify(&accepted("1", "aaa001")).await;
    assert_eq!(ack.status, AckStatus::Ok);
    assert_eq!(ack.code, AckCode::PaymentOkAlreadyDone);
    assert_eq!(store.order(1).status, OrderStatus::Completed);
    assert_eq!(store.note_count(1), 0);
}

#[tokio::test]
async fn store_outage_asks_the_platform_to_retry() {
    let store = Arc::new(MockStore::new().with_order(pending_order(1)));
    store.fail.store(true, Ordering::SeqCst);
    let engine = engine(store.clone());

    let ack = engine.notify(&accepted("1", "aaa001")).await;
    assert_eq!(ack.status, AckStatus::Ko);
    assert_eq!(ack.code, AckCode::StoreUnavailable);

    // Recovery: the redelivered notification processes normally.
    store.fail.store(false, Ordering::SeqCst);
    let ack = engine.notify(&accepted("1", "aaa001")).await;
    assert_eq!(ack.code, AckCode::PaymentOk);
    assert_eq!(store.order(1).status, OrderStatus::Completed);
}

#[tokio::test]
async fn browser_return_redirects_by_outcome() {
    let store = Arc::new(MockStore::new().with_order(pending_order(1)));
    let engine = engine(store.clone());

    let outcome = engine.handle_return(&accepted("1", "aaa001")).await;
    assert_eq!(outcome, BrowserOutcome::Success { order_id: 1 });
    assert_eq!(outcome.redirect_target(&platform()), "/order-received?order_id=1");

    // Same result through the browser after the notification: still success.
    let outcome = engine.handle_return(&accepted("1", "aaa001")).await;
    assert_eq!(outcome, BrowserOutcome::Success { order_id: 1 });
}

#[tokio::test]
async fn cancelled_and_declined_returns_go_back_to_checkout() {
    let store = Arc::new(MockStore::new().with_order(pending_order(1)));
    let engine = engine(store.clone());

    let outcome = engine.handle_return(&cancelled("1", "aaa001")).await;
    assert_eq!(
        outcome,
        BrowserOutcome::Checkout {
            notice: Notice::Cancelled
        }
    );
    assert_eq!(store.order(1).status, OrderStatus::Failed);

    let outcome = engine.handle_return(&declined("1", "bbb002")).await;
    assert_eq!(
        outcome,
        BrowserOutcome::Checkout {
            notice: Notice::TryAgain
        }
    );
}

#[tokio::test]
async fn failed_lookup_on_browser_return_clears_the_cart() {
    let store = Arc::new(MockStore::new().with_order(pending_order(1)));
    let engine = engine(store.clone());

    // Unknown order and token mismatch are the same lookup failure on the
    // browser channel: back to the cart, cart cleared.
    let outcome = engine.handle_return(&accepted("99", "aaa001")).await;
    assert_eq!(
        outcome,
        BrowserOutcome::Cart {
            notice: Notice::ProcessingError
        }
    );

    let forged = callback(&[
        ("vads_result", "00"),
        ("vads_trans_id", "aaa001"),
        ("vads_order_id", "1"),
        ("vads_order_info", "some-other-token"),
    ]);
    let outcome = engine.handle_return(&forged).await;
    assert_eq!(
        outcome,
        BrowserOutcome::Cart {
            notice: Notice::ProcessingError
        }
    );

    assert_eq!(store.cleared_carts.lock().unwrap().as_slice(), &[99, 1]);
    assert_eq!(store.order(1).status, OrderStatus::Pending);
}

#[tokio::test]
async fn inconsistent_browser_return_clears_the_cart() {
    let store = Arc::new(MockStore::new().with_order(Order {
        status: OrderStatus::Completed,
        trans_id: Some("aaa001".to_string()),
        ..pending_order(1)
    }));
    let engine = engine(store.clone());

    let outcome = engine.handle_return(&declined("1", "aaa001")).await;
    assert_eq!(
        outcome,
        BrowserOutcome::Cart {
            notice: Notice::ProcessingError
        }
    );
    assert_eq!(store.cleared_carts.lock().unwrap().as_slice(), &[1]);
}

#[tokio::test]
async fn both_channels_agree_on_the_final_state() {
    // Notification first, then browser return, and the reverse order, must
    // converge on the same completed order.
    for notification_first in [true, false] {
        let store = Arc::new(MockStore::new().with_order(pending_order(1)));
        let engine = engine(store.clone());
        let response = accepted("1", "aaa001");

        if notification_first {
            let ack = engine.notify(&response).await;
            assert_eq!(ack.code, AckCode::PaymentOk);
            let outcome = engine.handle_return(&response).await;
            assert_eq!(outcome, BrowserOutcome::Success { order_id: 1 });
        } else {
            let outcome = engine.handle_return(&response).await;
            assert_eq!(outcome, BrowserOutcome::Success { order_id: 1 });
            let ack = engine.notify(&response).await;
            assert_eq!(ack.code, AckCode::PaymentOkAlreadyDone);
        }

        assert_eq!(store.order(1).status, OrderStatus::Completed);
        assert_eq!(store.note_count(1), 1);
    }
}
