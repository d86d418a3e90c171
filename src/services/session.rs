//! Short-lived checkout sessions.
//!
//! A session pins the transaction id issued when the payment form was built,
//! so a browser return can be matched against the attempt that actually left
//! the shop. Entries live in process memory with a TTL; losing them on restart
//! is acceptable because the server notification path never depends on them.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

/// What the checkout flow needs to remember between form render and return.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub order_id: i64,
    pub trans_id: String,
    pub variant: String,
}

struct Entry {
    session: CheckoutSession,
    expires_at: Instant,
}

pub struct CheckoutSessionStore {
    ttl: Duration,
    entries: RwLock<HashMap<i64, Entry>>,
}

impl CheckoutSessionStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::from_secs(ttl_secs),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Register a session for an order, replacing any previous attempt.
    pub async fn put(&self, session: CheckoutSession) {
        let order_id = session.order_id;
        let entry = Entry {
            session,
            expires_at: Instant::now() + self.ttl,
        };
        self.entries.write().await.insert(order_id, entry);
        debug!(order_id, "checkout session stored");
    }

    /// Take the live session for an order, consuming it. Expired entries are
    /// treated as absent.
    pub async fn take(&self, order_id: i64) -> Option<CheckoutSession> {
        let mut entries = self.entries.write().await;
        match entries.remove(&order_id) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.session),
            Some(_) => {
                debug!(order_id, "checkout session expired");
                None
            }
            None => None,
        }
    }

    /// Drop every expired entry. Called opportunistically from the checkout
    /// handler so the map cannot grow without bound.
    pub async fn purge_expired(&self) {
        let now = Instant::now();
        self.entries
            .write()
            .await
            .retain(|_, entry| entry.expires_at > now);
    }
}
