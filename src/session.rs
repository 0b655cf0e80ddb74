use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::cart_key::CartKey;

/// One line of an anonymous cart. Only the product id is stored, never a
/// live product reference, so lines can outlive the product; the price is
/// snapshotted at add time (in minor units).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionLine {
    pub product_id: Uuid,
    pub size: String,
    pub color: Option<String>,
    pub quantity: i32,
    pub price: i64,
}

/// In-process store for anonymous carts, keyed by the caller's session id.
///
/// A cart is created empty on first touch, lives for the session's
/// lifetime, and is taken out wholesale when merged into a database cart
/// at login. Mutations for one session are never concurrent in practice
/// (single browser session), so a plain mutex over the whole map is
/// enough.
#[derive(Clone, Default)]
pub struct SessionCarts {
    inner: Arc<Mutex<HashMap<String, BTreeMap<String, SessionLine>>>>,
}

impl SessionCarts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the matching line, or create it at quantity 1.
    pub fn add(&self, session_id: &str, key: &CartKey, price: i64) {
        let mut carts = self.inner.lock().expect("session store poisoned");
        let cart = carts.entry(session_id.to_string()).or_default();
        cart.entry(key.to_string())
            .and_modify(|line| line.quantity += 1)
            .or_insert(SessionLine {
                product_id: key.product_id,
                size: key.size.clone(),
                color: key.color.clone(),
                quantity: 1,
                price,
            });
    }

    /// Set the quantity for a line; a quantity of zero or less removes it.
    pub fn update(&self, session_id: &str, key: &CartKey, quantity: i32) {
        let mut carts = self.inner.lock().expect("session store poisoned");
        let Some(cart) = carts.get_mut(session_id) else {
            return;
        };
        let encoded = key.to_string();
        if quantity > 0 {
            if let Some(line) = cart.get_mut(&encoded) {
                line.quantity = quantity;
            }
        } else {
            cart.remove(&encoded);
        }
    }

    /// Remove a line; no-op when absent.
    pub fn remove(&self, session_id: &str, key: &CartKey) {
        let mut carts = self.inner.lock().expect("session store poisoned");
        if let Some(cart) = carts.get_mut(session_id) {
            cart.remove(&key.to_string());
        }
    }

    pub fn lines(&self, session_id: &str) -> Vec<(String, SessionLine)> {
        let carts = self.inner.lock().expect("session store poisoned");
        carts
            .get(session_id)
            .map(|cart| {
                cart.iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn total_price(&self, session_id: &str) -> i64 {
        let carts = self.inner.lock().expect("session store poisoned");
        carts
            .get(session_id)
            .map(|cart| {
                cart.values()
                    .map(|line| line.price * i64::from(line.quantity))
                    .sum()
            })
            .unwrap_or(0)
    }

    pub fn clear(&self, session_id: &str) {
        let mut carts = self.inner.lock().expect("session store poisoned");
        carts.remove(session_id);
    }

    /// Remove the session cart and hand its lines to the caller. Used by
    /// the login merge: the cart is gone from the store no matter what
    /// happens to the individual lines afterwards, so a partially failed
    /// merge is never replayed on a later login.
    pub fn take(&self, session_id: &str) -> Vec<SessionLine> {
        let mut carts = self.inner.lock().expect("session store poisoned");
        carts
            .remove(session_id)
            .map(|cart| cart.into_values().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(size: &str, color: Option<&str>) -> CartKey {
        CartKey::new(
            Uuid::parse_str("7f2c1a9e-9b1d-4a4e-8f63-0d3b5a2c1e10").unwrap(),
            size,
            color.map(String::from),
        )
    }

    #[test]
    fn add_increments_existing_line() {
        let store = SessionCarts::new();
        let k = key("M", None);
        store.add("s1", &k, 1000);
        store.add("s1", &k, 1000);
        let lines = store.lines("s1");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].1.quantity, 2);
    }

    #[test]
    fn distinct_variants_get_distinct_lines() {
        let store = SessionCarts::new();
        store.add("s1", &key("M", None), 1000);
        store.add("s1", &key("M", Some("red")), 1000);
        assert_eq!(store.lines("s1").len(), 2);
    }

    #[test]
    fn update_zero_removes_line() {
        let store = SessionCarts::new();
        let k = key("M", None);
        store.add("s1", &k, 1000);
        store.update("s1", &k, 5);
        assert_eq!(store.lines("s1")[0].1.quantity, 5);
        store.update("s1", &k, 0);
        assert!(store.lines("s1").is_empty());
    }

    #[test]
    fn remove_is_noop_when_absent() {
        let store = SessionCarts::new();
        store.remove("s1", &key("M", None));
        assert!(store.lines("s1").is_empty());
    }

    #[test]
    fn total_is_sum_of_price_times_quantity() {
        let store = SessionCarts::new();
        let a = key("M", None);
        let b = key("L", None);
        store.add("s1", &a, 1000);
        store.add("s1", &a, 1000);
        store.add("s1", &b, 250);
        assert_eq!(store.total_price("s1"), 2 * 1000 + 250);
    }

    #[test]
    fn take_drains_the_session() {
        let store = SessionCarts::new();
        store.add("s1", &key("M", None), 1000);
        let lines = store.take("s1");
        assert_eq!(lines.len(), 1);
        assert!(store.lines("s1").is_empty());
        assert_eq!(store.total_price("s1"), 0);
    }

    #[test]
    fn sessions_are_isolated() {
        let store = SessionCarts::new();
        store.add("s1", &key("M", None), 1000);
        assert!(store.lines("s2").is_empty());
        store.clear("s2");
        assert_eq!(store.lines("s1").len(), 1);
    }
}
