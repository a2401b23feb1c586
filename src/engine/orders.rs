//! Order store - pending order lifecycle
//!
//! Plain map guarded by the engine's lock. Orders stay in the map after
//! they reach a terminal status so callers can still look them up; only
//! the pending view feeds the matching pass.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::core::{Order, OrderStatus, Symbol};

/// In-memory store of every order seen this session, keyed by id.
///
/// The persistence backend may re-key an order after the fact; the store
/// keeps an alias from each replaced id to its successor so references
/// taken before the rebind still resolve.
#[derive(Debug, Default)]
pub struct OrderStore {
    orders: HashMap<String, Order>,
    aliases: HashMap<String, String>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow the alias chain until an id that is actually in the map.
    fn resolve<'a>(&'a self, id: &'a str) -> &'a str {
        let mut current = id;
        let mut hops = 0;
        while !self.orders.contains_key(current) && hops < 8 {
            match self.aliases.get(current) {
                Some(next) => {
                    current = next;
                    hops += 1;
                }
                None => break,
            }
        }
        current
    }

    pub fn insert(&mut self, order: Order) {
        self.orders.insert(order.id.clone(), order);
    }

    pub fn get(&self, id: &str) -> Option<&Order> {
        let id = self.resolve(id);
        self.orders.get(id)
    }

    /// Re-key an order under the id the backend assigned. The old id keeps
    /// resolving through an alias. Returns false when the order is unknown
    /// or the new id is already taken.
    pub fn rebind(&mut self, old_id: &str, new_id: &str) -> bool {
        if old_id == new_id {
            return true;
        }
        let resolved = self.resolve(old_id).to_string();
        if self.orders.contains_key(new_id) {
            return false;
        }
        let Some(mut order) = self.orders.remove(&resolved) else {
            return false;
        };
        order.id = new_id.to_string();
        self.orders.insert(new_id.to_string(), order);
        self.aliases.insert(resolved, new_id.to_string());
        true
    }

    /// Move a pending order to filled and stamp the fill. Returns the
    /// updated order, or None when the order is missing or already
    /// terminal (a cancel can race the tick that would have filled it).
    pub fn mark_filled(&mut self, id: &str, price: Decimal, quantity: Decimal) -> Option<Order> {
        let id = self.resolve(id).to_string();
        let order = self.orders.get_mut(&id)?;
        if order.status.is_terminal() {
            return None;
        }
        order.status = OrderStatus::Filled;
        order.filled_price = Some(price);
        order.filled_quantity = Some(quantity);
        Some(order.clone())
    }

    /// Cancel a pending order. Returns None when it is missing or already
    /// terminal, so a cancel arriving after the fill reports failure
    /// instead of clobbering the fill.
    pub fn cancel(&mut self, id: &str) -> Option<Order> {
        let id = self.resolve(id).to_string();
        let order = self.orders.get_mut(&id)?;
        if order.status.is_terminal() {
            return None;
        }
        order.status = OrderStatus::Cancelled;
        Some(order.clone())
    }

    /// Pending orders, oldest first, optionally restricted to one symbol.
    pub fn pending(&self, symbol: Option<&Symbol>) -> Vec<Order> {
        let mut out: Vec<Order> = self
            .orders
            .values()
            .filter(|o| o.is_pending())
            .filter(|o| symbol.is_none_or(|s| &o.symbol == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}
