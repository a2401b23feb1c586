//! Balance validation - wallet hook consulted before a fill

use rust_decimal::Decimal;

use crate::core::Order;

/// Decides whether the wallet can cover an order at its would-be fill
/// price. Returning false makes the engine cancel the order instead of
/// filling it; the engine never asks twice for the same order.
pub trait BalanceValidator: Send + Sync {
    fn sufficient_funds(&self, order: &Order, fill_price: Decimal) -> bool;
}

impl<F> BalanceValidator for F
where
    F: Fn(&Order, Decimal) -> bool + Send + Sync,
{
    fn sufficient_funds(&self, order: &Order, fill_price: Decimal) -> bool {
        self(order, fill_price)
    }
}

/// Caps the notional value (quantity times fill price) of any single
/// order. Stands in for a real wallet lookup in the simulator.
pub struct NotionalCap {
    max_notional: Decimal,
}

impl NotionalCap {
    pub fn new(max_notional: f64) -> Self {
        Self {
            max_notional: Decimal::try_from(max_notional).unwrap_or(Decimal::ZERO),
        }
    }
}

impl BalanceValidator for NotionalCap {
    fn sufficient_funds(&self, order: &Order, fill_price: Decimal) -> bool {
        let notional = order.quantity * fill_price;
        if notional > self.max_notional {
            tracing::warn!(
                "Order {} notional {} exceeds cap {}",
                order.id,
                notional,
                self.max_notional
            );
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Order, OrderRequest, Side, Symbol};

    fn order(quantity: i64) -> Order {
        Order::from_request(OrderRequest::limit(
            Symbol::new("BTCUSDT"),
            Side::Buy,
            Decimal::from(quantity),
            Decimal::from(100),
        ))
    }

    #[test]
    fn test_notional_cap_boundary() {
        let cap = NotionalCap::new(500.0);
        assert!(cap.sufficient_funds(&order(5), Decimal::from(100)));
        assert!(!cap.sufficient_funds(&order(6), Decimal::from(100)));
    }

    #[test]
    fn test_closure_as_validator() {
        let validator = |order: &Order, price: Decimal| order.quantity * price < Decimal::from(1000);
        assert!(validator.sufficient_funds(&order(9), Decimal::from(100)));
        assert!(!validator.sufficient_funds(&order(10), Decimal::from(100)));
    }
}
