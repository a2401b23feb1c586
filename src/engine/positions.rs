//! Position store - weighted-average position tracking
//!
//! At most one open position per symbol. Same-direction fills merge into
//! the weighted-average entry; opposite-direction fills realize PnL
//! against it and shrink or close it. Crossing through zero is clamped:
//! the excess quantity is dropped rather than flipping the direction.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::core::{ClosedPosition, CloseReason, Order, Position, PositionSnapshot, Symbol};

/// What applying one fill did to the position book.
#[derive(Debug, Clone)]
pub enum FillEffect {
    /// No position existed; one was opened.
    Opened(Position),
    /// Same-direction fill merged into the existing position.
    Extended(Position),
    /// Opposite-direction fill shrank the position but left it open.
    Reduced {
        position: Position,
        closed_quantity: Decimal,
        realized: Decimal,
    },
    /// Opposite-direction fill closed the position. `excess` is the fill
    /// quantity beyond the position size that was clamped away.
    Closed {
        closed: ClosedPosition,
        excess: Decimal,
    },
}

/// In-memory book of open positions, keyed by symbol.
#[derive(Debug, Default)]
pub struct PositionStore {
    positions: HashMap<Symbol, Position>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, symbol: &Symbol) -> Option<&Position> {
        self.positions.get(symbol)
    }

    /// All open positions, ordered by symbol.
    pub fn list(&self) -> Vec<Position> {
        let mut out: Vec<Position> = self.positions.values().cloned().collect();
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        out
    }

    /// All open positions with live PnL against the given mark price.
    pub fn snapshots(&self, mark_price: Decimal) -> Vec<PositionSnapshot> {
        self.list()
            .into_iter()
            .map(|p| PositionSnapshot::at(p, mark_price))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Fold a filled order into the book.
    pub fn apply_fill(&mut self, order: &Order, fill_price: Decimal) -> FillEffect {
        let direction = order.direction();
        let quantity = order.quantity;

        let Some(position) = self.positions.get_mut(&order.symbol) else {
            let position = Position {
                symbol: order.symbol.clone(),
                direction,
                entry_price: fill_price,
                quantity,
                take_profit: order.take_profit,
                stop_loss: order.stop_loss,
                realized_pnl: Decimal::ZERO,
                opened_at: Utc::now(),
            };
            self.positions.insert(order.symbol.clone(), position.clone());
            return FillEffect::Opened(position);
        };

        if position.direction == direction {
            // Weighted-average merge. Thresholds on the order overwrite,
            // absent ones keep what the position already has.
            let old_notional = position.entry_price * position.quantity;
            let new_notional = fill_price * quantity;
            position.quantity += quantity;
            position.entry_price = (old_notional + new_notional) / position.quantity;
            position.take_profit = order.take_profit.or(position.take_profit);
            position.stop_loss = order.stop_loss.or(position.stop_loss);
            return FillEffect::Extended(position.clone());
        }

        if quantity < position.quantity {
            let realized = position.direction.pnl(position.entry_price, fill_price, quantity);
            position.quantity -= quantity;
            position.realized_pnl += realized;
            return FillEffect::Reduced {
                position: position.clone(),
                closed_quantity: quantity,
                realized,
            };
        }

        let excess = quantity - position.quantity;
        let closed = Self::build_closed(position, fill_price, CloseReason::OpposingFill);
        self.positions.remove(&order.symbol);
        FillEffect::Closed { closed, excess }
    }

    /// Replace both thresholds on an open position. None clears a side.
    pub fn update_thresholds(
        &mut self,
        symbol: &Symbol,
        take_profit: Option<Decimal>,
        stop_loss: Option<Decimal>,
    ) -> Option<Position> {
        let position = self.positions.get_mut(symbol)?;
        position.take_profit = take_profit;
        position.stop_loss = stop_loss;
        Some(position.clone())
    }

    /// Close the full position at the given price. None when no position
    /// is open for the symbol.
    pub fn close(
        &mut self,
        symbol: &Symbol,
        exit_price: Decimal,
        reason: CloseReason,
    ) -> Option<ClosedPosition> {
        let position = self.positions.get(symbol)?;
        let closed = Self::build_closed(position, exit_price, reason);
        self.positions.remove(symbol);
        Some(closed)
    }

    fn build_closed(position: &Position, exit_price: Decimal, reason: CloseReason) -> ClosedPosition {
        let final_chunk =
            position
                .direction
                .pnl(position.entry_price, exit_price, position.quantity);
        let realized_pnl = position.realized_pnl + final_chunk;
        let basis = position.entry_price * position.quantity;
        let pnl_percent = if basis.is_zero() {
            Decimal::ZERO
        } else {
            realized_pnl / basis * Decimal::from(100)
        };
        ClosedPosition {
            symbol: position.symbol.clone(),
            direction: position.direction,
            quantity: position.quantity,
            entry_price: position.entry_price,
            exit_price,
            realized_pnl,
            pnl_percent,
            reason,
            closed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Direction, OrderRequest, Side};

    fn filled(symbol: &str, side: Side, quantity: i64, price: i64) -> Order {
        let req = OrderRequest::limit(
            Symbol::new(symbol),
            side,
            Decimal::from(quantity),
            Decimal::from(price),
        )
        .with_stop_loss(Decimal::ONE);
        Order::from_request(req)
    }

    #[test]
    fn test_open_from_buy_fill() {
        let mut store = PositionStore::new();
        let order = filled("BTCUSDT", Side::Buy, 1, 100);

        match store.apply_fill(&order, Decimal::from(100)) {
            FillEffect::Opened(p) => {
                assert_eq!(p.direction, Direction::Long);
                assert_eq!(p.entry_price, Decimal::from(100));
                assert_eq!(p.quantity, Decimal::ONE);
            }
            other => panic!("expected Opened, got {:?}", other),
        }
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_weighted_average_merge() {
        let mut store = PositionStore::new();
        let first = filled("BTCUSDT", Side::Buy, 1, 100);
        let second = filled("BTCUSDT", Side::Buy, 1, 110);

        store.apply_fill(&first, Decimal::from(100));
        match store.apply_fill(&second, Decimal::from(110)) {
            FillEffect::Extended(p) => {
                assert_eq!(p.entry_price, Decimal::from(105));
                assert_eq!(p.quantity, Decimal::from(2));
            }
            other => panic!("expected Extended, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_threshold_overwrite_and_keep() {
        let mut store = PositionStore::new();
        let req = OrderRequest::limit(Symbol::new("BTCUSDT"), Side::Buy, Decimal::ONE, Decimal::from(100))
            .with_take_profit(Decimal::from(120))
            .with_stop_loss(Decimal::from(90));
        store.apply_fill(&Order::from_request(req), Decimal::from(100));

        // Second fill sets only the stop; the take-profit survives.
        let req = OrderRequest::limit(Symbol::new("BTCUSDT"), Side::Buy, Decimal::ONE, Decimal::from(100))
            .with_stop_loss(Decimal::from(95));
        match store.apply_fill(&Order::from_request(req), Decimal::from(100)) {
            FillEffect::Extended(p) => {
                assert_eq!(p.take_profit, Some(Decimal::from(120)));
                assert_eq!(p.stop_loss, Some(Decimal::from(95)));
            }
            other => panic!("expected Extended, got {:?}", other),
        }
    }

    #[test]
    fn test_partial_reduce_realizes_pnl() {
        let mut store = PositionStore::new();
        store.apply_fill(&filled("BTCUSDT", Side::Buy, 2, 100), Decimal::from(100));

        let sell = filled("BTCUSDT", Side::Sell, 1, 110);
        match store.apply_fill(&sell, Decimal::from(110)) {
            FillEffect::Reduced { position, closed_quantity, realized } => {
                assert_eq!(closed_quantity, Decimal::ONE);
                assert_eq!(realized, Decimal::from(10));
                assert_eq!(position.quantity, Decimal::ONE);
                assert_eq!(position.entry_price, Decimal::from(100));
                assert_eq!(position.realized_pnl, Decimal::from(10));
            }
            other => panic!("expected Reduced, got {:?}", other),
        }
    }

    #[test]
    fn test_exact_close_reports_lifetime_pnl() {
        let mut store = PositionStore::new();
        store.apply_fill(&filled("BTCUSDT", Side::Buy, 2, 100), Decimal::from(100));
        store.apply_fill(&filled("BTCUSDT", Side::Sell, 1, 110), Decimal::from(110));

        let sell = filled("BTCUSDT", Side::Sell, 1, 120);
        match store.apply_fill(&sell, Decimal::from(120)) {
            FillEffect::Closed { closed, excess } => {
                assert_eq!(excess, Decimal::ZERO);
                assert_eq!(closed.reason, CloseReason::OpposingFill);
                // 10 from the partial plus 20 from the final chunk.
                assert_eq!(closed.realized_pnl, Decimal::from(30));
                assert_eq!(closed.exit_price, Decimal::from(120));
            }
            other => panic!("expected Closed, got {:?}", other),
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_oversized_opposite_fill_clamps() {
        let mut store = PositionStore::new();
        store.apply_fill(&filled("BTCUSDT", Side::Buy, 1, 100), Decimal::from(100));

        let sell = filled("BTCUSDT", Side::Sell, 3, 90);
        match store.apply_fill(&sell, Decimal::from(90)) {
            FillEffect::Closed { closed, excess } => {
                assert_eq!(excess, Decimal::from(2));
                assert_eq!(closed.realized_pnl, Decimal::from(-10));
            }
            other => panic!("expected Closed, got {:?}", other),
        }
        // The excess does not open a short.
        assert!(store.is_empty());
    }

    #[test]
    fn test_short_pnl_sign() {
        let mut store = PositionStore::new();
        store.apply_fill(&filled("BTCUSDT", Side::Sell, 1, 100), Decimal::from(100));

        let closed = store
            .close(&Symbol::new("BTCUSDT"), Decimal::from(90), CloseReason::Manual)
            .unwrap();
        assert_eq!(closed.direction, Direction::Short);
        assert_eq!(closed.realized_pnl, Decimal::from(10));
        assert_eq!(closed.pnl_percent, Decimal::from(10));
    }

    #[test]
    fn test_update_thresholds_replaces_both() {
        let mut store = PositionStore::new();
        let req = OrderRequest::limit(Symbol::new("BTCUSDT"), Side::Buy, Decimal::ONE, Decimal::from(100))
            .with_take_profit(Decimal::from(120))
            .with_stop_loss(Decimal::from(90));
        store.apply_fill(&Order::from_request(req), Decimal::from(100));

        let updated = store
            .update_thresholds(&Symbol::new("BTCUSDT"), Some(Decimal::from(130)), None)
            .unwrap();
        assert_eq!(updated.take_profit, Some(Decimal::from(130)));
        assert_eq!(updated.stop_loss, None);

        assert!(store
            .update_thresholds(&Symbol::new("ETHUSDT"), None, None)
            .is_none());
    }

    #[test]
    fn test_snapshots_sorted_by_symbol() {
        let mut store = PositionStore::new();
        store.apply_fill(&filled("ETHUSDT", Side::Buy, 1, 2000), Decimal::from(2000));
        store.apply_fill(&filled("BTCUSDT", Side::Buy, 1, 100), Decimal::from(100));

        let snaps = store.snapshots(Decimal::from(110));
        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].position.symbol.as_str(), "BTCUSDT");
        assert_eq!(snaps[0].unrealized_pnl, Decimal::from(10));
    }
}
