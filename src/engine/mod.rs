//! Matching & trigger engine - drives every order and position mutation
//!
//! The engine owns the order and position books behind one lock. Price
//! ticks and UI actions both funnel through that lock, so a cancel can
//! never interleave with the fill that would race it. Persistence never
//! happens inside the lock: state transitions append typed intents to
//! the outbox channel and the worker delivers them on its own time.
//!
//! Tick handling runs in two phases, thresholds first: a position that
//! stops out this tick is gone before order matching runs, so it cannot
//! absorb a fill from the same candle that killed it.

mod orders;
mod outbox;
mod positions;

pub use outbox::{Outbox, PersistIntent};

use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::balance::BalanceValidator;
use crate::core::{
    Candle, CloseReason, ClosedPosition, Direction, Error, Order, OrderKind, OrderRequest,
    Position, PositionSnapshot, Result, Side, Symbol,
};
use crate::persist::{
    CloseTradeRecord, DeletePendingOrderRecord, ExecutedOrderRecord, OpenTradeRecord,
    PendingOrderRecord,
};

use orders::OrderStore;
use positions::{FillEffect, PositionStore};

/// Everything the engine guards with its lock.
struct EngineState {
    orders: OrderStore,
    positions: PositionStore,
    last_price: Option<Decimal>,
    validator: Option<Arc<dyn BalanceValidator>>,
}

impl EngineState {
    fn new() -> Self {
        Self {
            orders: OrderStore::new(),
            positions: PositionStore::new(),
            last_price: None,
            validator: None,
        }
    }
}

/// Handle to one simulation session. Clones share the same books and the
/// same outbox, so the feed task and the UI task can each hold one.
#[derive(Clone)]
pub struct Engine {
    state: Arc<Mutex<EngineState>>,
    outbox_tx: flume::Sender<PersistIntent>,
}

impl Engine {
    /// Create an engine and the outbox that will drain its persistence
    /// queue. Run the outbox on a background task; the engine works fine
    /// without one, records just pile up in the channel.
    pub fn new() -> (Engine, Outbox) {
        let (outbox_tx, rx) = flume::unbounded();
        let state = Arc::new(Mutex::new(EngineState::new()));
        let outbox = Outbox::new(rx, Arc::clone(&state));
        (Engine { state, outbox_tx }, outbox)
    }

    /// Submit a new order.
    ///
    /// Limit orders rest until a tick reaches their price. Market orders
    /// fill immediately at the last seen price, which means they are
    /// rejected with [`Error::NoMarketPrice`] before the first tick.
    pub fn submit_order(&self, request: OrderRequest) -> Result<Order> {
        validate(&request)?;

        let mut state = self.state.lock();

        let fill_now = match request.kind {
            OrderKind::Market => match state.last_price {
                Some(price) => Some(price),
                None => return Err(Error::NoMarketPrice(request.symbol.clone())),
            },
            OrderKind::Limit => None,
        };

        let order = Order::from_request(request);
        info!(
            "Order {} submitted: {} {} {} ({}{})",
            order.id,
            order.side,
            order.quantity,
            order.symbol,
            order.kind,
            order
                .limit_price
                .map(|p| format!(" @ {}", p))
                .unwrap_or_default()
        );
        state.orders.insert(order.clone());
        self.enqueue(PersistIntent::CreatePendingOrder(pending_record(&order)));

        let Some(price) = fill_now else {
            return Ok(order);
        };

        if let Some(validator) = state.validator.clone() {
            if !validator.sufficient_funds(&order, price) {
                warn!("Insufficient balance for order {}, cancelling", order.id);
                if state.orders.cancel(&order.id).is_some() {
                    self.enqueue(PersistIntent::DeletePendingOrder(delete_record(&order)));
                }
                return Err(Error::InsufficientBalance {
                    order_id: order.id.clone(),
                });
            }
        }

        self.execute_fill(&mut state, &order, price);
        Ok(state.orders.get(&order.id).cloned().unwrap_or(order))
    }

    /// Cancel a pending order. Returns false when the order is unknown or
    /// already terminal; a fill that won the race stays a fill.
    pub fn cancel_order(&self, id: &str) -> bool {
        let mut state = self.state.lock();
        match state.orders.cancel(id) {
            Some(order) => {
                info!("Order {} cancelled", order.id);
                self.enqueue(PersistIntent::DeletePendingOrder(delete_record(&order)));
                true
            }
            None => false,
        }
    }

    /// Feed one tick into the engine. `candle` widens the tick to a
    /// high/low range for threshold checks; without one the tick is
    /// treated as a flat range at `price`.
    pub fn on_price_update(&self, price: Decimal, candle: Option<Candle>) {
        let range = candle.unwrap_or_else(|| Candle::flat(price));
        let mut state = self.state.lock();
        state.last_price = Some(price);
        debug!("Tick: {} (range {} - {})", price, range.low, range.high);

        self.check_thresholds(&mut state, &range);
        self.match_pending(&mut state, price);
    }

    /// Replace the thresholds on an open position. Both fields are
    /// overwritten; passing None clears that side.
    pub fn update_position_thresholds(
        &self,
        symbol: &Symbol,
        take_profit: Option<Decimal>,
        stop_loss: Option<Decimal>,
    ) -> Result<Position> {
        validate_threshold(take_profit, "take-profit")?;
        validate_threshold(stop_loss, "stop-loss")?;
        let mut state = self.state.lock();
        state
            .positions
            .update_thresholds(symbol, take_profit, stop_loss)
            .ok_or_else(|| Error::PositionNotFound(symbol.clone()))
    }

    /// Close an open position at the last seen price.
    pub fn close_position(&self, symbol: &Symbol) -> Result<ClosedPosition> {
        let mut state = self.state.lock();
        let Some(price) = state.last_price else {
            return Err(Error::NoMarketPrice(symbol.clone()));
        };
        let closed = state
            .positions
            .close(symbol, price, CloseReason::Manual)
            .ok_or_else(|| Error::PositionNotFound(symbol.clone()))?;
        info!(
            "Position {} closed manually at {} (pnl {})",
            symbol, price, closed.realized_pnl
        );
        self.enqueue(PersistIntent::CloseTrade(close_trade_record(&closed)));
        Ok(closed)
    }

    /// Install the hook consulted before an order may fill.
    pub fn register_balance_validator(&self, validator: Arc<dyn BalanceValidator>) {
        self.state.lock().validator = Some(validator);
    }

    /// Open positions with PnL computed against the last seen price.
    pub fn positions(&self) -> Vec<PositionSnapshot> {
        let state = self.state.lock();
        match state.last_price {
            Some(price) => state.positions.snapshots(price),
            None => state
                .positions
                .list()
                .into_iter()
                .map(|p| {
                    let entry = p.entry_price;
                    PositionSnapshot::at(p, entry)
                })
                .collect(),
        }
    }

    /// One open position with live PnL, if the symbol has one.
    pub fn position(&self, symbol: &Symbol) -> Option<PositionSnapshot> {
        let state = self.state.lock();
        let position = state.positions.get(symbol)?.clone();
        let mark = state.last_price.unwrap_or(position.entry_price);
        Some(PositionSnapshot::at(position, mark))
    }

    /// Pending orders, oldest first, optionally for one symbol.
    pub fn pending_orders(&self, symbol: Option<&Symbol>) -> Vec<Order> {
        self.state.lock().orders.pending(symbol)
    }

    pub fn order(&self, id: &str) -> Option<Order> {
        self.state.lock().orders.get(id).cloned()
    }

    pub fn last_price(&self) -> Option<Decimal> {
        self.state.lock().last_price
    }

    /// Phase one of a tick: stop-loss and take-profit checks against the
    /// candle range. Stop-loss is checked first, so when both thresholds
    /// sit inside the same candle the position closes at the stop.
    fn check_thresholds(&self, state: &mut EngineState, range: &Candle) {
        for position in state.positions.list() {
            let Some((trigger_price, reason)) = threshold_trigger(&position, range) else {
                continue;
            };
            let Some(closed) = state.positions.close(&position.symbol, trigger_price, reason)
            else {
                continue;
            };
            info!(
                "{} triggered for {}: closed {} at {} (pnl {})",
                reason.as_str(),
                closed.symbol,
                closed.quantity,
                trigger_price,
                closed.realized_pnl
            );
            self.enqueue(PersistIntent::CloseTrade(close_trade_record(&closed)));
        }
    }

    /// Phase two of a tick: fill every resting limit order the price has
    /// reached. Buys fill once the price is at or above their limit,
    /// sells once at or below; the fill is booked at the order's own
    /// limit price.
    fn match_pending(&self, state: &mut EngineState, price: Decimal) {
        let validator = state.validator.clone();

        for order in state.orders.pending(None) {
            let Some(limit) = order.limit_price else {
                continue;
            };
            let crossed = match order.side {
                Side::Buy => price >= limit,
                Side::Sell => price <= limit,
            };
            if !crossed {
                continue;
            }

            if let Some(validator) = &validator {
                if !validator.sufficient_funds(&order, limit) {
                    warn!("Insufficient balance for order {}, cancelling", order.id);
                    if state.orders.cancel(&order.id).is_some() {
                        self.enqueue(PersistIntent::DeletePendingOrder(delete_record(&order)));
                    }
                    continue;
                }
            }

            self.execute_fill(state, &order, limit);
        }
    }

    /// Fill an order and fold the fill into the position book. Orders
    /// without any threshold settle flat: the trade opens and closes in
    /// the same breath and no position is kept.
    fn execute_fill(&self, state: &mut EngineState, order: &Order, fill_price: Decimal) {
        let Some(filled) = state.orders.mark_filled(&order.id, fill_price, order.quantity) else {
            debug!("Order {} no longer pending, skipping fill", order.id);
            return;
        };
        info!(
            "Order {} filled: {} {} {} @ {}",
            filled.id, filled.side, filled.quantity, filled.symbol, fill_price
        );
        self.enqueue(PersistIntent::MarkOrderExecuted(executed_record(
            &filled, fill_price,
        )));

        if !filled.opens_position() {
            info!(
                "Order {} carried no thresholds, settling flat at {}",
                filled.id, fill_price
            );
            self.enqueue(PersistIntent::CreateTrade(open_trade_record(
                &filled, fill_price,
            )));
            self.enqueue(PersistIntent::CloseTrade(flat_close_record(
                &filled, fill_price,
            )));
            return;
        }

        match state.positions.apply_fill(&filled, fill_price) {
            FillEffect::Opened(position) => {
                info!(
                    "Position opened: {} {} {} @ {}",
                    position.direction, position.quantity, position.symbol, position.entry_price
                );
                self.enqueue(PersistIntent::CreateTrade(open_trade_record(
                    &filled, fill_price,
                )));
            }
            FillEffect::Extended(position) => {
                info!(
                    "Position extended: {} {} {} @ {}",
                    position.direction, position.quantity, position.symbol, position.entry_price
                );
                self.enqueue(PersistIntent::CreateTrade(open_trade_record(
                    &filled, fill_price,
                )));
            }
            FillEffect::Reduced {
                position,
                closed_quantity,
                realized,
            } => {
                info!(
                    "Position reduced: {} {} by {} at {} (realized {})",
                    position.symbol, position.direction, closed_quantity, fill_price, realized
                );
            }
            FillEffect::Closed { closed, excess } => {
                if !excess.is_zero() {
                    warn!(
                        "Fill on {} exceeded the open position by {}, excess dropped",
                        closed.symbol, excess
                    );
                }
                info!(
                    "Position {} closed by opposing fill at {} (pnl {})",
                    closed.symbol, fill_price, closed.realized_pnl
                );
                self.enqueue(PersistIntent::CloseTrade(close_trade_record(&closed)));
            }
        }
    }

    fn enqueue(&self, intent: PersistIntent) {
        if self.outbox_tx.send(intent).is_err() {
            warn!("Persistence outbox is gone, dropping record");
        }
    }
}

fn validate(request: &OrderRequest) -> Result<()> {
    if request.quantity <= Decimal::ZERO {
        return Err(Error::Validation("order quantity must be positive".into()));
    }
    match request.kind {
        OrderKind::Limit => match request.limit_price {
            None => {
                return Err(Error::Validation(
                    "limit order requires a limit price".into(),
                ));
            }
            Some(price) if price <= Decimal::ZERO => {
                return Err(Error::Validation("limit price must be positive".into()));
            }
            Some(_) => {}
        },
        OrderKind::Market => {}
    }
    validate_threshold(request.take_profit, "take-profit")?;
    validate_threshold(request.stop_loss, "stop-loss")?;
    Ok(())
}

fn validate_threshold(value: Option<Decimal>, what: &str) -> Result<()> {
    match value {
        Some(v) if v <= Decimal::ZERO => {
            Err(Error::Validation(format!("{} must be positive", what)))
        }
        _ => Ok(()),
    }
}

fn threshold_trigger(position: &Position, range: &Candle) -> Option<(Decimal, CloseReason)> {
    match position.direction {
        Direction::Long => {
            if let Some(sl) = position.stop_loss {
                if range.low <= sl {
                    return Some((sl, CloseReason::StopLoss));
                }
            }
            if let Some(tp) = position.take_profit {
                if range.high >= tp {
                    return Some((tp, CloseReason::TakeProfit));
                }
            }
        }
        Direction::Short => {
            if let Some(sl) = position.stop_loss {
                if range.high >= sl {
                    return Some((sl, CloseReason::StopLoss));
                }
            }
            if let Some(tp) = position.take_profit {
                if range.low <= tp {
                    return Some((tp, CloseReason::TakeProfit));
                }
            }
        }
    }
    None
}

fn pending_record(order: &Order) -> PendingOrderRecord {
    PendingOrderRecord {
        order_id: order.id.clone(),
        symbol: order.symbol.clone(),
        side: order.side,
        kind: order.kind,
        quantity: order.quantity,
        limit_price: order.limit_price,
        take_profit: order.take_profit,
        stop_loss: order.stop_loss,
        created_at: order.created_at,
    }
}

fn executed_record(order: &Order, fill_price: Decimal) -> ExecutedOrderRecord {
    ExecutedOrderRecord {
        order_id: order.id.clone(),
        symbol: order.symbol.clone(),
        filled_price: fill_price,
        filled_quantity: order.quantity,
    }
}

fn delete_record(order: &Order) -> DeletePendingOrderRecord {
    DeletePendingOrderRecord {
        order_id: order.id.clone(),
        symbol: order.symbol.clone(),
    }
}

fn open_trade_record(order: &Order, fill_price: Decimal) -> OpenTradeRecord {
    OpenTradeRecord {
        symbol: order.symbol.clone(),
        direction: order.direction(),
        quantity: order.quantity,
        entry_price: fill_price,
        take_profit: order.take_profit,
        stop_loss: order.stop_loss,
    }
}

fn close_trade_record(closed: &ClosedPosition) -> CloseTradeRecord {
    CloseTradeRecord {
        symbol: closed.symbol.clone(),
        exit_price: closed.exit_price,
        pnl: closed.realized_pnl,
        pnl_percent: closed.pnl_percent,
    }
}

fn flat_close_record(order: &Order, fill_price: Decimal) -> CloseTradeRecord {
    CloseTradeRecord {
        symbol: order.symbol.clone(),
        exit_price: fill_price,
        pnl: Decimal::ZERO,
        pnl_percent: Decimal::ZERO,
    }
}
