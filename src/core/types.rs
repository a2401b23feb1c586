//! Core types - Strong typing for the paper-trading domain

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tradeable symbol (e.g., "BTCUSDT")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Position direction, derived from the side of the opening fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Directional PnL for `quantity` entered at `entry` and exited at `exit`.
    pub fn pnl(&self, entry: Decimal, exit: Decimal, quantity: Decimal) -> Decimal {
        match self {
            Direction::Long => (exit - entry) * quantity,
            Direction::Short => (entry - exit) * quantity,
        }
    }
}

impl From<Side> for Direction {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => Direction::Long,
            Side::Sell => Direction::Short,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Order kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Limit,
    Market,
}

impl std::fmt::Display for OrderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderKind::Limit => write!(f, "LIMIT"),
            OrderKind::Market => write!(f, "MARKET"),
        }
    }
}

/// Order lifecycle status. `Filled` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    TakeProfit,
    OpposingFill,
    Manual,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::StopLoss => "SL",
            CloseReason::TakeProfit => "TP",
            CloseReason::OpposingFill => "FILL",
            CloseReason::Manual => "MANUAL",
        }
    }
}

/// Candle range for one tick. Threshold checks run against `high`/`low`;
/// order matching runs against the tick price itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
}

impl Candle {
    /// Degenerate candle for ticks that arrive without range data.
    pub fn flat(price: Decimal) -> Self {
        Self {
            high: price,
            low: price,
            close: price,
        }
    }
}

/// Order submission parameters, as they arrive from the UI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
}

impl OrderRequest {
    pub fn limit(symbol: Symbol, side: Side, quantity: Decimal, limit_price: Decimal) -> Self {
        Self {
            symbol,
            side,
            kind: OrderKind::Limit,
            quantity,
            limit_price: Some(limit_price),
            take_profit: None,
            stop_loss: None,
        }
    }

    pub fn market(symbol: Symbol, side: Side, quantity: Decimal) -> Self {
        Self {
            symbol,
            side,
            kind: OrderKind::Market,
            quantity,
            limit_price: None,
            take_profit: None,
            stop_loss: None,
        }
    }

    pub fn with_take_profit(mut self, price: Decimal) -> Self {
        self.take_profit = Some(price);
        self
    }

    pub fn with_stop_loss(mut self, price: Decimal) -> Self {
        self.stop_loss = Some(price);
        self
    }
}

/// Order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Locally assigned at submission; may be replaced once by the
    /// canonical id of the remote store.
    pub id: String,
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub status: OrderStatus,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    /// Set iff `status == Filled`.
    pub filled_price: Option<Decimal>,
    /// Set iff `status == Filled`.
    pub filled_quantity: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn from_request(request: OrderRequest) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            symbol: request.symbol,
            side: request.side,
            kind: request.kind,
            quantity: request.quantity,
            limit_price: request.limit_price,
            status: OrderStatus::Pending,
            take_profit: request.take_profit,
            stop_loss: request.stop_loss,
            filled_price: None,
            filled_quantity: None,
            created_at: Utc::now(),
        }
    }

    pub fn direction(&self) -> Direction {
        Direction::from(self.side)
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }

    /// Flat-settlement policy: only orders carrying a take-profit or a
    /// stop-loss are tracked as positions after filling. An order with
    /// neither settles as an immediately-closed trade.
    pub fn opens_position(&self) -> bool {
        self.take_profit.is_some() || self.stop_loss.is_some()
    }
}

/// Open position. At most one exists per symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub direction: Direction,
    /// Quantity-weighted average price of all contributing fills.
    pub entry_price: Decimal,
    /// Net open size; always > 0 while the position exists.
    pub quantity: Decimal,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    /// PnL realized by partial closes, carried until the final close.
    pub realized_pnl: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn unrealized_pnl(&self, mark: Decimal) -> Decimal {
        self.direction.pnl(self.entry_price, mark, self.quantity)
    }

    pub fn unrealized_pnl_percent(&self, mark: Decimal) -> Decimal {
        let basis = self.entry_price * self.quantity;
        if basis.is_zero() {
            return Decimal::ZERO;
        }
        self.unrealized_pnl(mark) / basis * Decimal::from(100)
    }
}

/// Position annotated with live PnL against the latest known price,
/// the shape the UI reads.
#[derive(Debug, Clone, Serialize)]
pub struct PositionSnapshot {
    pub position: Position,
    pub mark_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub unrealized_pnl_percent: Decimal,
}

impl PositionSnapshot {
    pub fn at(position: Position, mark: Decimal) -> Self {
        let unrealized_pnl = position.unrealized_pnl(mark);
        let unrealized_pnl_percent = position.unrealized_pnl_percent(mark);
        Self {
            position,
            mark_price: mark,
            unrealized_pnl,
            unrealized_pnl_percent,
        }
    }
}

/// Summary of a fully closed position
#[derive(Debug, Clone, Serialize)]
pub struct ClosedPosition {
    pub symbol: Symbol,
    pub direction: Direction,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    /// Lifetime realized PnL: carried partial closes plus the final chunk.
    pub realized_pnl: Decimal,
    /// Realized PnL over the cost basis of the finally closed quantity.
    pub pnl_percent: Decimal,
    pub reason: CloseReason,
    pub closed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_from_side() {
        assert_eq!(Direction::from(Side::Buy), Direction::Long);
        assert_eq!(Direction::from(Side::Sell), Direction::Short);
    }

    #[test]
    fn test_pnl_sign_long() {
        let pos = Position {
            symbol: Symbol::new("BTCUSDT"),
            direction: Direction::Long,
            entry_price: Decimal::from(100),
            quantity: Decimal::from(2),
            take_profit: None,
            stop_loss: None,
            realized_pnl: Decimal::ZERO,
            opened_at: Utc::now(),
        };
        assert!(pos.unrealized_pnl(Decimal::from(110)) > Decimal::ZERO);
        assert!(pos.unrealized_pnl(Decimal::from(90)) < Decimal::ZERO);
        assert_eq!(pos.unrealized_pnl(Decimal::from(100)), Decimal::ZERO);
    }

    #[test]
    fn test_pnl_sign_short() {
        let pos = Position {
            symbol: Symbol::new("ETHUSDT"),
            direction: Direction::Short,
            entry_price: Decimal::from(100),
            quantity: Decimal::from(1),
            take_profit: None,
            stop_loss: None,
            realized_pnl: Decimal::ZERO,
            opened_at: Utc::now(),
        };
        assert!(pos.unrealized_pnl(Decimal::from(90)) > Decimal::ZERO);
        assert!(pos.unrealized_pnl(Decimal::from(110)) < Decimal::ZERO);
    }

    #[test]
    fn test_pnl_percent() {
        let pos = Position {
            symbol: Symbol::new("BTCUSDT"),
            direction: Direction::Long,
            entry_price: Decimal::from(100),
            quantity: Decimal::from(2),
            take_profit: None,
            stop_loss: None,
            realized_pnl: Decimal::ZERO,
            opened_at: Utc::now(),
        };
        // (110-100)*2 = 20 over a basis of 200 -> 10%
        assert_eq!(
            pos.unrealized_pnl_percent(Decimal::from(110)),
            Decimal::from(10)
        );
    }

    #[test]
    fn test_flat_settlement_policy() {
        let bare = Order::from_request(OrderRequest::market(
            Symbol::new("BTCUSDT"),
            Side::Buy,
            Decimal::ONE,
        ));
        assert!(!bare.opens_position());

        let bracketed = Order::from_request(
            OrderRequest::market(Symbol::new("BTCUSDT"), Side::Buy, Decimal::ONE)
                .with_stop_loss(Decimal::from(90)),
        );
        assert!(bracketed.opens_position());
    }

    #[test]
    fn test_symbol_uppercased() {
        assert_eq!(Symbol::new("btcusdt").as_str(), "BTCUSDT");
    }

    #[test]
    fn test_flat_candle() {
        let c = Candle::flat(Decimal::from(42));
        assert_eq!(c.high, c.low);
        assert_eq!(c.close, Decimal::from(42));
    }
}
