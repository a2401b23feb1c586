//! Persistence gateway - the audit boundary toward the remote store
//!
//! Every payload crossing this boundary is an explicit typed record; the
//! engine never hands loose JSON to the backend. Calls are best-effort:
//! the in-memory engine state is authoritative and a failed call is never
//! rolled back.

pub mod rest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::core::{Direction, OrderKind, Result, Side, Symbol};

pub use rest::RestGateway;

/// Record of a newly submitted order, sent before it fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOrderRecord {
    pub order_id: String,
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: Decimal,
    pub limit_price: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// Marks a previously recorded order as executed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedOrderRecord {
    pub order_id: String,
    pub symbol: Symbol,
    pub filled_price: Decimal,
    pub filled_quantity: Decimal,
}

/// Removes the record of a cancelled order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePendingOrderRecord {
    pub order_id: String,
    pub symbol: Symbol,
}

/// Record of an opened trade backing a position (or a flat-settled fill).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenTradeRecord {
    pub symbol: Symbol,
    pub direction: Direction,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub take_profit: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
}

/// Closes all backing trade records for a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseTradeRecord {
    pub symbol: Symbol,
    pub exit_price: Decimal,
    pub pnl: Decimal,
    pub pnl_percent: Decimal,
}

/// Abstract contract toward the remote order/trade store.
///
/// The concrete wire format belongs to the backend; implementations just
/// have to deliver each record. None of these calls is awaited inside the
/// engine's critical section.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Record a newly submitted order. The store may answer with the
    /// canonical id it assigned, which then replaces the local id.
    async fn create_pending_order(&self, record: &PendingOrderRecord) -> Result<Option<String>>;

    async fn mark_order_executed(&self, record: &ExecutedOrderRecord) -> Result<()>;

    async fn delete_pending_order(&self, record: &DeletePendingOrderRecord) -> Result<()>;

    async fn create_trade(&self, record: &OpenTradeRecord) -> Result<()>;

    async fn close_trade(&self, record: &CloseTradeRecord) -> Result<()>;
}

/// Gateway that drops every record. Used when no backend is configured.
#[derive(Debug, Default)]
pub struct NoopGateway;

#[async_trait]
impl PersistenceGateway for NoopGateway {
    async fn create_pending_order(&self, _record: &PendingOrderRecord) -> Result<Option<String>> {
        Ok(None)
    }

    async fn mark_order_executed(&self, _record: &ExecutedOrderRecord) -> Result<()> {
        Ok(())
    }

    async fn delete_pending_order(&self, _record: &DeletePendingOrderRecord) -> Result<()> {
        Ok(())
    }

    async fn create_trade(&self, _record: &OpenTradeRecord) -> Result<()> {
        Ok(())
    }

    async fn close_trade(&self, _record: &CloseTradeRecord) -> Result<()> {
        Ok(())
    }
}

/// One delivered gateway call, as captured by [`MemoryGateway`].
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    CreatePendingOrder(PendingOrderRecord),
    MarkOrderExecuted(ExecutedOrderRecord),
    DeletePendingOrder(DeletePendingOrderRecord),
    CreateTrade(OpenTradeRecord),
    CloseTrade(CloseTradeRecord),
}

/// In-memory gateway: keeps every call in arrival order. Backs the tests
/// and doubles as an offline audit sink.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    calls: Mutex<Vec<GatewayCall>>,
    canonical_ids: Mutex<VecDeque<String>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a canonical id to hand out on the next create-pending-order
    /// call, simulating a store that re-keys orders.
    pub fn assign_canonical_id(&self, id: impl Into<String>) {
        self.canonical_ids.lock().push_back(id.into());
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn create_pending_order(&self, record: &PendingOrderRecord) -> Result<Option<String>> {
        self.calls
            .lock()
            .push(GatewayCall::CreatePendingOrder(record.clone()));
        Ok(self.canonical_ids.lock().pop_front())
    }

    async fn mark_order_executed(&self, record: &ExecutedOrderRecord) -> Result<()> {
        self.calls
            .lock()
            .push(GatewayCall::MarkOrderExecuted(record.clone()));
        Ok(())
    }

    async fn delete_pending_order(&self, record: &DeletePendingOrderRecord) -> Result<()> {
        self.calls
            .lock()
            .push(GatewayCall::DeletePendingOrder(record.clone()));
        Ok(())
    }

    async fn create_trade(&self, record: &OpenTradeRecord) -> Result<()> {
        self.calls.lock().push(GatewayCall::CreateTrade(record.clone()));
        Ok(())
    }

    async fn close_trade(&self, record: &CloseTradeRecord) -> Result<()> {
        self.calls.lock().push(GatewayCall::CloseTrade(record.clone()));
        Ok(())
    }
}
