//! Persistence outbox - decouples the critical section from the backend
//!
//! Engine operations append typed intents to an unbounded channel and
//! return without waiting; this worker drains the channel, delivers each
//! record through the gateway, and retries failed calls a few times
//! before dropping the record. A stalled backend never stalls a tick.
//!
//! The store may answer a create with its own id for the order. The
//! worker then re-keys the order in the engine and rewrites the id in any
//! queued records that still carry the local one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::core::Result;
use crate::persist::{
    CloseTradeRecord, DeletePendingOrderRecord, ExecutedOrderRecord, OpenTradeRecord,
    PendingOrderRecord, PersistenceGateway,
};

use super::EngineState;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_millis(250);

/// One persistence call the engine has committed to making.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistIntent {
    CreatePendingOrder(PendingOrderRecord),
    MarkOrderExecuted(ExecutedOrderRecord),
    DeletePendingOrder(DeletePendingOrderRecord),
    CreateTrade(OpenTradeRecord),
    CloseTrade(CloseTradeRecord),
}

impl PersistIntent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreatePendingOrder(_) => "create_pending_order",
            Self::MarkOrderExecuted(_) => "mark_order_executed",
            Self::DeletePendingOrder(_) => "delete_pending_order",
            Self::CreateTrade(_) => "create_trade",
            Self::CloseTrade(_) => "close_trade",
        }
    }

    /// True once no further record for the same order can follow.
    fn is_terminal_for_order(&self) -> bool {
        matches!(self, Self::MarkOrderExecuted(_) | Self::DeletePendingOrder(_))
    }

    fn order_id(&self) -> Option<&str> {
        match self {
            Self::CreatePendingOrder(r) => Some(&r.order_id),
            Self::MarkOrderExecuted(r) => Some(&r.order_id),
            Self::DeletePendingOrder(r) => Some(&r.order_id),
            Self::CreateTrade(_) | Self::CloseTrade(_) => None,
        }
    }

    /// Rewrite a local order id the store has since replaced.
    fn apply_remap(&mut self, remap: &HashMap<String, String>) {
        let id = match self {
            Self::MarkOrderExecuted(r) => &mut r.order_id,
            Self::DeletePendingOrder(r) => &mut r.order_id,
            _ => return,
        };
        if let Some(canonical) = remap.get(id.as_str()) {
            *id = canonical.clone();
        }
    }
}

/// Drains the engine's persistence queue. Owns the receiving half of the
/// channel; the worker exits once every engine handle is gone and the
/// queue is empty.
pub struct Outbox {
    rx: flume::Receiver<PersistIntent>,
    state: Arc<Mutex<EngineState>>,
}

impl Outbox {
    pub(super) fn new(rx: flume::Receiver<PersistIntent>, state: Arc<Mutex<EngineState>>) -> Self {
        Self { rx, state }
    }

    /// Run the drain loop on a background task.
    pub fn spawn(self, gateway: Arc<dyn PersistenceGateway>) -> JoinHandle<()> {
        tokio::spawn(self.run(gateway))
    }

    /// Drain the queue until every sender is dropped.
    pub async fn run(self, gateway: Arc<dyn PersistenceGateway>) {
        let mut remap: HashMap<String, String> = HashMap::new();
        while let Ok(intent) = self.rx.recv_async().await {
            self.deliver(intent, gateway.as_ref(), &mut remap).await;
        }
        debug!("Persistence queue drained, outbox worker exiting");
    }

    /// Pop everything currently queued without delivering it.
    pub fn drain(&self) -> Vec<PersistIntent> {
        let mut out = Vec::new();
        while let Ok(intent) = self.rx.try_recv() {
            out.push(intent);
        }
        out
    }

    async fn deliver(
        &self,
        mut intent: PersistIntent,
        gateway: &dyn PersistenceGateway,
        remap: &mut HashMap<String, String>,
    ) {
        intent.apply_remap(remap);

        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(&intent, gateway, remap).await {
                Ok(()) => {
                    if intent.is_terminal_for_order() {
                        if let Some(id) = intent.order_id() {
                            let id = id.to_string();
                            remap.retain(|_, canonical| canonical != &id);
                        }
                    }
                    return;
                }
                Err(e) if attempt < MAX_ATTEMPTS => {
                    warn!(
                        "Persistence call {} failed (attempt {}/{}): {}",
                        intent.kind(),
                        attempt,
                        MAX_ATTEMPTS,
                        e
                    );
                    tokio::time::sleep(RETRY_BASE * attempt).await;
                }
                Err(e) => {
                    error!(
                        "Persistence call {} failed after {} attempts, dropping record: {}",
                        intent.kind(),
                        MAX_ATTEMPTS,
                        e
                    );
                }
            }
        }
    }

    async fn attempt(
        &self,
        intent: &PersistIntent,
        gateway: &dyn PersistenceGateway,
        remap: &mut HashMap<String, String>,
    ) -> Result<()> {
        match intent {
            PersistIntent::CreatePendingOrder(record) => {
                if let Some(assigned) = gateway.create_pending_order(record).await? {
                    if assigned != record.order_id {
                        remap.insert(record.order_id.clone(), assigned.clone());
                        self.state.lock().orders.rebind(&record.order_id, &assigned);
                        info!("Order {} re-keyed by store as {}", record.order_id, assigned);
                    }
                }
                Ok(())
            }
            PersistIntent::MarkOrderExecuted(record) => gateway.mark_order_executed(record).await,
            PersistIntent::DeletePendingOrder(record) => gateway.delete_pending_order(record).await,
            PersistIntent::CreateTrade(record) => gateway.create_trade(record).await,
            PersistIntent::CloseTrade(record) => gateway.close_trade(record).await,
        }
    }
}
