use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing_subscriber::{fmt, EnvFilter};

use paperfill::balance::NotionalCap;
use paperfill::core::{Config, OrderRequest, Side, Symbol};
use paperfill::engine::Engine;
use paperfill::feed::SimFeed;
use paperfill::persist::{NoopGateway, PersistenceGateway, RestGateway};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config (optional path argument, defaults otherwise)
    let config = match std::env::args().nth(1) {
        Some(path) => Config::load(&path.into())?,
        None => Config::default(),
    };

    // 2. Initialize logger (RUST_LOG wins over the config level)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},paperfill=debug", config.app.log_level)));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    tracing::info!(
        "📈 paperfill starting: {} walking from {}",
        config.feed.symbol,
        config.feed.start_price
    );

    // 3. Engine, persistence gateway, outbox worker
    let (engine, outbox) = Engine::new();
    let gateway: Arc<dyn PersistenceGateway> = match &config.backend {
        Some(backend) => {
            tracing::info!("💾 Persisting orders/trades to {}", backend.base_url);
            Arc::new(RestGateway::new(backend.base_url.clone()))
        }
        None => {
            tracing::info!("💾 No backend configured, records are dropped");
            Arc::new(NoopGateway)
        }
    };
    let _worker = outbox.spawn(gateway);

    engine.register_balance_validator(Arc::new(NotionalCap::new(
        config.wallet.max_order_notional,
    )));

    // 4. Drive the engine from the simulated feed
    let symbol = Symbol::new(&config.feed.symbol);
    let mut feed = SimFeed::new(config.feed.start_price, config.feed.seed);
    let mut tick: u64 = 0;

    loop {
        tick += 1;
        let candle = feed.next_candle();
        let price = candle.close;
        engine.on_price_update(price, Some(candle));

        // Keep one bracketed bid resting whenever the book is flat.
        if engine.positions().is_empty() && engine.pending_orders(None).is_empty() {
            let entry = (price * Decimal::new(999, 3)).round_dp(2);
            let request = OrderRequest::limit(symbol.clone(), Side::Buy, Decimal::ONE, entry)
                .with_take_profit((entry * Decimal::new(1004, 3)).round_dp(2))
                .with_stop_loss((entry * Decimal::new(996, 3)).round_dp(2));
            match engine.submit_order(request) {
                Ok(order) => {
                    tracing::info!("🧾 Resting bid {} {} @ {}", order.quantity, order.symbol, entry)
                }
                Err(e) => tracing::warn!("Order rejected: {}", e),
            }
        }

        if tick % 10 == 0 {
            for snapshot in engine.positions() {
                let p = &snapshot.position;
                tracing::info!(
                    "📊 {} {} {} @ {} | mark {} | uPnL {} ({}%)",
                    p.symbol,
                    p.direction,
                    p.quantity,
                    p.entry_price,
                    snapshot.mark_price,
                    snapshot.unrealized_pnl.round_dp(2),
                    snapshot.unrealized_pnl_percent.round_dp(2)
                );
            }
        }

        tokio::time::sleep(Duration::from_millis(config.feed.interval_ms)).await;
    }
}
