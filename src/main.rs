use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{error, info, warn, Instrument};

use order_draft_sync::app_system::{setup_tracing, DraftSyncSession, SyncConfig, SyncMode};
use order_draft_sync::domain::{CouponLine, FeeLine, Item, OrderDraft, OrderStatus, ShippingLine};
use order_draft_sync::messages::SyncStatus;
use order_draft_sync::reconciler::{InMemoryReconciler, Reconciler};

/// Logs statuses until nothing has arrived for `quiet`.
async fn settle(events: &mut mpsc::Receiver<SyncStatus>, quiet: Duration) {
    while let Ok(Some(status)) = tokio::time::timeout(quiet, events.recv()).await {
        match status {
            SyncStatus::Succeeded(order) => {
                info!(order_id = order.id, total = %order.total, tax = %order.total_tax, "Sync succeeded")
            }
            SyncStatus::Failed(e) => warn!(error = %e, "Sync failed"),
            other => info!(phase = %other.phase(), "Sync status"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let config = SyncConfig::from_env();
    info!(mode = %config.mode, "Starting order sync demo");
    let quiet = config.debounce * 2 + Duration::from_millis(500);

    let backend = Arc::new(
        InMemoryReconciler::new(Decimal::new(8, 2))
            .with_coupon("SUMMER10", Decimal::TEN)
            .with_latency(Duration::from_millis(150)),
    );

    // Edit mode needs an order that already exists remotely.
    let initial = match config.mode {
        SyncMode::Creation => OrderDraft::empty().with_status(OrderStatus::Processing),
        SyncMode::Edit => backend
            .reconcile(
                OrderDraft::empty()
                    .with_status(OrderStatus::Pending)
                    .with_item(Item::new(7, "Mug", Decimal::ONE, Decimal::new(900, 2))),
            )
            .await
            .map_err(|e| e.to_string())?,
    };

    let mut session = DraftSyncSession::start(config, initial, Arc::clone(&backend)).map_err(|e| e.to_string())?;
    let mut events = session.take_events().ok_or("event stream already taken")?;

    async {
        info!("Adding items");
        session.edit(|draft| draft.items.push(Item::new(1, "Hoodie", Decimal::ONE, Decimal::new(4500, 2))));
        session.edit(|draft| draft.items[0].quantity = Decimal::TWO);
        session.edit(|draft| draft.items.push(Item::new(2, "Beanie", Decimal::ONE, Decimal::new(1500, 2))));
        session.edit(|draft| draft.customer_note = "Leave at the door".into());
        settle(&mut events, quiet).await;
    }
    .instrument(tracing::info_span!("items"))
    .await;

    async {
        info!("Applying an unknown coupon");
        session.edit(|draft| draft.coupon_lines.push(CouponLine::new("BOGUS")));
        settle(&mut events, quiet).await;

        info!("Applying a valid coupon");
        session.edit(|draft| {
            draft.coupon_lines.push(CouponLine::new("summer10"));
            draft.shipping_lines.push(ShippingLine::new("flat_rate", "Flat rate", Decimal::new(500, 2)));
        });
        settle(&mut events, quiet).await;
    }
    .instrument(tracing::info_span!("coupons"))
    .await;

    async {
        info!("Adding a fee while the backend is down");
        backend.fail_next(order_draft_sync::error::SyncError::NetworkError("connection reset".into()));
        session.edit(|draft| draft.fee_lines.push(FeeLine::new("Gift wrap", Decimal::new(300, 2))));
        settle(&mut events, quiet).await;

        info!("Retrying");
        session.retry();
        settle(&mut events, quiet).await;
    }
    .instrument(tracing::info_span!("retry"))
    .await;

    let order = session.current();
    match serde_json::to_string_pretty(&order) {
        Ok(json) => println!("{}", json),
        Err(e) => error!(error = %e, "Could not serialize the final order"),
    }
    info!(calls = backend.calls(), "Backend calls made");

    session.shutdown().await.map_err(|e| e.to_string())?;
    info!("Demo completed successfully");
    Ok(())
}
