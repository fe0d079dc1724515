use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, info, instrument, warn};

use super::Reconciler;
use crate::domain::OrderDraft;
use crate::error::{RejectionKind, SyncError};

/// A commerce backend kept in memory.
///
/// Assigns remote ids, prices items, applies percentage coupons and taxes, and
/// rejects drafts the way a real store would. Failures can be queued up front to
/// simulate an unreliable network.
pub struct InMemoryReconciler {
    tax_rate: Decimal,
    coupons: HashMap<String, Decimal>,
    latency: Duration,
    next_order_id: AtomicU64,
    next_line_id: AtomicU64,
    calls: AtomicU64,
    state: Mutex<BackendState>,
}

#[derive(Default)]
struct BackendState {
    orders: HashMap<u64, OrderDraft>,
    forced_failures: VecDeque<SyncError>,
}

impl Default for InMemoryReconciler {
    fn default() -> Self {
        Self::new(Decimal::ZERO)
    }
}

impl InMemoryReconciler {
    pub fn new(tax_rate: Decimal) -> Self {
        Self {
            tax_rate,
            coupons: HashMap::new(),
            latency: Duration::ZERO,
            next_order_id: AtomicU64::new(1),
            next_line_id: AtomicU64::new(1),
            calls: AtomicU64::new(0),
            state: Mutex::new(BackendState::default()),
        }
    }

    /// Registers a coupon taking `percent_off` percent off the item totals.
    pub fn with_coupon(mut self, code: impl Into<String>, percent_off: Decimal) -> Self {
        self.coupons.insert(code.into().to_lowercase(), percent_off);
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes the next call fail with `error`. Queued failures are consumed in order.
    pub fn fail_next(&self, error: SyncError) {
        if let Ok(mut state) = self.state.lock() {
            state.forced_failures.push_back(error);
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn stored(&self, id: u64) -> Option<OrderDraft> {
        self.state.lock().ok().and_then(|state| state.orders.get(&id).cloned())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BackendState>, SyncError> {
        self.state
            .lock()
            .map_err(|_| SyncError::UnknownError("Backend state poisoned".to_string()))
    }

    fn validate(&self, draft: &OrderDraft) -> Result<Decimal, SyncError> {
        if let Some(item) = draft.items.iter().find(|item| item.quantity <= Decimal::ZERO) {
            return Err(SyncError::validation(
                RejectionKind::InvalidQuantity,
                format!("Quantity for {} must be positive", item.name),
            ));
        }

        let mut percent_off = Decimal::ZERO;
        for coupon in &draft.coupon_lines {
            match self.coupons.get(&coupon.code.to_lowercase()) {
                Some(percent) => percent_off += *percent,
                None => {
                    return Err(SyncError::validation(
                        RejectionKind::InvalidCoupon,
                        format!("Coupon \"{}\" does not exist", coupon.code),
                    ))
                }
            }
        }
        Ok(percent_off.min(Decimal::ONE_HUNDRED))
    }

    fn price(&self, mut draft: OrderDraft, percent_off: Decimal) -> OrderDraft {
        let discount = (Decimal::ONE_HUNDRED - percent_off) / Decimal::ONE_HUNDRED;
        let mut items_total = Decimal::ZERO;
        let mut total_tax = Decimal::ZERO;

        for item in draft.items.iter_mut() {
            if item.item_id == 0 {
                item.item_id = self.next_line_id.fetch_add(1, Ordering::SeqCst);
            }
            item.subtotal = money(item.price * item.quantity);
            item.total = money(item.subtotal * discount);
            item.total_tax = money(item.total * self.tax_rate);
            items_total += item.total;
            total_tax += item.total_tax;
        }
        for fee in draft.fee_lines.iter_mut().filter(|fee| fee.id == 0) {
            fee.id = self.next_line_id.fetch_add(1, Ordering::SeqCst);
        }
        for shipping in draft.shipping_lines.iter_mut().filter(|line| line.id == 0) {
            shipping.id = self.next_line_id.fetch_add(1, Ordering::SeqCst);
        }

        let fees: Decimal = draft.fee_lines.iter().map(|fee| fee.total).sum();
        let shipping: Decimal = draft.shipping_lines.iter().map(|line| line.total).sum();

        draft.total_tax = total_tax;
        draft.total = items_total + total_tax + fees + shipping;
        draft.is_editable = draft.status.is_editable();
        draft.date_modified = Some(Utc::now());
        draft
    }
}

#[async_trait]
impl Reconciler for InMemoryReconciler {
    #[instrument(name = "in_memory_reconcile", fields(order_id = draft.id, items = draft.items.len()), skip(self, draft))]
    async fn reconcile(&self, draft: OrderDraft) -> Result<OrderDraft, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if let Some(error) = self.lock()?.forced_failures.pop_front() {
            warn!(error = %error, "Returning queued failure");
            return Err(error);
        }

        let percent_off = self.validate(&draft)?;
        let mut priced = self.price(draft, percent_off);

        let mut state = self.lock()?;
        if priced.exists_remotely() {
            if !state.orders.contains_key(&priced.id) {
                return Err(SyncError::validation(
                    RejectionKind::Other("unknown_order".to_string()),
                    format!("Order {} not found", priced.id),
                ));
            }
            debug!("Updating existing order");
        } else {
            priced.id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
            info!(order_id = priced.id, "Created remote draft order");
        }
        priced.number = priced.id.to_string();
        state.orders.insert(priced.id, priced.clone());

        info!(order_id = priced.id, total = %priced.total, "Order reconciled");
        Ok(priced)
    }
}

fn money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
