use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::lines::{CouponLine, FeeLine, Item, ShippingLine};

/// Lifecycle status of an order as the remote store knows it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Processing,
    OnHold,
    Completed,
    Cancelled,
    Refunded,
    Failed,
    /// Server-side draft that does not notify the customer or other devices.
    AutoDraft,
    Custom(String),
}

impl OrderStatus {
    /// Statuses whose orders the remote store still accepts line edits for.
    pub fn is_editable(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::OnHold | OrderStatus::AutoDraft
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    pub address_1: String,
    pub city: String,
    pub postcode: String,
    pub country: String,
    pub email: String,
}

/// Represents the full order under edit.
///
/// Drafts are immutable values: the editing layer produces a new draft for every
/// change and publishes it through a [`DraftSource`](crate::clients::DraftSource).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OrderDraft {
    /// Remote order id. Zero until the order exists remotely.
    pub id: u64,
    pub number: String,
    pub status: OrderStatus,
    pub date_modified: Option<DateTime<Utc>>,
    /// Local edit counter maintained by the draft source.
    pub local_revision: u64,
    pub items: Vec<Item>,
    pub fee_lines: Vec<FeeLine>,
    pub shipping_lines: Vec<ShippingLine>,
    pub coupon_lines: Vec<CouponLine>,
    pub billing_address: Address,
    pub shipping_address: Address,
    pub customer_note: String,
    pub total_tax: Decimal,
    pub total: Decimal,
    pub is_editable: bool,
}

impl OrderDraft {
    /// The baseline for a brand new order.
    pub fn empty() -> Self {
        Self {
            is_editable: true,
            ..Self::default()
        }
    }

    pub fn with_item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_fee(mut self, fee: FeeLine) -> Self {
        self.fee_lines.push(fee);
        self
    }

    pub fn with_shipping(mut self, shipping: ShippingLine) -> Self {
        self.shipping_lines.push(shipping);
        self
    }

    pub fn with_coupon(mut self, code: impl Into<String>) -> Self {
        self.coupon_lines.push(CouponLine::new(code));
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.customer_note = note.into();
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_billing_address(mut self, address: Address) -> Self {
        self.billing_address = address;
        self
    }

    /// Whether the order has already been created on the remote side.
    pub fn exists_remotely(&self) -> bool {
        self.id != 0
    }

    /// Clears the computed amounts of items the remote side has never seen.
    ///
    /// Locally computed subtotals are not authoritative, so they are not sent. The
    /// line tax is derived from the same local total and is cleared with it.
    pub fn sanitize_unsynced_items(mut self) -> Self {
        for item in self.items.iter_mut().filter(|item| !item.is_synced()) {
            item.subtotal = Decimal::ZERO;
            item.total_tax = Decimal::ZERO;
            item.total = Decimal::ZERO;
        }
        self
    }

    /// Copies the identity the remote side assigned in `remote` onto this draft.
    ///
    /// Used when a reconcile result arrives after newer local edits: the local lines are
    /// kept, but lines the remote side has just created get their remote ids so the
    /// next reconcile updates them instead of creating duplicates. Totals are left
    /// alone since they no longer describe this draft.
    pub fn adopt_remote_identity(&mut self, remote: &OrderDraft) {
        if !self.exists_remotely() {
            self.id = remote.id;
        }
        self.number = remote.number.clone();
        self.date_modified = remote.date_modified;
        self.is_editable = remote.is_editable;

        let known: HashSet<u64> = self.items.iter().map(|item| item.item_id).collect();
        let mut unclaimed: Vec<&Item> = remote
            .items
            .iter()
            .filter(|item| !known.contains(&item.item_id))
            .collect();
        for item in self.items.iter_mut().filter(|item| !item.is_synced()) {
            let found = unclaimed.iter().position(|candidate| {
                candidate.product_id == item.product_id
                    && candidate.variation_id == item.variation_id
                    && candidate.parent_item_id == item.parent_item_id
            });
            if let Some(index) = found {
                item.item_id = unclaimed.remove(index).item_id;
            }
        }

        adopt_line_ids(&mut self.fee_lines, &remote.fee_lines);
        adopt_line_ids(&mut self.shipping_lines, &remote.shipping_lines);
    }

    pub fn item_count(&self) -> Decimal {
        self.items.iter().map(|item| item.quantity).sum()
    }
}

/// Lines the remote side assigns an id to, matched by a natural key before they have one.
trait RemoteLine {
    fn remote_id(&self) -> u64;
    fn set_remote_id(&mut self, id: u64);
    fn natural_key(&self) -> &str;
}

impl RemoteLine for FeeLine {
    fn remote_id(&self) -> u64 {
        self.id
    }

    fn set_remote_id(&mut self, id: u64) {
        self.id = id;
    }

    fn natural_key(&self) -> &str {
        &self.name
    }
}

impl RemoteLine for ShippingLine {
    fn remote_id(&self) -> u64 {
        self.id
    }

    fn set_remote_id(&mut self, id: u64) {
        self.id = id;
    }

    fn natural_key(&self) -> &str {
        &self.method_id
    }
}

fn adopt_line_ids<T: RemoteLine>(local: &mut [T], remote: &[T]) {
    let known: HashSet<u64> = local.iter().map(RemoteLine::remote_id).collect();
    let mut unclaimed: Vec<&T> = remote
        .iter()
        .filter(|line| !known.contains(&line.remote_id()))
        .collect();
    for line in local.iter_mut().filter(|line| line.remote_id() == 0) {
        let found = unclaimed
            .iter()
            .position(|candidate| candidate.natural_key() == line.natural_key());
        if let Some(index) = found {
            line.set_remote_id(unclaimed.remove(index).remote_id());
        }
    }
}
