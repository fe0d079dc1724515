use crate::domain::OrderDraft;

use super::{price_lines_equal, SyncPolicy};

/// Syncs only when items, fees, shipping lines or coupons change.
///
/// Notes, addresses and status are carried along with the next sync but never
/// trigger one on their own.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceAffectingPolicy;

impl SyncPolicy for PriceAffectingPolicy {
    fn name(&self) -> &'static str {
        "price_affecting"
    }

    fn is_significant(&self, previous: &OrderDraft, next: &OrderDraft) -> bool {
        !price_lines_equal(previous, next)
    }
}
