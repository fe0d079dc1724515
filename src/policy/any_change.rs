use crate::domain::OrderDraft;

use super::{price_lines_equal, SyncPolicy};

/// Syncs on any semantic change to the draft.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyChangePolicy;

impl SyncPolicy for AnyChangePolicy {
    fn name(&self) -> &'static str {
        "any_change"
    }

    fn is_significant(&self, previous: &OrderDraft, next: &OrderDraft) -> bool {
        let same = previous.id == next.id
            && previous.status == next.status
            && previous.billing_address == next.billing_address
            && previous.shipping_address == next.shipping_address
            && previous.customer_note == next.customer_note
            && previous.total == next.total
            && previous.total_tax == next.total_tax
            && previous.is_editable == next.is_editable
            && price_lines_equal(previous, next);
        !same
    }
}
